//! Unified error type for the Parley gateway.

use parley_protocol::ProtocolError;
use parley_room::RoomError;
use parley_session::SessionError;
use tokio_tungstenite::tungstenite;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` attributes let `?` lift sub-crate errors straight into
/// this type inside the connection handler.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// Binding or accepting on the listener failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The WebSocket handshake or a frame read/write failed.
    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection lacks a subscription or nickname the request needs.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The room rejected the request.
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl ParleyError {
    /// Stable machine-readable name sent in error replies.
    pub fn kind(&self) -> &'static str {
        match self {
            ParleyError::Io(_) => "Io",
            ParleyError::WebSocket(_) => "WebSocket",
            ParleyError::Protocol(_) => "InvalidFrame",
            ParleyError::Session(SessionError::NotBound { .. }) => "NotSubscribed",
            ParleyError::Session(SessionError::NoNickname(_)) => "NoNickname",
            ParleyError::Room(err) => err.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use parley_protocol::{RoomId, SessionId, Topic};

    use super::*;

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken");
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Io(_)));
        assert!(parley_err.to_string().contains("taken"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidTopic("nope".into());
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Protocol(_)));
        assert_eq!(parley_err.kind(), "InvalidFrame");
    }

    #[test]
    fn test_from_session_error_not_bound_is_not_subscribed() {
        let err = SessionError::NotBound {
            session: SessionId(3),
            topic: Topic::Progress(RoomId::from("r1")),
        };
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Session(_)));
        assert_eq!(parley_err.kind(), "NotSubscribed");
    }

    #[test]
    fn test_from_room_error_keeps_room_kind() {
        let err = RoomError::NotFound(RoomId::from("r1"));
        let parley_err: ParleyError = err.into();
        assert!(matches!(parley_err, ParleyError::Room(_)));
        assert_eq!(parley_err.kind(), "NotFound");
    }
}
