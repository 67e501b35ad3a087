//! Error types for the session layer.

use parley_protocol::{SessionId, Topic};

/// Errors raised when a connection is missing state a caller needs.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection never bound a nickname, so requests that act on
    /// behalf of a participant cannot be attributed.
    #[error("session {0} has no nickname bound")]
    NoNickname(SessionId),

    /// The connection is not subscribed to a topic the request requires.
    #[error("session {session} is not subscribed to {topic}")]
    NotBound { session: SessionId, topic: Topic },
}
