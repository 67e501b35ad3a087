//! Codec trait and implementations for serializing frames.
//!
//! The gateway never calls `serde_json` directly; it holds something that
//! implements [`Codec`]. Swapping the wire format means writing a new
//! codec, nothing else.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to bytes and decodes them back.
///
/// `Send + Sync + 'static` because a codec is shared by every connection
/// task the server spawns.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented
    /// in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Behind the `json` feature (on by default).
///
/// ```rust
/// use parley_protocol::{Codec, JsonCodec, Topic, RoomId};
///
/// let codec = JsonCodec;
/// let topic = Topic::Progress(RoomId::from("r1"));
///
/// let bytes = codec.encode(&topic).unwrap();
/// assert_eq!(bytes, b"\"progress.r1\"");
///
/// let decoded: Topic = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded, topic);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Command, RoomId};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<Command, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_command_from_bytes() {
        let bytes = br#"{"op":"roomInfo","roomId":"r1"}"#;
        let cmd: Command = JsonCodec.decode(bytes).unwrap();
        assert_eq!(
            cmd,
            Command::RoomInfo {
                room_id: RoomId::from("r1")
            }
        );
    }
}
