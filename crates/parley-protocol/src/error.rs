//! Error types for the protocol layer.
//!
//! Each crate in Parley defines its own error enum, so a `ProtocolError`
//! always means "the bytes or strings on the wire were wrong", never
//! "the room rejected the request".

/// Errors that can occur while encoding, decoding or parsing wire values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (malformed JSON, missing fields, wrong types).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A topic string did not match any of the known topic shapes.
    ///
    /// Valid shapes are `chat.<channel>`, `progress.<room>`,
    /// `<room>.participants.list` and `error`.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// A value passed deserialization but is not allowed by the protocol,
    /// e.g. a vote team other than `SUPPORT` or `OPPOSITE`.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}
