//! Error types for the protocol layer.
//!
//! Each crate in Clash defines its own error enum. A `ProtocolError`
//! always means the bytes or the values in them were wrong, never that a
//! room or a connection misbehaved.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, unknown event name,
    /// missing field, or wrong type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The event decoded but named a hand that doesn't exist.
    #[error("invalid move: {0:?}")]
    InvalidMove(String),

    /// The event decoded but breaks a protocol rule, e.g. a `hello` with
    /// the wrong version or any other event before `hello`.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
