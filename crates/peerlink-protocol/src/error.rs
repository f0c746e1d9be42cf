//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the problem is in turning bytes into
//! messages (or back), never in networking or negotiation.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, or a payload that matches
    /// neither a session description nor an ICE candidate.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but breaks a protocol rule, e.g. a text frame
    /// that is not valid UTF-8.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
