//! Codec trait and the JSON implementation.
//!
//! The coordinator never touches `serde_json` directly; it holds something
//! that implements [`Codec`]. Browser and native peers both speak JSON, so
//! [`JsonCodec`] is the only implementation today.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because a codec lives inside the coordinator
/// task for the whole life of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do
    /// not match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Output is compact UTF-8 JSON, so it can go straight into a WebSocket
/// text frame.
///
/// ## Example
///
/// ```rust
/// use peerlink_protocol::{Codec, JsonCodec, SignalingMessage};
///
/// let codec = JsonCodec;
/// let msg: SignalingMessage = codec
///     .decode(br#"{"type":"offer","sdp":"v=0\r\n"}"#)
///     .unwrap();
/// assert!(msg.is_description());
///
/// let bytes = codec.encode(&msg).unwrap();
/// let again: SignalingMessage = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, again);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
