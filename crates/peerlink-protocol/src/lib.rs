//! Signaling wire protocol for Peerlink.
//!
//! This crate defines what travels over the signaling WebSocket:
//!
//! - **Types** ([`SignalingMessage`], [`SessionDescription`],
//!   [`IceCandidate`], [`SdpKind`]): the two message shapes peers
//!   exchange while negotiating a WebRTC session.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages
//!   are converted to and from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding and decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw frames) and the
//! negotiation coordinator (per-session state). It knows nothing about
//! connections or sessions; it only turns frames into messages and back.
//!
//! ```text
//! Transport (bytes) → Protocol (SignalingMessage) → Negotiation (session state)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{IceCandidate, SdpKind, SessionDescription, SignalingMessage};
