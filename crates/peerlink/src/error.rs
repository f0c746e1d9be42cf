//! Unified error type for Peerlink.

use peerlink_negotiation::NegotiationError;
use peerlink_protocol::ProtocolError;
use peerlink_session::SessionError;
use peerlink_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` attributes let `?` lift sub-crate errors into this one.
#[derive(Debug, thiserror::Error)]
pub enum PeerlinkError {
    /// Listener or connection failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame that is not a signaling message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Negotiation failed, or the coordinator is no longer running.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// The configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
