//! Error types for the negotiation layer.

use peerlink_protocol::{ProtocolError, SdpKind};
use peerlink_session::{NegotiationState, SessionError};
use peerlink_transport::{SessionId, TransportError};

/// A failure reported by a [`NegotiationEngine`](crate::NegotiationEngine).
///
/// Engines wrap whatever their backend reports into a message; the
/// coordinator only needs to know that the operation failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The operation ran and failed.
    #[error("{op} failed: {reason}")]
    Failed { op: &'static str, reason: String },

    /// The engine could not be built for a new session.
    #[error("engine setup failed: {0}")]
    Setup(String),

    /// The engine was already closed.
    #[error("engine closed")]
    Closed,
}

impl EngineError {
    pub fn failed(op: &'static str, reason: impl ToString) -> Self {
        Self::Failed {
            op,
            reason: reason.to_string(),
        }
    }
}

/// Errors surfaced by the coordinator and its handle.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// A frame could not be decoded (or a message encoded).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The engine failed. Terminal for the session.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Sending on the signaling channel failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Missing session or a transition the state machine forbids.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A well-formed description arrived in a state that cannot take it.
    #[error("session {id}: unexpected {kind} in state {state}")]
    UnexpectedDescription {
        id: SessionId,
        kind: SdpKind,
        state: NegotiationState,
    },

    /// The peer asked for something this coordinator does not do.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The coordinator task is gone.
    #[error("negotiation coordinator unavailable")]
    Unavailable,
}
