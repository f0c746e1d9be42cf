//! Error types for the session layer.

use peerlink_transport::SessionId;

use crate::NegotiationState;

/// Errors that can occur while looking up or mutating sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists for the given id.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// A session with this id is already registered.
    #[error("session {0} already exists")]
    AlreadyExists(SessionId),

    /// The state machine does not allow this step.
    #[error("session {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: SessionId,
        from: NegotiationState,
        to: NegotiationState,
    },
}
