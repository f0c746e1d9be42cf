//! Session types: the record of one peer's negotiation.
//!
//! A session tracks:
//! - WHO the peer is (`SessionId`)
//! - WHICH side made the offer (`Role`)
//! - HOW FAR the offer/answer exchange has got (`NegotiationState`)
//! - WHAT candidates are waiting for a remote description

use std::fmt;

use peerlink_protocol::IceCandidate;
use peerlink_transport::SessionId;

use crate::SessionError;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Which side of the offer/answer exchange the local peer plays.
///
/// Fixed when the session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// We create the offer.
    Caller,
    /// The remote peer offered; we answer.
    Callee,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Caller => "caller",
            Self::Callee => "callee",
        })
    }
}

// ---------------------------------------------------------------------------
// NegotiationState
// ---------------------------------------------------------------------------

/// Where a session is in the offer/answer exchange.
///
/// ```text
///            (call)                (local offer set)        (answer set)
///   New ──→ OfferCreating ──────→ OfferPending ──────────→ Stable
///    │                                                      │  ↑
///    │ (remote offer)                                       │  │ (local answer set)
///    └────────────────────────→ AnswerCreating ─────────────┼──┘
///                                     ↑                     │
///                                     └─ (remote offer) ────┘
///
///   any state ──(transport closed / engine failure)──→ Closed
/// ```
///
/// `Stable` can also move back to `OfferCreating` when the local side
/// renegotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    /// Created, nothing negotiated yet.
    New,
    /// `createOffer` / `setLocalDescription(offer)` in progress.
    OfferCreating,
    /// Our offer is set locally and sent; waiting for the answer.
    OfferPending,
    /// Remote offer being applied and our answer being produced.
    AnswerCreating,
    /// Offer and answer both applied.
    Stable,
    /// Torn down. Terminal.
    Closed,
}

impl NegotiationState {
    /// Returns `true` if the state machine allows moving to `next`.
    pub fn can_transition_to(self, next: NegotiationState) -> bool {
        use NegotiationState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (New, OfferCreating | AnswerCreating) => true,
            (OfferCreating, OfferPending) => true,
            (OfferPending, Stable) => true,
            (AnswerCreating, Stable) => true,
            (Stable, OfferCreating | AnswerCreating) => true,
            _ => false,
        }
    }

    /// `true` once the session is torn down.
    pub fn is_closed(self) -> bool {
        self == NegotiationState::Closed
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::OfferCreating => "offer-creating",
            Self::OfferPending => "offer-pending",
            Self::AnswerCreating => "answer-creating",
            Self::Stable => "stable",
            Self::Closed => "closed",
        })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One peer's negotiation session.
///
/// `P` holds whatever per-peer resources the owner attaches.
#[derive(Debug)]
pub struct Session<P> {
    id: SessionId,
    role: Role,
    state: NegotiationState,
    epoch: u64,
    pending_candidates: Vec<IceCandidate>,
    remote_description_set: bool,
    remote_pending: bool,
    /// Resources owned on the session's behalf.
    pub peer: P,
}

impl<P> Session<P> {
    pub(crate) fn new(id: SessionId, role: Role, epoch: u64, peer: P) -> Self {
        Self {
            id,
            role,
            state: NegotiationState::New,
            epoch,
            pending_candidates: Vec::new(),
            remote_description_set: false,
            remote_pending: false,
            peer,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Takes `role` if nothing has been negotiated yet.
    ///
    /// A session opened by an early candidate gets a provisional role; the
    /// first offer or call decides. Returns `false` (and keeps the current
    /// role) once the session has left `New`.
    pub fn assign_role(&mut self, role: Role) -> bool {
        if self.state != NegotiationState::New {
            return false;
        }
        if self.role != role {
            tracing::debug!(id = %self.id, from = %self.role, to = %role, "role reassigned");
            self.role = role;
        }
        true
    }

    /// Generation number. Two sessions that reuse an id never share one.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Moves to `next`, or fails without changing anything.
    ///
    /// # Errors
    /// [`SessionError::InvalidTransition`] if the step is not allowed.
    pub fn transition(
        &mut self,
        next: NegotiationState,
    ) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(id = %self.id, from = %self.state, to = %next, "state change");
        self.state = next;
        Ok(())
    }

    // -- Remote description tracking --

    /// `true` once a remote description has been applied by the engine.
    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    /// `true` while a remote description is queued or being applied.
    pub fn remote_pending(&self) -> bool {
        self.remote_pending
    }

    /// Marks a remote description as accepted and on its way to the engine.
    pub fn begin_remote_description(&mut self) {
        self.remote_pending = true;
    }

    /// Marks the remote description as applied.
    ///
    /// Returns `true` if this is the first one, i.e. the moment buffered
    /// candidates become applicable.
    pub fn finish_remote_description(&mut self) -> bool {
        self.remote_pending = false;
        let first = !self.remote_description_set;
        self.remote_description_set = true;
        first
    }

    // -- Candidate buffering --

    /// Buffers a candidate that arrived before the remote description.
    pub fn buffer_candidate(&mut self, candidate: IceCandidate) {
        self.pending_candidates.push(candidate);
    }

    pub fn pending_candidates(&self) -> &[IceCandidate] {
        &self.pending_candidates
    }

    /// Removes and returns buffered candidates in arrival order.
    pub fn take_pending_candidates(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.pending_candidates)
    }

    /// Marks the session closed. Safe to call more than once.
    pub(crate) fn close(&mut self) {
        self.state = NegotiationState::Closed;
    }
}
