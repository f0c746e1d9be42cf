//! Negotiation sessions for Peerlink.
//!
//! A session is the relay's record of one remote peer: which side offered,
//! how far the offer/answer exchange has progressed, and which ICE
//! candidates arrived too early to be applied.
//!
//! # How it fits in the stack
//!
//! ```text
//! Negotiation Layer (above)  ← drives sessions through the state machine
//!     ↕
//! Session Layer (this crate)  ← owns session state, one entry per peer
//!     ↕
//! Protocol / Transport (below)  ← IceCandidate, SessionId
//! ```
//!
//! Sessions are generic over `P`, the per-peer resources the layer above
//! attaches (engine handle, operation queue). This crate never looks
//! inside `P`.

mod error;
mod registry;
mod session;

pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::{NegotiationState, Role, Session};
