//! Offer/answer negotiation for Peerlink.
//!
//! The [`Coordinator`] is a single task that owns every session's
//! negotiation state. Everything that can change that state arrives in
//! its mailbox:
//!
//! ```text
//! Transport events ──┐
//! Engine callbacks ──┼──→ mailbox ──→ Coordinator ──→ NegotiationEngine (spawned op)
//! Call requests ─────┤                    │                   │
//! Op completions ────┘←───────────────────┼───────────────────┘
//!                                         └──→ Outbound (signaling send)
//! ```
//!
//! Engine operations never run inside the coordinator. Each one is spawned
//! and its result comes back through the mailbox, so a slow engine on one
//! session does not hold up the others. Each session runs at most one
//! engine operation at a time, in FIFO order.
//!
//! The WebRTC implementation itself sits behind the [`NegotiationEngine`]
//! trait. The `webrtc` feature provides one built on the `webrtc` crate.

mod config;
mod coordinator;
mod engine;
mod error;
mod outbound;
#[cfg(feature = "webrtc")]
pub mod webrtc;

pub use config::NegotiationConfig;
pub use coordinator::{Coordinator, CoordinatorHandle, SessionInfo};
pub use engine::{
    AnswerOptions, EngineEvent, EngineEvents, EngineFactory, LogSink,
    MediaKind, MediaSink, MediaTrack, NegotiationEngine, OfferOptions,
    PeerConnectionState,
};
pub use error::{EngineError, NegotiationError};
pub use outbound::Outbound;
