//! The boundary to the WebRTC implementation.
//!
//! The coordinator drives one [`NegotiationEngine`] per session. It never
//! calls into an engine from inside its own loop: each call runs on a
//! spawned task, and anything the engine wants to report unprompted
//! (a gathered ICE candidate, a remote track, a connection-state change)
//! goes through the [`EngineEvents`] handle it was built with.

use std::future::Future;

use peerlink_protocol::{IceCandidate, SessionDescription};
use peerlink_session::Role;
use peerlink_transport::SessionId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::EngineError;
use crate::coordinator::Command;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options for `createOffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferOptions {
    pub ice_restart: bool,
    pub offer_to_receive_audio: bool,
    pub offer_to_receive_video: bool,
}

impl Default for OfferOptions {
    fn default() -> Self {
        Self {
            ice_restart: false,
            offer_to_receive_audio: false,
            offer_to_receive_video: true,
        }
    }
}

/// Options for `createAnswer`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerOptions {
    pub ice_restart: bool,
}

// ---------------------------------------------------------------------------
// Engine callbacks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// A remote track announced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: MediaKind,
}

/// Mirrors `RTCPeerConnectionState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PeerConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        })
    }
}

/// Something an engine reports without being asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A local ICE candidate to trickle to the remote peer.
    LocalCandidate(IceCandidate),
    Track(MediaTrack),
    ConnectionState(PeerConnectionState),
}

/// The engine's way back into the coordinator.
///
/// Each handle is bound to one session *and* one epoch of it, so events
/// from an engine whose session has since been torn down and recreated are
/// recognised and dropped. The handle does not keep the coordinator alive.
#[derive(Clone)]
pub struct EngineEvents {
    id: SessionId,
    epoch: u64,
    mailbox: mpsc::WeakSender<Command>,
}

impl EngineEvents {
    pub(crate) fn new(
        id: SessionId,
        epoch: u64,
        mailbox: mpsc::WeakSender<Command>,
    ) -> Self {
        Self { id, epoch, mailbox }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.id
    }

    /// Posts `event` to the coordinator.
    ///
    /// Returns `false` if the coordinator has stopped.
    pub async fn emit(&self, event: EngineEvent) -> bool {
        let Some(mailbox) = self.mailbox.upgrade() else {
            return false;
        };
        mailbox
            .send(Command::Engine {
                id: self.id.clone(),
                epoch: self.epoch,
                event,
            })
            .await
            .is_ok()
    }

    pub async fn local_candidate(&self, candidate: IceCandidate) -> bool {
        self.emit(EngineEvent::LocalCandidate(candidate)).await
    }

    pub async fn track(&self, track: MediaTrack) -> bool {
        self.emit(EngineEvent::Track(track)).await
    }

    pub async fn connection_state(&self, state: PeerConnectionState) -> bool {
        self.emit(EngineEvent::ConnectionState(state)).await
    }
}

impl std::fmt::Debug for EngineEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEvents")
            .field("id", &self.id)
            .field("epoch", &self.epoch)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Engine traits
// ---------------------------------------------------------------------------

/// One peer connection's worth of WebRTC negotiation.
///
/// Every method returns a `Send` future because the coordinator runs it on
/// a spawned task. The coordinator guarantees at most one call in flight
/// per engine, except for [`close`](Self::close), which may overlap an
/// operation that is still running when the session is torn down.
pub trait NegotiationEngine: Send + Sync + 'static {
    fn create_offer(
        &self,
        options: OfferOptions,
    ) -> impl Future<Output = Result<SessionDescription, EngineError>> + Send;

    fn create_answer(
        &self,
        options: AnswerOptions,
    ) -> impl Future<Output = Result<SessionDescription, EngineError>> + Send;

    fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Releases the peer connection. Called exactly once per session.
    fn close(&self) -> impl Future<Output = Result<(), EngineError>> + Send;
}

/// Builds an engine for each new session.
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: NegotiationEngine;

    /// Creates the engine for session `id`.
    ///
    /// Runs on the coordinator task, so it must not block. Engines that
    /// need async setup should defer it to their first operation.
    fn create(
        &self,
        id: &SessionId,
        role: Role,
        events: EngineEvents,
    ) -> Result<Self::Engine, EngineError>;
}

// ---------------------------------------------------------------------------
// Media sink
// ---------------------------------------------------------------------------

/// Receives remote tracks as engines report them.
pub trait MediaSink: Send + Sync + 'static {
    fn on_track(&self, id: &SessionId, track: &MediaTrack);
}

impl<S: MediaSink + ?Sized> MediaSink for std::sync::Arc<S> {
    fn on_track(&self, id: &SessionId, track: &MediaTrack) {
        (**self).on_track(id, track);
    }
}

/// A [`MediaSink`] that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl MediaSink for LogSink {
    fn on_track(&self, id: &SessionId, track: &MediaTrack) {
        tracing::info!(%id, track = %track.id, kind = ?track.kind, "remote track");
    }
}
