//! [`NegotiationEngine`] backed by the `webrtc` crate.
//!
//! Each session gets its own `RTCPeerConnection`, built on first use with
//! the default codecs and interceptors. When video is enabled an outbound
//! VP8 track is attached and handed to the application through
//! [`WebRtcEngineFactory::on_local_track`], so a capture source can write
//! samples into it. Remote tracks are drained and reported as
//! [`EngineEvent::Track`](crate::EngineEvent::Track).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use peerlink_protocol::{IceCandidate, SdpKind, SessionDescription};
use peerlink_session::Role;
use peerlink_transport::SessionId;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_VP8, MediaEngine};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::{
    AnswerOptions, EngineError, EngineEvents, EngineFactory, MediaKind,
    MediaTrack, NegotiationEngine, OfferOptions, PeerConnectionState,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// One STUN or TURN server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

/// Settings shared by every peer connection the factory builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    pub ice_servers: Vec<IceServerConfig>,
    /// Attach an outbound VP8 video track to every session.
    pub video: bool,
    /// Stream id used for outbound tracks.
    pub stream_id: String,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".to_string()],
                username: None,
                credential: None,
            }],
            video: true,
            stream_id: "peerlink".to_string(),
        }
    }
}

impl WebRtcConfig {
    fn rtc_configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self
                .ice_servers
                .iter()
                .map(|s| RTCIceServer {
                    urls: s.urls.clone(),
                    username: s.username.clone().unwrap_or_default(),
                    credential: s.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }
}

/// Called with each session's outbound video track once it is attached.
pub type LocalTrackHook =
    Arc<dyn Fn(&SessionId, Arc<TrackLocalStaticSample>) + Send + Sync>;

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Builds a [`WebRtcEngine`] per session.
#[derive(Clone, Default)]
pub struct WebRtcEngineFactory {
    config: Arc<WebRtcConfig>,
    on_local_track: Option<LocalTrackHook>,
}

impl WebRtcEngineFactory {
    pub fn new(config: WebRtcConfig) -> Self {
        Self {
            config: Arc::new(config),
            on_local_track: None,
        }
    }

    /// Registers a hook that receives every outbound video track.
    pub fn on_local_track(
        mut self,
        hook: impl Fn(&SessionId, Arc<TrackLocalStaticSample>) + Send + Sync + 'static,
    ) -> Self {
        self.on_local_track = Some(Arc::new(hook));
        self
    }
}

impl EngineFactory for WebRtcEngineFactory {
    type Engine = WebRtcEngine;

    fn create(
        &self,
        id: &SessionId,
        role: Role,
        events: EngineEvents,
    ) -> Result<WebRtcEngine, EngineError> {
        tracing::debug!(%id, %role, "creating WebRTC engine");
        Ok(WebRtcEngine {
            id: id.clone(),
            config: Arc::clone(&self.config),
            on_local_track: self.on_local_track.clone(),
            events,
            pc: OnceCell::new(),
            receive_audio_added: AtomicBool::new(false),
            receive_video_added: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// One `RTCPeerConnection` and the callbacks wired into it.
pub struct WebRtcEngine {
    id: SessionId,
    config: Arc<WebRtcConfig>,
    on_local_track: Option<LocalTrackHook>,
    events: EngineEvents,
    pc: OnceCell<Arc<RTCPeerConnection>>,
    receive_audio_added: AtomicBool,
    receive_video_added: AtomicBool,
    /// Set by `close`. No peer connection outlives it.
    closed: AtomicBool,
}

impl WebRtcEngine {
    /// The peer connection, built on first call.
    ///
    /// Fails with [`EngineError::Closed`] once `close` has run, including
    /// when `close` lands while the connection is still being built.
    async fn peer_connection(
        &self,
    ) -> Result<&Arc<RTCPeerConnection>, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        let pc = self.pc.get_or_try_init(|| self.build()).await?;
        // Pairs with the fence in `close`: one side always sees the other.
        std::sync::atomic::fence(Ordering::SeqCst);
        if self.is_closed() {
            self.release(pc).await;
            return Err(EngineError::Closed);
        }
        Ok(pc)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn release(&self, pc: &RTCPeerConnection) {
        if let Err(e) = pc.close().await {
            tracing::debug!(id = %self.id, error = %e, "peer connection close failed");
        }
    }

    async fn build(&self) -> Result<Arc<RTCPeerConnection>, EngineError> {
        let setup = |e: webrtc::Error| EngineError::Setup(e.to_string());

        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(setup)?;
        let registry =
            register_default_interceptors(Registry::new(), &mut media_engine)
                .map_err(setup)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(self.config.rtc_configuration())
                .await
                .map_err(setup)?,
        );
        if self.is_closed() {
            self.release(&pc).await;
            return Err(EngineError::Closed);
        }
        self.wire_callbacks(&pc);

        if self.config.video {
            let track = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    ..Default::default()
                },
                "video".to_owned(),
                self.config.stream_id.clone(),
            ));
            let added = pc
                .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
                .await;
            if let Err(e) = added {
                self.release(&pc).await;
                return Err(setup(e));
            }
            if let Some(hook) = self.on_local_track.as_ref().filter(|_| !self.is_closed()) {
                hook(&self.id, track);
            }
        }

        tracing::debug!(id = %self.id, "peer connection created");
        Ok(pc)
    }

    fn wire_callbacks(&self, pc: &RTCPeerConnection) {
        let events = self.events.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let events = events.clone();
            Box::pin(async move {
                // `None` marks the end of gathering; nothing to trickle.
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        events
                            .local_candidate(IceCandidate::new(
                                init.candidate,
                                init.sdp_mid.unwrap_or_default(),
                                init.sdp_mline_index.unwrap_or(0),
                            ))
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(id = %events.session_id(), error = %e, "unserializable local candidate");
                    }
                }
            })
        }));

        let events = self.events.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = events.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => MediaKind::Audio,
                    _ => MediaKind::Video,
                };
                let media = MediaTrack {
                    id: track.id(),
                    kind,
                };
                // Keep the receive buffers moving until the track ends.
                tokio::spawn(async move { while track.read_rtp().await.is_ok() {} });
                events.track(media).await;
            })
        }));

        let events = self.events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state| {
            let events = events.clone();
            Box::pin(async move {
                events.connection_state(connection_state(state)).await;
            })
        }));
    }

    /// Adds a receive-only transceiver of `kind` once per session.
    async fn receive_only(
        &self,
        pc: &RTCPeerConnection,
        kind: RTPCodecType,
        added: &AtomicBool,
    ) -> Result<(), EngineError> {
        if added.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        pc.add_transceiver_from_kind(
            kind,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: vec![],
            }),
        )
        .await
        .map(|_| ())
        .map_err(|e| EngineError::failed("createOffer", e))
    }
}

impl NegotiationEngine for WebRtcEngine {
    async fn create_offer(
        &self,
        options: OfferOptions,
    ) -> Result<SessionDescription, EngineError> {
        let pc = self.peer_connection().await?;
        if options.offer_to_receive_audio {
            self.receive_only(pc, RTPCodecType::Audio, &self.receive_audio_added)
                .await?;
        }
        if options.offer_to_receive_video && !self.config.video {
            self.receive_only(pc, RTPCodecType::Video, &self.receive_video_added)
                .await?;
        }
        let offer = pc
            .create_offer(Some(RTCOfferOptions {
                ice_restart: options.ice_restart,
                ..Default::default()
            }))
            .await
            .map_err(|e| EngineError::failed("createOffer", e))?;
        Ok(from_rtc(offer))
    }

    async fn create_answer(
        &self,
        _options: AnswerOptions,
    ) -> Result<SessionDescription, EngineError> {
        // ICE restarts are driven by the offerer; answers have nothing to set.
        let pc = self.peer_connection().await?;
        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| EngineError::failed("createAnswer", e))?;
        Ok(from_rtc(answer))
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), EngineError> {
        const OP: &str = "setLocalDescription";
        let pc = self.peer_connection().await?;
        pc.set_local_description(to_rtc(desc, OP)?)
            .await
            .map_err(|e| EngineError::failed(OP, e))
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), EngineError> {
        const OP: &str = "setRemoteDescription";
        let pc = self.peer_connection().await?;
        pc.set_remote_description(to_rtc(desc, OP)?)
            .await
            .map_err(|e| EngineError::failed(OP, e))
    }

    async fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), EngineError> {
        let pc = self.peer_connection().await?;
        let sdp_mid = (!candidate.sdp_mid.is_empty()).then_some(candidate.sdp_mid);
        pc.add_ice_candidate(RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid,
            sdp_mline_index: Some(candidate.sdp_mline_index),
            username_fragment: None,
        })
        .await
        .map_err(|e| EngineError::failed("addIceCandidate", e))
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closed.store(true, Ordering::SeqCst);
        std::sync::atomic::fence(Ordering::SeqCst);
        // A build still in flight sees the flag and closes its own connection.
        let Some(pc) = self.pc.get() else {
            return Ok(());
        };
        pc.close()
            .await
            .map_err(|e| EngineError::failed("close", e))
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn from_rtc(desc: RTCSessionDescription) -> SessionDescription {
    let kind = match desc.sdp_type {
        RTCSdpType::Answer => SdpKind::Answer,
        RTCSdpType::Pranswer => SdpKind::Pranswer,
        RTCSdpType::Rollback => SdpKind::Rollback,
        _ => SdpKind::Offer,
    };
    SessionDescription::new(kind, desc.sdp)
}

fn to_rtc(
    desc: SessionDescription,
    op: &'static str,
) -> Result<RTCSessionDescription, EngineError> {
    let parsed = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
        SdpKind::Pranswer => RTCSessionDescription::pranswer(desc.sdp),
        SdpKind::Rollback => {
            return Err(EngineError::failed(op, "rollback is not supported"));
        }
    };
    parsed.map_err(|e| EngineError::failed(op, e))
}

fn connection_state(state: RTCPeerConnectionState) -> PeerConnectionState {
    match state {
        RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
        RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
        RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
        _ => PeerConnectionState::New,
    }
}
