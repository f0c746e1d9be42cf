//! # Peerlink
//!
//! A WebRTC signaling relay that negotiates on its own behalf.
//!
//! Browsers connect over a WebSocket and exchange SDP descriptions and
//! trickled ICE candidates with the server. For every connection the
//! server runs one side of the offer/answer exchange through a
//! [`NegotiationEngine`](peerlink_negotiation::NegotiationEngine), so the
//! remote peer ends up with a real peer connection to this process.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peerlink::prelude::*;
//!
//! // Implement EngineFactory (or enable the `webrtc` feature of
//! // peerlink-negotiation and use WebRtcEngineFactory), then:
//! // let server = PeerlinkServer::builder()
//! //     .port(8998)
//! //     .build(factory)
//! //     .await?;
//! // server.run().await
//! ```

mod config;
mod error;
mod server;

pub use config::PeerlinkConfig;
pub use error::PeerlinkError;
pub use server::{PeerlinkServer, PeerlinkServerBuilder};

/// Everything needed to run a server and plug in an engine.
pub mod prelude {
    pub use crate::{
        PeerlinkConfig, PeerlinkError, PeerlinkServer, PeerlinkServerBuilder,
    };
    pub use peerlink_negotiation::{
        AnswerOptions, CoordinatorHandle, EngineError, EngineEvents,
        EngineFactory, MediaKind, MediaSink, MediaTrack, NegotiationConfig,
        NegotiationEngine, NegotiationError, OfferOptions,
        PeerConnectionState, SessionInfo,
    };
    pub use peerlink_protocol::{
        IceCandidate, SdpKind, SessionDescription, SignalingMessage,
    };
    pub use peerlink_session::{NegotiationState, Role, SessionError};
    pub use peerlink_transport::{SessionId, TransportConfig, TransportError};
}
