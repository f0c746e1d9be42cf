//! Signaling transport layer for Peerlink.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the signaling socket, a WebSocket implementation of both, and the
//! [`SignalingServer`] hub that turns many connections into one ordered
//! stream of [`TransportEvent`]s plus a per-session send primitive.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod config;
mod error;
#[cfg(feature = "websocket")]
mod server;
#[cfg(feature = "websocket")]
mod websocket;

pub use config::TransportConfig;
pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use server::{SignalingHandle, SignalingServer, TransportEvent};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Close code used when a connection ends without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close code used when a peer claims a session id that is already connected.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Close code for an orderly shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Maximum length of a client-supplied session id.
const MAX_SESSION_ID_LEN: usize = 128;

/// Opaque identifier for a signaling session.
///
/// Either supplied by the browser peer in the `?id=` query parameter or
/// generated by the transport when the peer does not pick one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a `SessionId` from any string, without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Validates a client-supplied id.
    ///
    /// Accepts 1–128 characters from `[A-Za-z0-9._-]`.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
        valid.then(|| Self(raw.to_string()))
    }

    /// Generates a random 32-character hex id (128 bits of entropy).
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the underlying `String`.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One unit received from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A data frame (text frames arrive as their UTF-8 bytes).
    Data(Vec<u8>),
    /// The peer closed the connection.
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single connection that can send and receive bytes.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one text frame to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns [`Frame::Closed`] once the peer has closed the connection.
    async fn recv(&self) -> Result<Frame, Self::Error>;

    /// Closes the connection with the given code and reason.
    async fn close(&self, code: u16, reason: &str) -> Result<(), Self::Error>;

    /// Returns the session identifier bound to this connection.
    fn id(&self) -> &SessionId;
}
