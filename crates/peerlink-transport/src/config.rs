//! Transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the signaling listener.
///
/// Every field has a default, so a config file only needs to name the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Interface to bind.
    pub bind_addr: String,
    /// TCP port. `0` lets the OS pick one.
    pub port: u16,
    /// The only request path that is upgraded to a WebSocket.
    pub path: String,
    /// Upper bound on the WebSocket upgrade, in milliseconds.
    pub handshake_timeout_ms: u64,
    /// Capacity of the event queue shared by all connections.
    pub event_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8998,
            path: "/".to_string(),
            handshake_timeout_ms: 5_000,
            event_capacity: 1_024,
        }
    }
}

impl TransportConfig {
    /// Default config listening on `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// `bind_addr:port`, ready for `TcpListener::bind`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// The handshake timeout as a `Duration`.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
