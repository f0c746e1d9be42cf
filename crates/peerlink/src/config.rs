//! Server configuration, loadable from TOML.
//!
//! ```toml
//! call_on_open = false
//!
//! [transport]
//! port = 8998
//! path = "/"
//!
//! [negotiation.offer]
//! offer_to_receive_audio = true
//! ```

use std::path::Path;

use peerlink_negotiation::NegotiationConfig;
use peerlink_transport::TransportConfig;
use serde::{Deserialize, Serialize};

use crate::PeerlinkError;

/// Everything a [`PeerlinkServer`](crate::PeerlinkServer) needs to start.
///
/// Missing sections and fields fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerlinkConfig {
    pub transport: TransportConfig,
    pub negotiation: NegotiationConfig,
    /// Send an offer to every peer as soon as it connects.
    pub call_on_open: bool,
}

impl PeerlinkConfig {
    /// Parses a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, PeerlinkError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PeerlinkError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}
