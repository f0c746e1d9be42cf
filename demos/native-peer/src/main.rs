//! A Peerlink relay whose far end is a native WebRTC peer.
//!
//! Browsers connect to `ws://<host>:8998/?id=<name>` and negotiate with a
//! `webrtc-rs` peer connection running in this process. Settings come from
//! an optional TOML file and can be overridden on the command line:
//!
//! ```text
//! native-peer --config peer.toml --port 9000 --call-on-open
//! RUST_LOG=peerlink_negotiation=debug native-peer
//! ```

use std::path::PathBuf;

use clap::Parser;
use peerlink::prelude::*;
use peerlink_negotiation::webrtc::{WebRtcConfig, WebRtcEngineFactory};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(name = "native-peer")]
#[command(about = "WebRTC signaling relay with a native peer on the far end")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "PEERLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to bind (overrides transport.bind_addr)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides transport.port)
    #[arg(short, long, env = "PEERLINK_PORT")]
    port: Option<u16>,

    /// Offer to every browser as soon as it connects
    #[arg(long)]
    call_on_open: bool,
}

/// The relay settings plus the peer-connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct NativePeerConfig {
    #[serde(flatten)]
    relay: PeerlinkConfig,
    #[serde(default)]
    webrtc: WebRtcConfig,
}

impl NativePeerConfig {
    fn resolve(cli: &Cli) -> Result<Self, PeerlinkError> {
        let mut config = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text)?
            }
            None => Self::default(),
        };
        if let Some(bind) = &cli.bind {
            config.relay.transport.bind_addr = bind.clone();
        }
        if let Some(port) = cli.port {
            config.relay.transport.port = port;
        }
        if cli.call_on_open {
            config.relay.call_on_open = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = NativePeerConfig::resolve(&cli)?;
    tracing::info!(
        ice_servers = config.webrtc.ice_servers.len(),
        video = config.webrtc.video,
        "native peer configured"
    );

    let factory = WebRtcEngineFactory::new(config.webrtc).on_local_track(|id, _track| {
        tracing::info!(%id, "outbound video track attached");
    });

    let server = PeerlinkServer::builder()
        .config(config.relay)
        .build(factory)
        .await?;
    tracing::info!(addr = %server.local_addr(), "waiting for browsers");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}
