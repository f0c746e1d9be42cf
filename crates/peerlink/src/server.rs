//! `PeerlinkServer` builder and event pump.
//!
//! This is the entry point for running a signaling relay. It ties the
//! layers together: the signaling transport produces events, the pump
//! feeds them to the negotiation coordinator, and the coordinator answers
//! through the transport's send handle.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use peerlink_negotiation::{
    Coordinator, CoordinatorHandle, EngineFactory, MediaSink,
};
use peerlink_transport::{SessionId, SignalingHandle, SignalingServer};

use crate::{PeerlinkConfig, PeerlinkError};

/// Builder for configuring and starting a Peerlink server.
///
/// # Example
///
/// ```rust,ignore
/// use peerlink::prelude::*;
///
/// let server = PeerlinkServer::builder()
///     .bind("0.0.0.0")
///     .port(8998)
///     .build(my_engine_factory)
///     .await?;
/// server.run().await
/// ```
pub struct PeerlinkServerBuilder {
    config: PeerlinkConfig,
    sink: Option<Arc<dyn MediaSink>>,
}

impl PeerlinkServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: PeerlinkConfig::default(),
            sink: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: PeerlinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the interface to bind.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.transport.bind_addr = addr.to_string();
        self
    }

    /// Sets the listening port. `0` picks a free one.
    pub fn port(mut self, port: u16) -> Self {
        self.config.transport.port = port;
        self
    }

    pub fn call_on_open(mut self, enabled: bool) -> Self {
        self.config.call_on_open = enabled;
        self
    }

    /// Routes remote tracks to `sink`.
    pub fn media_sink(mut self, sink: impl MediaSink) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Binds the listener and starts the coordinator.
    ///
    /// Nothing is read from connections until [`PeerlinkServer::run`].
    pub async fn build<F: EngineFactory>(
        self,
        factory: F,
    ) -> Result<PeerlinkServer, PeerlinkError> {
        let signaling = SignalingServer::start(&self.config.transport).await?;

        let mut coordinator = Coordinator::new(factory, signaling.handle())
            .config(self.config.negotiation.clone())
            .call_on_open(self.config.call_on_open);
        if let Some(sink) = self.sink {
            coordinator = coordinator.media_sink(sink);
        }
        let coordinator = coordinator.spawn();

        tracing::info!(
            addr = %signaling.local_addr(),
            path = %self.config.transport.path,
            call_on_open = self.config.call_on_open,
            "Peerlink server ready"
        );
        Ok(PeerlinkServer {
            signaling,
            coordinator,
        })
    }
}

impl Default for PeerlinkServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Peerlink server.
///
/// Call [`run()`](Self::run) to start relaying.
pub struct PeerlinkServer {
    signaling: SignalingServer,
    coordinator: CoordinatorHandle,
}

impl PeerlinkServer {
    /// Creates a new builder.
    pub fn builder() -> PeerlinkServerBuilder {
        PeerlinkServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.signaling.local_addr()
    }

    /// Handle to the coordinator, for calls and inspection.
    pub fn coordinator(&self) -> CoordinatorHandle {
        self.coordinator.clone()
    }

    /// Handle to the signaling connections.
    pub fn signaling(&self) -> SignalingHandle {
        self.signaling.handle()
    }

    /// Starts an outgoing offer to the connected peer `id`.
    pub async fn call(&self, id: SessionId) -> Result<(), PeerlinkError> {
        Ok(self.coordinator.call(id).await?)
    }

    /// Relays until the process is terminated.
    pub async fn run(self) -> Result<(), PeerlinkError> {
        self.run_until(std::future::pending()).await
    }

    /// Relays until `shutdown` completes, then closes every connection and
    /// every engine.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), PeerlinkError> {
        tracing::info!("Peerlink server running");

        let pumped = tokio::select! {
            result = pump(&mut self.signaling, &self.coordinator) => result,
            () = shutdown => Ok(()),
        };

        self.signaling.shutdown().await;
        if let Err(e) = self.coordinator.shutdown().await {
            tracing::debug!(error = %e, "coordinator already stopped");
        }
        tracing::info!("Peerlink server stopped");
        pumped
    }
}

/// Forwards every transport event to the coordinator, in arrival order.
async fn pump(
    signaling: &mut SignalingServer,
    coordinator: &CoordinatorHandle,
) -> Result<(), PeerlinkError> {
    while let Some(event) = signaling.next_event().await {
        tracing::trace!(id = %event.session_id(), "transport event");
        coordinator.transport_event(event).await?;
    }
    Ok(())
}
