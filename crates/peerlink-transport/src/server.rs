//! The signaling hub: one listener, many connections, one event stream.
//!
//! The accept loop only takes TCP connections; each one is upgraded in its
//! own task, so a client that stalls mid-handshake holds up nobody else.
//! Each upgraded connection gets a reader task and a writer task. Readers
//! push [`TransportEvent`]s into a single queue (so events for one session
//! keep their wire order), writers drain a per-session outbound queue so
//! [`SignalingHandle::send`] never waits on socket I/O.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION, Connection, Frame,
    SessionId, Transport, TransportConfig, TransportError,
    WebSocketConnection, WebSocketTransport,
};

/// Something that happened on a signaling connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer finished the WebSocket upgrade.
    Opened(SessionId),
    /// A frame arrived from a peer.
    Message(SessionId, Vec<u8>),
    /// The connection is gone. Always the last event for a session.
    Closed(SessionId, u16, String),
    /// The connection failed. A `Closed` event follows.
    Error(SessionId, String),
}

impl TransportEvent {
    /// The session this event belongs to.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Opened(id)
            | Self::Message(id, _)
            | Self::Closed(id, _, _)
            | Self::Error(id, _) => id,
        }
    }
}

/// Work for a connection's writer task.
enum Outgoing {
    Frame(Vec<u8>),
    Close(u16, String),
}

type PeerTable = Arc<RwLock<HashMap<SessionId, mpsc::UnboundedSender<Outgoing>>>>;

/// Cheap, cloneable send side of the [`SignalingServer`].
#[derive(Clone)]
pub struct SignalingHandle {
    peers: PeerTable,
}

impl SignalingHandle {
    /// Queues `data` as one text frame to session `id`.
    ///
    /// # Errors
    /// [`TransportError::UnknownSession`] if no connection is open for `id`.
    pub async fn send(
        &self,
        id: &SessionId,
        data: Vec<u8>,
    ) -> Result<(), TransportError> {
        let peers = self.peers.read().await;
        let tx = peers
            .get(id)
            .ok_or_else(|| TransportError::UnknownSession(id.clone()))?;
        tx.send(Outgoing::Frame(data))
            .map_err(|_| TransportError::UnknownSession(id.clone()))
    }

    /// Asks the connection for `id` to close.
    pub async fn close(
        &self,
        id: &SessionId,
        code: u16,
        reason: &str,
    ) -> Result<(), TransportError> {
        let peers = self.peers.read().await;
        let tx = peers
            .get(id)
            .ok_or_else(|| TransportError::UnknownSession(id.clone()))?;
        tx.send(Outgoing::Close(code, reason.to_string()))
            .map_err(|_| TransportError::UnknownSession(id.clone()))
    }

    /// Returns `true` if a connection is open for `id`.
    pub async fn is_open(&self, id: &SessionId) -> bool {
        self.peers.read().await.contains_key(id)
    }

    /// Ids of all open connections.
    pub async fn sessions(&self) -> Vec<SessionId> {
        self.peers.read().await.keys().cloned().collect()
    }
}

/// A running signaling listener.
///
/// Dropping the server stops accepting new connections; connections that
/// are already open keep running until they close.
pub struct SignalingServer {
    local_addr: SocketAddr,
    handle: SignalingHandle,
    events: mpsc::Receiver<TransportEvent>,
    transport: Arc<WebSocketTransport>,
    accept_task: JoinHandle<()>,
}

impl SignalingServer {
    /// Binds the listener described by `config` and starts accepting.
    pub async fn start(config: &TransportConfig) -> Result<Self, TransportError> {
        let transport = Arc::new(WebSocketTransport::from_config(config).await?);
        let local_addr = transport
            .local_addr()
            .map_err(TransportError::AcceptFailed)?;

        let peers: PeerTable = Arc::new(RwLock::new(HashMap::new()));
        let (event_tx, events) = mpsc::channel(config.event_capacity.max(1));
        let accept_task = tokio::spawn(accept_loop(
            Arc::clone(&transport),
            Arc::clone(&peers),
            event_tx,
        ));

        Ok(Self {
            local_addr,
            handle: SignalingHandle { peers },
            events,
            transport,
            accept_task,
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a send handle that can be cloned into other tasks.
    pub fn handle(&self) -> SignalingHandle {
        self.handle.clone()
    }

    /// Waits for the next event from any connection.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Stops accepting and closes every open connection.
    pub async fn shutdown(&self) {
        if let Err(e) = self.transport.shutdown().await {
            tracing::debug!(error = %e, "listener already stopped");
        }
        self.accept_task.abort();
        for id in self.handle.sessions().await {
            let _ = self.handle.close(&id, CLOSE_NORMAL, "server shutting down").await;
        }
        tracing::info!("signaling server shut down");
    }
}

impl Drop for SignalingServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    transport: Arc<WebSocketTransport>,
    peers: PeerTable,
    events: mpsc::Sender<TransportEvent>,
) {
    let handshake = transport.handshake();
    loop {
        match transport.accept_tcp().await {
            Ok((stream, addr)) => {
                let handshake = handshake.clone();
                let peers = Arc::clone(&peers);
                let events = events.clone();
                tokio::spawn(async move {
                    match handshake.upgrade(stream, addr).await {
                        Ok(conn) => serve_connection(conn, peers, events).await,
                        Err(TransportError::HandshakeRejected(reason)) => {
                            tracing::debug!(%addr, %reason, "handshake rejected");
                        }
                        Err(e) => {
                            tracing::warn!(%addr, error = %e, "handshake failed");
                        }
                    }
                });
            }
            Err(TransportError::Shutdown) => {
                tracing::debug!("accept loop stopped");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
}

/// Runs one connection from registration to removal.
async fn serve_connection(
    conn: WebSocketConnection,
    peers: PeerTable,
    events: mpsc::Sender<TransportEvent>,
) {
    let id = conn.id().clone();
    let conn = Arc::new(conn);
    let (tx, rx) = mpsc::unbounded_channel();

    {
        let mut table = peers.write().await;
        if table.contains_key(&id) {
            drop(table);
            tracing::warn!(%id, "session id already connected, refusing");
            let _ = conn
                .close(CLOSE_POLICY_VIOLATION, "session id already connected")
                .await;
            return;
        }
        table.insert(id.clone(), tx);
    }

    tracing::info!(%id, "signaling connection opened");
    let writer = tokio::spawn(write_loop(Arc::clone(&conn), rx));

    let (code, reason) = if events.send(TransportEvent::Opened(id.clone())).await.is_err() {
        (CLOSE_NORMAL, String::new())
    } else {
        read_loop(&conn, &events).await
    };

    // Unregister before announcing the close, so sends racing with the
    // Closed event already fail with UnknownSession.
    peers.write().await.remove(&id);
    writer.abort();

    tracing::info!(%id, code, %reason, "signaling connection closed");
    let _ = events.send(TransportEvent::Closed(id, code, reason)).await;
}

async fn read_loop(
    conn: &WebSocketConnection,
    events: &mpsc::Sender<TransportEvent>,
) -> (u16, String) {
    let id = conn.id();
    loop {
        match conn.recv().await {
            Ok(Frame::Data(data)) => {
                tracing::trace!(%id, len = data.len(), "frame received");
                if events
                    .send(TransportEvent::Message(id.clone(), data))
                    .await
                    .is_err()
                {
                    return (CLOSE_NORMAL, String::new());
                }
            }
            Ok(Frame::Closed { code, reason }) => return (code, reason),
            Err(e) => {
                tracing::debug!(%id, error = %e, "recv error");
                let _ = events
                    .send(TransportEvent::Error(id.clone(), e.to_string()))
                    .await;
                return (CLOSE_ABNORMAL, String::new());
            }
        }
    }
}

async fn write_loop(
    conn: Arc<WebSocketConnection>,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
) {
    while let Some(out) = rx.recv().await {
        let result = match out {
            Outgoing::Frame(data) => conn.send(&data).await,
            Outgoing::Close(code, reason) => conn.close(code, &reason).await,
        };
        if let Err(e) = result {
            tracing::debug!(id = %conn.id(), error = %e, "send error");
            break;
        }
    }
}
