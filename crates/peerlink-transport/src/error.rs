use crate::SessionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No open signaling connection exists for this session.
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The WebSocket upgrade was refused (bad path, bad id, timeout).
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
