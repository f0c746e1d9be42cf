//! Where the coordinator's outgoing signaling messages go.

use std::future::Future;

use peerlink_transport::{SessionId, SignalingHandle, TransportError};

/// Sends an encoded signaling message to one session.
///
/// Implemented for the transport's [`SignalingHandle`]; tests plug in a
/// channel instead.
pub trait Outbound: Send + Sync + 'static {
    /// # Errors
    /// [`TransportError::UnknownSession`] if `id` has no open connection.
    fn deliver(
        &self,
        id: &SessionId,
        frame: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl Outbound for SignalingHandle {
    async fn deliver(
        &self,
        id: &SessionId,
        frame: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.send(id, frame).await
    }
}
