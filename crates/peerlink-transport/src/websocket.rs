//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::{
    CLOSE_ABNORMAL, Connection, Frame, SessionId, Transport, TransportConfig,
    TransportError,
};

/// Close code reported when the peer sent a close frame without a status.
const CLOSE_NO_STATUS: u16 = 1005;

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    handshake: Handshake,
    stopped: watch::Sender<bool>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address, serving `/`.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let config = TransportConfig::default();
        Self::bind_with(addr, &config.path, config.handshake_timeout()).await
    }

    /// Binds using the address, path and timeout from `config`.
    pub async fn from_config(
        config: &TransportConfig,
    ) -> Result<Self, TransportError> {
        Self::bind_with(
            &config.socket_addr(),
            &config.path,
            config.handshake_timeout(),
        )
        .await
    }

    async fn bind_with(
        addr: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, path, "WebSocket transport listening");
        Ok(Self {
            listener,
            handshake: Handshake {
                path: path.to_string(),
                timeout,
            },
            stopped: watch::channel(false).0,
        })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts the next TCP connection without upgrading it.
    ///
    /// Returns [`TransportError::Shutdown`] once [`Transport::shutdown`]
    /// has been called.
    pub(crate) async fn accept_tcp(
        &self,
    ) -> Result<(TcpStream, SocketAddr), TransportError> {
        let mut stopped = self.stopped.subscribe();
        tokio::select! {
            result = self.listener.accept() => {
                result.map_err(TransportError::AcceptFailed)
            }
            _ = stopped.wait_for(|stopped| *stopped) => Err(TransportError::Shutdown),
        }
    }

    /// The upgrade settings, for running handshakes off the accept loop.
    pub(crate) fn handshake(&self) -> Handshake {
        self.handshake.clone()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self.accept_tcp().await?;
        self.handshake.upgrade(stream, addr).await
    }

    /// Stops accepting. Connections that are already open are unaffected.
    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.stopped.send_replace(true);
        Ok(())
    }
}

/// The WebSocket upgrade for one accepted TCP stream.
#[derive(Debug, Clone)]
pub(crate) struct Handshake {
    path: String,
    timeout: Duration,
}

impl Handshake {
    /// Runs the HTTP upgrade, bounded by the handshake timeout.
    pub(crate) async fn upgrade(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<WebSocketConnection, TransportError> {
        let path = self.path.as_str();
        let mut requested: Option<SessionId> = None;
        let mut rejection: Option<String> = None;
        let callback = |req: &Request,
                        resp: Response|
         -> Result<Response, ErrorResponse> {
            match route(req, path) {
                Ok(id) => {
                    requested = id;
                    Ok(resp)
                }
                Err((status, reason)) => {
                    rejection = Some(reason.clone());
                    Err(reject(status, reason))
                }
            }
        };

        let handshake = tokio_tungstenite::accept_hdr_async(stream, callback);
        let outcome = tokio::time::timeout(self.timeout, handshake).await;

        let ws = match outcome {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                return Err(match rejection {
                    Some(reason) => {
                        tracing::debug!(%addr, %reason, "refused WebSocket upgrade");
                        TransportError::HandshakeRejected(reason)
                    }
                    None => TransportError::AcceptFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        e,
                    )),
                });
            }
            Err(_) => {
                return Err(TransportError::HandshakeRejected(format!(
                    "handshake with {addr} timed out"
                )));
            }
        };

        let id = requested.unwrap_or_else(SessionId::generate);
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

/// Checks the request path and extracts the optional `?id=` parameter.
fn route(
    req: &Request,
    path: &str,
) -> Result<Option<SessionId>, (StatusCode, String)> {
    if req.uri().path() != path {
        return Err((
            StatusCode::NOT_FOUND,
            format!("no signaling service at {}", req.uri().path()),
        ));
    }
    let Some(query) = req.uri().query() else {
        return Ok(None);
    };
    match query.split('&').find_map(|pair| pair.strip_prefix("id=")) {
        Some(raw) => SessionId::parse(raw).map(Some).ok_or_else(|| {
            (StatusCode::BAD_REQUEST, format!("invalid session id {raw:?}"))
        }),
        None => Ok(None),
    }
}

fn reject(status: StatusCode, reason: String) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(reason));
    *resp.status_mut() = status;
    resp
}

/// A single WebSocket connection.
///
/// The socket is split so a pending `recv` never holds up a `send`.
pub struct WebSocketConnection {
    id: SessionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let text = String::from_utf8(data.to_vec()).map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e,
            ))
        })?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| {
                TransportError::SendFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }

    async fn recv(&self) -> Result<Frame, Self::Error> {
        loop {
            let msg = self.stream.lock().await.next().await;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Frame::Data(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Frame::Data(data.to_vec()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (u16::from(f.code), f.reason.as_str().to_owned()),
                        None => (CLOSE_NO_STATUS, String::new()),
                    };
                    return Ok(Frame::Closed { code, reason });
                }
                None => {
                    return Ok(Frame::Closed {
                        code: CLOSE_ABNORMAL,
                        reason: String::new(),
                    });
                }
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), Self::Error> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.sink
            .lock()
            .await
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| {
                TransportError::SendFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }

    fn id(&self) -> &SessionId {
        &self.id
    }
}
