//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The HTTP side of the handshake (including the `/health` route) is served
//! by `hyper`; once a request asks for an upgrade, the raw socket is handed
//! to `tokio-tungstenite` for framing.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{
    CONNECTION, CONTENT_TYPE, HeaderValue, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;

use crate::{Connection, ConnectionId, Handshake, Transport, TransportError};

/// Path answered by the liveness probe instead of a WebSocket upgrade.
pub const HEALTH_PATH: &str = "/health";

/// How long a peer has to send a complete HTTP request.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TokioIo<Upgraded>>;
type Body = Full<Bytes>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    handshake_timeout: Duration,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Sets how long each peer gets to complete its HTTP request.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Pending = PendingWebSocket;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<PendingWebSocket, TransportError> {
        let (stream, addr) = self.listener.accept().await.map_err(TransportError::Accept)?;
        tracing::trace!(%addr, "tcp peer accepted");
        Ok(PendingWebSocket {
            stream,
            addr,
            handshake_timeout: self.handshake_timeout,
        })
    }
}

/// A TCP peer that has not sent its HTTP request yet.
pub struct PendingWebSocket {
    stream: TcpStream,
    addr: SocketAddr,
    handshake_timeout: Duration,
}

impl PendingWebSocket {
    /// The remote address of the peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Handshake for PendingWebSocket {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    /// Serves the peer's HTTP request. `GET /health` is answered with
    /// `200 OK` and the socket closed; a valid upgrade request becomes a
    /// [`WebSocketConnection`]. Anything else gets `400`.
    async fn establish(self) -> Result<Option<WebSocketConnection>, TransportError> {
        let addr = self.addr;
        let limit = self.handshake_timeout;

        let (upgrade_tx, upgrade_rx) = oneshot::channel::<OnUpgrade>();
        let upgrade_tx = Arc::new(Mutex::new(Some(upgrade_tx)));
        let service = service_fn(move |mut req: Request<Incoming>| {
            let upgrade_tx = Arc::clone(&upgrade_tx);
            async move {
                let upgrade_tx = upgrade_tx.lock().await.take();
                Ok::<_, Infallible>(route(&mut req, upgrade_tx))
            }
        });

        let mut builder = http1::Builder::new();
        builder.timer(TokioTimer::new());
        let conn = builder
            .serve_connection(TokioIo::new(self.stream), service)
            .with_upgrades();

        match tokio::time::timeout(limit, conn).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_timeout() => {
                return Err(TransportError::HandshakeTimeout(limit));
            }
            Ok(Err(e)) => return Err(TransportError::Handshake(e.to_string())),
            Err(_) => return Err(TransportError::HandshakeTimeout(limit)),
        }

        // No upgrade was handed over: the request was answered as plain HTTP.
        let Ok(on_upgrade) = upgrade_rx.await else {
            tracing::trace!(%addr, "plain HTTP request answered");
            return Ok(None);
        };
        let upgraded = on_upgrade
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        let ws =
            WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        Ok(Some(WebSocketConnection {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }))
    }
}

/// Answers one request. Upgrade requests hand their `OnUpgrade` to the
/// waiting handshake before the `101` goes out.
fn route(
    req: &mut Request<Incoming>,
    upgrade_tx: Option<oneshot::Sender<OnUpgrade>>,
) -> Response<Body> {
    if req.uri().path() == HEALTH_PATH {
        return plain(StatusCode::OK, "OK");
    }

    let Some(accept_key) = websocket_accept_key(req) else {
        return plain(StatusCode::BAD_REQUEST, "Expected WebSocket upgrade");
    };
    let Some(upgrade_tx) = upgrade_tx else {
        return plain(StatusCode::BAD_REQUEST, "Connection already upgraded");
    };
    let _ = upgrade_tx.send(hyper::upgrade::on(req));

    let mut response = Response::new(Body::default());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(SEC_WEBSOCKET_ACCEPT, accept_key);
    response
}

/// `Sec-WebSocket-Accept` for a well-formed version 13 upgrade request.
fn websocket_accept_key(req: &Request<Incoming>) -> Option<HeaderValue> {
    let headers = req.headers();
    let upgrade = headers.get(UPGRADE)?.to_str().ok()?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return None;
    }
    if headers.get(SEC_WEBSOCKET_VERSION)?.as_bytes() != b"13" {
        return None;
    }
    let key = headers.get(SEC_WEBSOCKET_KEY)?;
    HeaderValue::from_str(&derive_accept_key(key.as_bytes())).ok()
}

fn plain(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

/// A single WebSocket connection.
///
/// The socket is split so that a pending `recv` never blocks `send`.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    /// Sends UTF-8 payloads as text frames (what browsers expect for JSON),
    /// anything else as binary.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.sink.lock().await.send(msg).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await?;
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
