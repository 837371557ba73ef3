//! `ClashServer` builder and server loop.
//!
//! This is the entry point for running a Clash match server. It ties
//! together all the layers: transport → protocol → session → room.

use std::sync::Arc;
use std::time::Duration;

use clash_protocol::{Codec, JsonCodec};
use clash_room::{MatchConfig, RoomManager};
use clash_session::{SessionConfig, SessionManager};
use clash_transport::{Handshake, Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::ClashError;
use crate::handler::handle_connection;

/// The current protocol version. Clients must send this in their `hello`
/// or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default time a connection may stay silent before it is dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// How often expired sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks.
/// Interior mutability via `Mutex` where needed.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) rooms: Mutex<RoomManager>,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Clash server.
///
/// # Example
///
/// ```rust,ignore
/// use clash::prelude::*;
///
/// let server = ClashServer::builder()
///     .bind("0.0.0.0:3000")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct ClashServerBuilder {
    bind_addr: String,
    match_config: MatchConfig,
    session_config: SessionConfig,
    idle_timeout: Duration,
}

impl ClashServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            match_config: MatchConfig::default(),
            session_config: SessionConfig::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets round timing, rematch window, grace period, and win score.
    pub fn match_config(mut self, config: MatchConfig) -> Self {
        self.match_config = config;
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets how long a connection may stay silent before it is dropped.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<ClashServer<JsonCodec>, ClashError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new(self.session_config)),
            rooms: Mutex::new(RoomManager::new(self.match_config)),
            codec: JsonCodec,
            idle_timeout: self.idle_timeout,
        });

        Ok(ClashServer { transport, state })
    }
}

impl Default for ClashServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Clash match server, bound and ready to accept connections.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ClashServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl ClashServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> ClashServerBuilder {
        ClashServerBuilder::new()
    }
}

impl<C: Codec> ClashServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the server accept loop.
    ///
    /// Spawns a handler task for each accepted connection and a background
    /// task that sweeps expired sessions. Runs until the process is
    /// terminated.
    pub async fn run(mut self) -> Result<(), ClashError> {
        tracing::info!(addr = ?self.local_addr().ok(), "clash server running");

        tokio::spawn(sweep_sessions(Arc::clone(&self.state)));

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    // The handshake runs on the connection's own task so a
                    // slow peer never holds up the accept loop.
                    tokio::spawn(async move {
                        let peer = pending.peer_addr();
                        let conn = match pending.establish().await {
                            Ok(Some(conn)) => conn,
                            Ok(None) => return,
                            Err(e) => {
                                tracing::debug!(%peer, error = %e, "handshake failed");
                                return;
                            }
                        };
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Expires dropped sessions whose resume window passed, forever.
async fn sweep_sessions<C: Codec>(state: Arc<ServerState<C>>) {
    let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let mut sessions = state.sessions.lock().await;
        let expired = sessions.expire_stale();
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "sessions expired");
        }
        sessions.cleanup_expired();
    }
}
