//! Transport layer for Clash.
//!
//! Provides the [`Transport`] and [`Connection`] traits the server is
//! written against, plus the WebSocket implementation used in production.
//! The match orchestrator never touches sockets directly: it only needs
//! "send these bytes to connection C" and "receive the next frame from C".
//!
//! Accepting is split in two. [`Transport::accept`] only takes the next TCP
//! peer off the listener; [`Handshake::establish`] then reads the HTTP
//! request, under a timeout, on the caller's own task. A peer that connects
//! and never speaks holds up nobody but itself.
//!
//! The WebSocket listener also answers the plain-HTTP liveness probe
//! (`GET /health`) on the same port, see [`HEALTH_PATH`].
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    DEFAULT_HANDSHAKE_TIMEOUT, HEALTH_PATH, PendingWebSocket, WebSocketConnection,
    WebSocketTransport,
};

use std::fmt;

/// Opaque identifier for one accepted connection.
///
/// This names the socket, not the player: a player who reconnects gets a
/// new `ConnectionId` but keeps their player id (see `clash-session`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming peers.
pub trait Transport: Send + Sync + 'static {
    /// A peer whose handshake has not run yet.
    type Pending: Handshake<Error = Self::Error>;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next peer. Nothing is read from it here.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;
}

/// The second half of accepting: turning a raw peer into a [`Connection`].
pub trait Handshake: Send + 'static {
    /// The connection produced by a successful upgrade.
    type Connection: Connection;
    /// The error type for the handshake.
    type Error: std::error::Error + Send + Sync;

    /// Runs the handshake.
    ///
    /// Returns `Ok(None)` when the peer made a plain HTTP request (such as
    /// the health probe) that was answered and closed.
    async fn establish(self) -> Result<Option<Self::Connection>, Self::Error>;
}

/// A single connection that can send and receive frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "first");
        map.insert(ConnectionId::new(2), "second");
        assert_eq!(map[&ConnectionId::new(1)], "first");
        assert_ne!(ConnectionId::new(1), ConnectionId::new(2));
    }
}
