use std::time::Duration;

/// Errors raised by the listener and by individual connections.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting a TCP stream failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The peer's HTTP request was not a usable WebSocket upgrade.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// The peer did not finish its handshake in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Reading or writing a frame on an established socket failed.
    #[cfg(feature = "websocket")]
    #[error("websocket error: {0}")]
    Frame(#[from] tokio_tungstenite::tungstenite::Error),
}
