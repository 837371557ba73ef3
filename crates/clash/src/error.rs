//! Unified error type for the Clash server.

use clash_protocol::ProtocolError;
use clash_room::RoomError;
use clash_session::SessionError;
use clash_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ClashError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, bad hello).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (unknown player, expired token).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (full, not found, already in a room).
    #[error(transparent)]
    Room(#[from] RoomError),
}
