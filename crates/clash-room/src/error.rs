//! Error types for the room layer.

use clash_protocol::{PlayerId, RoomCode};
use clash_session::SessionError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No live room has this code (or it isn't joinable by code).
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The room already has two players.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// The player already sits in a live room.
    #[error("player {0} already in room {1}")]
    AlreadyInRoom(PlayerId, RoomCode),

    /// The player is not a member of this room.
    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomCode),

    /// The player has no registered connection to deliver events to.
    #[error("player {0} has no open connection")]
    NotConnected(PlayerId),

    /// A rejoin named the wrong game mode for the room.
    #[error("room {0} was not created in that game mode")]
    WrongMode(RoomCode),

    /// The room's command channel is full or closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),

    /// The disconnect tracker refused a rejoin.
    #[error(transparent)]
    Session(#[from] SessionError),
}
