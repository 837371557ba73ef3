//! Error types for the session layer.

use clash_protocol::{PlayerId, RoomCode};

/// Errors that can occur while tracking identities and absences.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists for the given player.
    #[error("session not found for player {0}")]
    NotFound(PlayerId),

    /// The resume token doesn't match any session the server issued.
    #[error("invalid resume token")]
    InvalidToken,

    /// The session's resume window has elapsed.
    #[error("session expired for player {0}")]
    SessionExpired(PlayerId),

    /// The token belongs to a session whose connection is still open.
    #[error("player {0} already has an active session")]
    AlreadyConnected(PlayerId),

    /// A rejoin was attempted by a player who isn't recorded as away.
    #[error("player {0} is not away from any room")]
    NotAway(PlayerId),

    /// The player is away, but from a different room.
    #[error("player {player} is not away from room {room}")]
    WrongRoom { player: PlayerId, room: RoomCode },

    /// The player came back after the reconnect grace period.
    #[error("reconnect grace period elapsed for player {0}")]
    GraceExpired(PlayerId),
}
