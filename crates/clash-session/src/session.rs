//! Session types: the server's record of a player identity.
//!
//! A session outlives any single connection. It tracks:
//! - WHO the player is (`PlayerId`)
//! - WHETHER their connection is currently open
//! - HOW a new connection can claim the identity back (a secret token)

use tokio::time::Instant;

use clash_protocol::PlayerId;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long (in seconds) a dropped identity can be resumed with its
    /// token before it expires.
    ///
    /// Default: 30 seconds, the same as a room's reconnect grace, so a
    /// player who makes it back in time for their room also gets their
    /// identity back. Set to 0 to disable resuming.
    pub resume_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resume_grace_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Connection state of a session.
///
/// ```text
///   Connected ──(drop)──→ Disconnected ──(timeout)──→ Expired
///       ↑                      │
///       └───────(resume)───────┘
/// ```
#[derive(Debug, Clone)]
pub enum SessionState {
    /// A connection currently speaks for this player.
    Connected,

    /// The connection dropped at `since`. The identity can be resumed
    /// until `since + resume_grace`.
    Disconnected { since: Instant },

    /// Too late to resume; waiting for cleanup.
    Expired,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single player identity on the server.
#[derive(Debug, Clone)]
pub struct Session {
    /// The identifier every room and event refers to.
    pub player_id: PlayerId,

    /// Current connection state.
    pub state: SessionState,

    /// Secret handed to the client in `welcome`; presenting it in a later
    /// `hello` resumes this identity. 32 hex characters (128 bits).
    pub resume_token: String,
}
