//! Match timing and scoring settings.

use std::time::Duration;

/// Default command channel size for room actors.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

// ---------------------------------------------------------------------------
// MatchConfig
// ---------------------------------------------------------------------------

/// Configuration shared by every room the manager spawns.
///
/// The defaults are the production values. Tests usually keep them and
/// drive time with `#[tokio::test(start_paused = true)]` instead.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// How long players have to pick a move before the round resolves
    /// with the missing moves counted as `none`.
    pub round_time: Duration,

    /// Pause between a scored round and the next `roundStart`.
    pub round_pause: Duration,

    /// How long both players have to agree on a rematch after the match
    /// ended. The room is torn down when it elapses.
    pub rematch_window: Duration,

    /// How long a dropped player's seat is kept.
    pub reconnect_grace: Duration,

    /// Score that ends the match.
    pub win_score: u32,

    /// Bounded size of each room actor's command inbox.
    pub channel_size: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            round_time: Duration::from_secs(10),
            round_pause: Duration::from_secs(3),
            rematch_window: Duration::from_secs(15),
            reconnect_grace: Duration::from_secs(30),
            win_score: 2,
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}
