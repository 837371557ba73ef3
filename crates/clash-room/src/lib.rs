//! Match rooms for Clash.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns one
//! two-player match: seats, scores, the current round's moves, and a
//! single deadline timer.
//!
//! # Key types
//!
//! - [`RoomManager`]: creates/destroys rooms, runs matchmaking, routes
//!   players, tracks who is away
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`MatchState`]: the round/match state machine, free of I/O
//! - [`MatchConfig`]: round time, pause, rematch window, grace, win score
//! - [`determine_winner`]: scoring for a single round

mod config;
mod error;
mod manager;
mod pool;
mod room;
mod rules;
mod state;

pub use config::{DEFAULT_CHANNEL_SIZE, MatchConfig};
pub use error::RoomError;
pub use manager::{Matchmaking, RoomManager};
pub use pool::MatchmakingPool;
pub use room::{PlayerSender, RoomHandle, RoomInfo};
pub use rules::determine_winner;
pub use state::{MatchState, MoveOutcome, Outbound, Player, VoteOutcome};
