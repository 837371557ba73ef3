//! # Clash
//!
//! Real-time rock/paper/scissors match server.
//!
//! Two players meet either through a shared room code or anonymous
//! matchmaking, play timed best-of rounds, and may agree on a rematch.
//! A player whose connection drops mid-match keeps their seat for a grace
//! period and can rejoin exactly where they left off.
//!
//! The server ties the layers together:
//!
//! ```text
//! clash-transport (WebSocket frames, /health)
//!   → clash-protocol (JSON events)
//!   → clash-session (player identity, resume tokens)
//!   → clash-room (matchmaking, one actor per room)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clash::prelude::*;
//!
//! # async fn run() -> Result<(), ClashError> {
//! let server = ClashServer::builder()
//!     .bind("0.0.0.0:3000")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::ClashError;
pub use server::{ClashServer, ClashServerBuilder, DEFAULT_IDLE_TIMEOUT, PROTOCOL_VERSION};

pub mod prelude {
    pub use crate::{ClashError, ClashServer, ClashServerBuilder, PROTOCOL_VERSION};
    pub use clash_protocol::{
        ClientEvent, GameMode, MatchSnapshot, Move, Phase, PlayerId, RoomCode, ServerEvent,
    };
    pub use clash_room::MatchConfig;
    pub use clash_session::SessionConfig;
}
