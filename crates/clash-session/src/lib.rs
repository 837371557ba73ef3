//! Player sessions for Clash.
//!
//! This crate answers two questions:
//!
//! 1. **Who is this connection?** ([`SessionManager`]) Every connection
//!    says `hello` first and is handed a [`PlayerId`](clash_protocol::PlayerId)
//!    plus a resume token. Presenting the token again after a drop gets the
//!    same identity back.
//! 2. **Who is away from which room?** ([`DisconnectTracker`]) A player
//!    who drops out of a match keeps their seat for a grace period; the
//!    tracker decides whether a rejoin is still allowed.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)      ← asks the tracker before letting a player back in
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← provides PlayerId, RoomCode
//! ```

mod error;
mod manager;
mod session;
mod tracker;

pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Session, SessionConfig, SessionState};
pub use tracker::{Absence, DisconnectTracker};
