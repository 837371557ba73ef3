//! Wire protocol for Clash.
//!
//! This crate defines what the browser and the server say to each other:
//!
//! - **Identifiers and values** ([`PlayerId`], [`RoomCode`], [`Move`],
//!   [`Phase`], [`MatchSnapshot`], …)
//! - **Events** ([`ClientEvent`], [`ServerEvent`]): closed tagged unions,
//!   one per direction.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): events to/from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! It knows nothing about sockets or rooms.
//!
//! ```text
//! Transport (frames) → Protocol (events) → Rooms (match state)
//! ```

mod codec;
mod error;
mod events;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use events::{ClientEvent, MAX_CHAT_CHARS, ServerEvent};
pub use types::{
    GameMode, MatchSnapshot, Move, Phase, PlayerId, Recipient, RoomCode, ScoreEntry, Shown,
    Verdict,
};
