//! Identifiers and value types shared by every layer.
//!
//! Everything here travels on the wire, so the serde attributes are part
//! of the contract with the browser client: identifiers serialize as plain
//! numbers/strings and enums as lowercase or camelCase names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's identifier.
///
/// Issued by the session layer when a connection says hello and kept
/// across transport reconnects (the resume token maps back to it).
/// `#[serde(transparent)]` keeps it a bare number on the wire, and it is
/// also usable as a JSON object key (see `RoundResult::moves`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// The code players share to find a room, e.g. `"AB12CD"`.
///
/// Opaque to everything except the room manager that generates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

// ---------------------------------------------------------------------------
// Moves
// ---------------------------------------------------------------------------

/// One of the three legal hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    Rock,
    Paper,
    Scissors,
}

impl Move {
    /// Returns `true` if `self` wins against `other`.
    ///
    /// Rock crushes scissors, scissors cut paper, paper covers rock.
    pub fn beats(self, other: Move) -> bool {
        matches!(
            (self, other),
            (Move::Rock, Move::Scissors)
                | (Move::Scissors, Move::Paper)
                | (Move::Paper, Move::Rock)
        )
    }

    /// The lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissors => "scissors",
        }
    }
}

impl FromStr for Move {
    type Err = ProtocolError;

    /// Parses a wire name. Anything but the three lowercase names is
    /// rejected, which is how the router validates `move` events.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rock" => Ok(Move::Rock),
            "paper" => Ok(Move::Paper),
            "scissors" => Ok(Move::Scissors),
            other => Err(ProtocolError::InvalidMove(other.to_string())),
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a player showed when a round resolved: a move, or `none` if the
/// round deadline passed before they chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shown {
    Rock,
    Paper,
    Scissors,
    None,
}

impl From<Option<Move>> for Shown {
    fn from(choice: Option<Move>) -> Self {
        match choice {
            Some(Move::Rock) => Shown::Rock,
            Some(Move::Paper) => Shown::Paper,
            Some(Move::Scissors) => Shown::Scissors,
            None => Shown::None,
        }
    }
}

/// Outcome of a single round, from the point of view of player order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Player1,
    Player2,
    Tie,
}

// ---------------------------------------------------------------------------
// Match state
// ---------------------------------------------------------------------------

/// Lifecycle phase of a match session.
///
/// ```text
/// Waiting → Playing → RoundEnd → Playing → … → MatchEnd → Playing (rematch)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// One player, waiting for an opponent. No timer.
    Waiting,
    /// Both players present, round timer running, moves accepted.
    Playing,
    /// Round scored, pause before the next round.
    RoundEnd,
    /// Someone reached the winning score, rematch window open.
    MatchEnd,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Playing => write!(f, "playing"),
            Self::RoundEnd => write!(f, "roundEnd"),
            Self::MatchEnd => write!(f, "matchEnd"),
        }
    }
}

/// How a room was formed. Clients echo it back when rejoining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Room code shared between friends (`createGame` / `joinGame`).
    Friend,
    /// Anonymous matchmaking (`joinRandom`).
    Random,
}

impl GameMode {
    /// The mode a room with the given anonymity flag belongs to.
    pub fn of(anonymous: bool) -> Self {
        if anonymous { Self::Random } else { Self::Friend }
    }
}

/// A player's score as reported in `roundStart` / `roundResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub id: PlayerId,
    pub score: u32,
}

/// Everything a rejoining client needs to redraw the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub room_code: RoomCode,
    pub state: Phase,
    pub round: u32,
    pub scores: Vec<ScoreEntry>,
    /// Moves submitted so far in the current round.
    pub moves: std::collections::BTreeMap<PlayerId, Move>,
    pub rematch_votes: Vec<PlayerId>,
    pub anonymous: bool,
    /// Milliseconds left on the round/pause/rematch timer, if one runs.
    pub time_left_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who should receive an outbound event produced inside a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every present member of the room.
    All,
    /// One specific player.
    Player(PlayerId),
    /// Everyone except the given player.
    AllExcept(PlayerId),
}
