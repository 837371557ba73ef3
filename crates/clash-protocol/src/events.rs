//! The event vocabulary spoken between browser and server.
//!
//! Every frame is one JSON object `{"event": <name>, "data": <payload>}`.
//! `#[serde(tag = "event", content = "data")]` produces exactly that
//! shape ("adjacently tagged"), and events without a payload are just
//! `{"event": "waiting"}`. Struct payloads use camelCase field names.
//!
//! Both directions are closed enums, so anything the client sends is
//! either one of these variants or a decode error at the boundary; the
//! room layer never sees loosely-typed payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{GameMode, MatchSnapshot, Phase, PlayerId, RoomCode, ScoreEntry, Shown, Verdict};

/// Chat messages are cut to this many characters before being relayed.
pub const MAX_CHAT_CHARS: usize = 200;

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// First frame on every connection. `token` resumes a previous
    /// identity after a transport drop.
    Hello { version: u32, token: Option<String> },

    /// Keep-alive; answered with `heartbeatAck`.
    Heartbeat { client_time: u64 },

    /// Open a friend room and wait for someone to join by code.
    CreateGame,

    /// Join a friend room by code.
    JoinGame(RoomCode),

    /// Enter anonymous matchmaking.
    JoinRandom,

    /// Leave matchmaking / close an unpaired friend room.
    CancelWaiting,

    /// Submit this round's hand. Kept as a string so an illegal name is
    /// reported as "Invalid move" rather than an undecodable frame.
    Move {
        room_code: RoomCode,
        #[serde(rename = "move")]
        choice: String,
    },

    /// Vote for a rematch after the match ended.
    RequestRematch(RoomCode),

    /// Leave the room for good (no grace period).
    LeaveRoom(RoomCode),

    /// Relay a chat line to the room.
    Chat { room_code: RoomCode, message: String },

    /// Re-enter a room after reconnecting.
    AttemptRejoin { room_code: RoomCode, game_mode: GameMode },
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Reply to `hello`: the player's id and the token to resume it.
    Welcome { player_id: PlayerId, token: String },

    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Reply to `createGame`.
    GameCreated(RoomCode),

    /// Reply to `joinRandom` when nobody else is waiting.
    Waiting,

    /// Both players are in; the first round follows immediately.
    GameStart(RoomCode),

    RoundStart { round: u32, scores: Vec<ScoreEntry> },

    RoundResult {
        moves: BTreeMap<PlayerId, Shown>,
        result: Verdict,
        scores: Vec<ScoreEntry>,
        match_winner: Option<PlayerId>,
    },

    /// Broadcast on every new rematch vote.
    RematchRequested { requester_id: PlayerId, votes: Vec<PlayerId> },

    /// Both voted; scores were reset and a new round is starting.
    RematchStarting,

    /// The rematch window closed without consensus; the room is gone.
    MatchTimeout,

    /// The opponent left for good (explicit leave or grace expired).
    PlayerDisconnected { during: Phase },

    /// The opponent's connection dropped; they may come back.
    OpponentTemporaryDisconnect { grace_secs: u64 },

    OpponentReconnected,

    Chat { message: String, sender_id: PlayerId },

    RejoinSuccess(MatchSnapshot),

    RejoinFailed { reason: String },

    /// A request from this client was rejected.
    Error(String),
}

impl ServerEvent {
    /// Shorthand for an `error` event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}
