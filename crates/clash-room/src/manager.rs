//! Room manager: creates, tracks, and routes players to rooms.
//!
//! Holds every registry the server needs about matches in one value:
//!
//! - the room store (code → actor handle)
//! - which player sits in which room
//! - the anonymous matchmaking pool
//! - who is away from which room ([`DisconnectTracker`])
//! - the connection registry (player → outbound channel)
//!
//! The server owns one behind an async mutex. Room actors report their own
//! closure over a channel; the manager drains it before every operation, so
//! a room that timed out is gone by the time anyone asks about it.

use std::collections::HashMap;

use clash_protocol::{GameMode, MatchSnapshot, Move, Phase, PlayerId, RoomCode};
use clash_session::DisconnectTracker;
use rand::Rng;
use tokio::sync::mpsc;

use crate::room::spawn_room;
use crate::{MatchConfig, MatchmakingPool, PlayerSender, RoomError, RoomHandle, RoomInfo};

/// Characters room codes are drawn from.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of the random part of a room code.
const CODE_LEN: usize = 6;

/// Prefix that marks rooms formed by anonymous matchmaking.
const ANONYMOUS_PREFIX: &str = "RND-";

/// Result of a `joinRandom` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matchmaking {
    /// Paired with a waiting player; both were seated in this room.
    Paired(RoomCode),
    /// Nobody else is waiting; the player is now enrolled in the pool.
    Waiting,
}

/// Manages all live rooms and tracks which player is in which room.
///
/// This is the entry point for room operations from the server's event
/// router. A player is in at most one room at a time.
pub struct RoomManager {
    config: MatchConfig,

    /// Live rooms, keyed by code.
    rooms: HashMap<RoomCode, RoomHandle>,

    /// Maps each player to the room they sit in (present or away).
    player_rooms: HashMap<PlayerId, RoomCode>,

    pool: MatchmakingPool,

    absences: DisconnectTracker,

    /// Outbound channel of each connected player's current connection.
    connections: HashMap<PlayerId, PlayerSender>,

    closed_tx: mpsc::UnboundedSender<RoomCode>,
    closed_rx: mpsc::UnboundedReceiver<RoomCode>,
}

impl RoomManager {
    /// Creates a new, empty room manager.
    pub fn new(config: MatchConfig) -> Self {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        Self {
            config,
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            pool: MatchmakingPool::new(),
            absences: DisconnectTracker::new(),
            connections: HashMap::new(),
            closed_tx,
            closed_rx,
        }
    }

    // -----------------------------------------------------------------
    // Connection registry
    // -----------------------------------------------------------------

    /// Registers the outbound channel of a player's current connection,
    /// replacing any previous one.
    pub fn register(&mut self, player: PlayerId, sender: PlayerSender) {
        self.connections.insert(player, sender);
    }

    /// Drops a player's registration, but only if `sender` is still the
    /// registered channel. A stale connection closing after its player
    /// reconnected elsewhere leaves the new registration alone.
    ///
    /// Returns whether the registration was removed.
    pub fn unregister(&mut self, player: PlayerId, sender: &PlayerSender) -> bool {
        match self.connections.get(&player) {
            Some(current) if current.same_channel(sender) => {
                self.connections.remove(&player);
                true
            }
            _ => false,
        }
    }

    pub fn is_connected(&self, player: PlayerId) -> bool {
        self.connections.contains_key(&player)
    }

    // -----------------------------------------------------------------
    // Matchmaking
    // -----------------------------------------------------------------

    /// Opens a friend room with `player` in seat one. Returns its code.
    pub async fn create_room(&mut self, player: PlayerId) -> Result<RoomCode, RoomError> {
        self.reap();
        self.ensure_free(player).await?;
        let sender = self.sender_of(player)?;
        self.pool.remove(player);

        let handle = self.open_room(false);
        let room_code = handle.room_code().clone();
        handle.join(player, sender).await?;
        self.player_rooms.insert(player, room_code.clone());

        tracing::info!(%room_code, %player, "friend room created");
        Ok(room_code)
    }

    /// Seats `player` in the friend room `room_code`. Filling the room
    /// starts the match; the room broadcasts `gameStart` itself.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] for unknown and anonymous rooms,
    /// [`RoomError::RoomFull`] for full rooms and the player's own room,
    /// [`RoomError::AlreadyInRoom`] if the player sits in another room.
    pub async fn join_room(
        &mut self,
        player: PlayerId,
        room_code: &RoomCode,
    ) -> Result<(), RoomError> {
        self.reap();
        if self.player_rooms.get(&player) == Some(room_code) && !self.absences.is_away(player) {
            return Err(RoomError::RoomFull(room_code.clone()));
        }
        self.ensure_free(player).await?;
        let sender = self.sender_of(player)?;

        let handle = self
            .rooms
            .get(room_code)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(room_code.clone()))?;
        let info = handle.get_info().await?;
        if info.anonymous {
            return Err(RoomError::NotFound(room_code.clone()));
        }

        handle.join(player, sender).await?;
        self.pool.remove(player);
        self.player_rooms.insert(player, room_code.clone());
        Ok(())
    }

    /// Enrolls `player` in anonymous matchmaking and pairs them with the
    /// longest-waiting other player, if there is one.
    ///
    /// The earlier waiter takes seat one.
    pub async fn join_random(&mut self, player: PlayerId) -> Result<Matchmaking, RoomError> {
        self.reap();
        self.ensure_free(player).await?;
        let sender = self.sender_of(player)?;

        self.pool.enroll(player);
        let Some(partner) = self.pool.take_partner(player) else {
            tracing::debug!(%player, waiting = self.pool.len(), "waiting for an opponent");
            return Ok(Matchmaking::Waiting);
        };

        let Some(partner_sender) = self.connections.get(&partner).cloned() else {
            // The partner's connection is gone; keep the requester queued.
            tracing::warn!(%partner, "pooled player has no connection, skipping");
            self.pool.enroll(player);
            return Ok(Matchmaking::Waiting);
        };

        let handle = self.open_room(true);
        let room_code = handle.room_code().clone();
        handle.join(partner, partner_sender).await?;
        self.player_rooms.insert(partner, room_code.clone());
        handle.join(player, sender).await?;
        self.player_rooms.insert(player, room_code.clone());

        tracing::info!(%room_code, first = %partner, second = %player, "anonymous players paired");
        Ok(Matchmaking::Paired(room_code))
    }

    /// Takes `player` out of the pool and closes their unpaired friend
    /// room, if any. Doing nothing is not an error.
    pub async fn cancel_waiting(&mut self, player: PlayerId) -> Result<(), RoomError> {
        self.reap();
        if self.pool.remove(player) {
            tracing::debug!(%player, "left matchmaking");
        }

        let Some(room_code) = self.player_rooms.get(&player).cloned() else {
            return Ok(());
        };
        let Some(handle) = self.rooms.get(&room_code).cloned() else {
            return Ok(());
        };
        if handle.get_info().await?.phase == Phase::Waiting {
            handle.leave(player).await?;
            self.forget_room(&room_code);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // In-room actions
    // -----------------------------------------------------------------

    /// Forwards a validated move to the player's room.
    pub async fn submit_move(
        &mut self,
        player: PlayerId,
        room_code: &RoomCode,
        choice: Move,
    ) -> Result<(), RoomError> {
        self.reap();
        self.member_room(player, room_code)?
            .submit_move(player, choice)
            .await
    }

    /// Forwards a rematch vote to the player's room.
    pub async fn request_rematch(
        &mut self,
        player: PlayerId,
        room_code: &RoomCode,
    ) -> Result<(), RoomError> {
        self.reap();
        self.member_room(player, room_code)?
            .request_rematch(player)
            .await
    }

    /// Relays a chat line to the player's room.
    pub async fn chat(
        &mut self,
        player: PlayerId,
        room_code: &RoomCode,
        message: String,
    ) -> Result<(), RoomError> {
        self.reap();
        self.member_room(player, room_code)?
            .chat(player, message)
            .await
    }

    /// Leaves a room for good. The room closes and the other player is
    /// told `playerDisconnected`.
    pub async fn leave_room(
        &mut self,
        player: PlayerId,
        room_code: &RoomCode,
    ) -> Result<(), RoomError> {
        self.reap();
        let handle = self.member_room(player, room_code)?;
        handle.leave(player).await?;
        self.forget_room(room_code);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Disconnect / rejoin
    // -----------------------------------------------------------------

    /// Handles a dropped connection.
    ///
    /// Removes the player from the pool. If they sat in a full room, the
    /// room holds their seat for the reconnect grace period and they are
    /// recorded as away; otherwise the room closes.
    pub async fn disconnect(&mut self, player: PlayerId) {
        self.reap();
        self.pool.remove(player);

        let Some(room_code) = self.player_rooms.get(&player).cloned() else {
            return;
        };
        let Some(handle) = self.rooms.get(&room_code).cloned() else {
            self.player_rooms.remove(&player);
            return;
        };

        match handle.disconnect(player).await {
            // An existing absence keeps its original deadline.
            Ok(true) if self.absences.get(player).is_some() => {}
            Ok(true) => {
                self.absences
                    .record(player, room_code, self.config.reconnect_grace);
            }
            Ok(false) | Err(_) => self.forget_room(&room_code),
        }
    }

    /// Puts an away player back in their seat.
    ///
    /// On success the room has already sent `rejoinSuccess` to the player
    /// and `opponentReconnected` to the opponent; the snapshot is returned
    /// as well.
    ///
    /// # Errors
    /// [`RoomError::Session`] when the player isn't away from this room or
    /// the grace period has passed, [`RoomError::WrongMode`] when
    /// `mode` doesn't match how the room was formed.
    pub async fn rejoin(
        &mut self,
        player: PlayerId,
        room_code: &RoomCode,
        mode: GameMode,
    ) -> Result<MatchSnapshot, RoomError> {
        self.reap();
        self.absences.check(player, room_code)?;
        let sender = self.sender_of(player)?;
        let handle = self
            .rooms
            .get(room_code)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(room_code.clone()))?;

        let snapshot = handle.rejoin(player, mode, sender).await?;
        self.absences.remove(player);
        Ok(snapshot)
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Returns the code of the room a player sits in, if any.
    pub fn player_room(&mut self, player: PlayerId) -> Option<RoomCode> {
        self.reap();
        self.player_rooms.get(&player).cloned()
    }

    /// Returns info about a specific room.
    pub async fn room_info(&mut self, room_code: &RoomCode) -> Result<RoomInfo, RoomError> {
        self.reap();
        let handle = self
            .rooms
            .get(room_code)
            .ok_or_else(|| RoomError::NotFound(room_code.clone()))?;
        handle.get_info().await
    }

    /// Returns the number of live rooms.
    pub fn room_count(&mut self) -> usize {
        self.reap();
        self.rooms.len()
    }

    /// Returns the number of players waiting for an anonymous opponent.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Returns `true` if the player's seat is being held for them.
    pub fn is_away(&mut self, player: PlayerId) -> bool {
        self.reap();
        self.absences.is_away(player)
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// Forgets rooms whose actors have stopped.
    fn reap(&mut self) {
        while let Ok(room_code) = self.closed_rx.try_recv() {
            // A notice can arrive after the manager already forgot the
            // room itself; only act on handles that really stopped.
            if self.rooms.get(&room_code).is_some_and(RoomHandle::is_closed) {
                self.forget_room(&room_code);
            }
        }
        self.absences.expire_stale();
    }

    /// Drops a room from every registry.
    fn forget_room(&mut self, room_code: &RoomCode) {
        if self.rooms.remove(room_code).is_some() {
            tracing::debug!(%room_code, "room forgotten");
        }
        self.player_rooms.retain(|_, code| code != room_code);
        self.absences.forget_room(room_code);
    }

    /// Rejects players who already sit in a live room. A player who is
    /// merely away from a room gives it up, as if they had left it.
    async fn ensure_free(&mut self, player: PlayerId) -> Result<(), RoomError> {
        let Some(room_code) = self.player_rooms.get(&player).cloned() else {
            return Ok(());
        };
        if !self.absences.is_away(player) {
            return Err(RoomError::AlreadyInRoom(player, room_code));
        }

        tracing::info!(%room_code, %player, "away player abandons room");
        if let Some(handle) = self.rooms.get(&room_code).cloned() {
            let _ = handle.leave(player).await;
        }
        self.absences.remove(player);
        self.forget_room(&room_code);
        Ok(())
    }

    fn sender_of(&self, player: PlayerId) -> Result<PlayerSender, RoomError> {
        self.connections
            .get(&player)
            .cloned()
            .ok_or(RoomError::NotConnected(player))
    }

    /// The handle of `room_code`, if `player` sits in it.
    fn member_room(&self, player: PlayerId, room_code: &RoomCode) -> Result<RoomHandle, RoomError> {
        if self.player_rooms.get(&player) != Some(room_code) {
            return Err(RoomError::NotInRoom(player, room_code.clone()));
        }
        self.rooms
            .get(room_code)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(room_code.clone()))
    }

    /// Spawns a room actor under a fresh code.
    fn open_room(&mut self, anonymous: bool) -> RoomHandle {
        let room_code = self.fresh_code(anonymous);
        let handle = spawn_room(
            room_code.clone(),
            anonymous,
            self.config.clone(),
            self.closed_tx.clone(),
        );
        self.rooms.insert(room_code, handle.clone());
        handle
    }

    fn fresh_code(&self, anonymous: bool) -> RoomCode {
        let mut rng = rand::rng();
        loop {
            let suffix: String = (0..CODE_LEN)
                .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
                .collect();
            let code = if anonymous {
                RoomCode(format!("{ANONYMOUS_PREFIX}{suffix}"))
            } else {
                RoomCode(suffix)
            };
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(MatchConfig::default())
    }
}
