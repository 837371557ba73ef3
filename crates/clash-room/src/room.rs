//! Room actor: an isolated Tokio task that owns one match.
//!
//! Each room runs in its own task, communicating with the outside world
//! through an mpsc channel. This is the "actor model": no shared
//! mutable state, just message passing. Commands and timer expiries are
//! handled one at a time in a single `select!` loop, so a move that
//! completes a round can never interleave with that round's deadline.

use std::collections::HashMap;
use std::ops::ControlFlow;

use clash_clock::{MatchClock, TimerKind};
use clash_protocol::{
    GameMode, MAX_CHAT_CHARS, MatchSnapshot, Move, Phase, PlayerId, Recipient, RoomCode,
    ServerEvent,
};
use tokio::sync::{mpsc, oneshot};

use crate::state::{MatchState, MoveOutcome, Outbound, VoteOutcome};
use crate::{MatchConfig, RoomError};

/// Channel sender for delivering outbound events to a player's
/// connection handler.
pub type PlayerSender = mpsc::UnboundedSender<ServerEvent>;

/// Commands sent to a room actor through its channel.
///
/// The `oneshot::Sender` in some variants is a "reply channel": the
/// caller sends a command and waits for the response on that channel.
pub(crate) enum RoomCommand {
    /// Seat a player. Filling the second seat starts the match.
    Join {
        player: PlayerId,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    /// A validated move for the current round.
    Move { player: PlayerId, choice: Move },

    /// A rematch vote.
    Rematch { player: PlayerId },

    /// Relay a chat line to the room.
    Chat { player: PlayerId, message: String },

    /// Leave for good. Closes the room.
    Leave {
        player: PlayerId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    /// The player's connection dropped. The reply says whether their seat
    /// is being held (`true`) or the room is closing (`false`).
    Disconnect {
        player: PlayerId,
        reply: oneshot::Sender<bool>,
    },

    /// An away player wants their seat back.
    Rejoin {
        player: PlayerId,
        mode: GameMode,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<MatchSnapshot, RoomError>>,
    },

    /// Request the current room metadata.
    GetInfo { reply: oneshot::Sender<RoomInfo> },
}

/// A snapshot of room metadata.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_code: RoomCode,
    pub phase: Phase,
    /// Seated players in seat order (including an away player).
    pub players: Vec<PlayerId>,
    pub anonymous: bool,
    /// The player whose seat is being held, if any.
    pub away: Option<PlayerId>,
}

/// Handle to a running room actor. Used to send commands to it.
///
/// Cheap to clone; it's just an `mpsc::Sender` wrapper. The
/// `RoomManager` holds one of these per room.
#[derive(Clone)]
pub struct RoomHandle {
    room_code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Returns the room's code.
    pub fn room_code(&self) -> &RoomCode {
        &self.room_code
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub(crate) async fn join(
        &self,
        player: PlayerId,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Join {
            player,
            sender,
            reply,
        })
        .await?
    }

    pub(crate) async fn leave(&self, player: PlayerId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Leave { player, reply })
            .await?
    }

    pub(crate) async fn submit_move(&self, player: PlayerId, choice: Move) -> Result<(), RoomError> {
        self.tell(RoomCommand::Move { player, choice }).await
    }

    pub(crate) async fn request_rematch(&self, player: PlayerId) -> Result<(), RoomError> {
        self.tell(RoomCommand::Rematch { player }).await
    }

    pub(crate) async fn chat(&self, player: PlayerId, message: String) -> Result<(), RoomError> {
        self.tell(RoomCommand::Chat { player, message }).await
    }

    pub(crate) async fn disconnect(&self, player: PlayerId) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Disconnect { player, reply })
            .await
    }

    pub(crate) async fn rejoin(
        &self,
        player: PlayerId,
        mode: GameMode,
        sender: PlayerSender,
    ) -> Result<MatchSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Rejoin {
            player,
            mode,
            sender,
            reply,
        })
        .await?
    }

    /// Requests the current room info.
    pub async fn get_info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::GetInfo { reply }).await
    }

    /// Sends a command and waits for the actor's reply.
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_code.clone()))
    }

    /// Sends a command without waiting for it to be handled.
    async fn tell(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_code.clone()))
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    state: MatchState,
    config: MatchConfig,
    /// Outbound channels of the players currently connected. An away
    /// player keeps their seat in `state` but has no entry here.
    senders: HashMap<PlayerId, PlayerSender>,
    away: Option<PlayerId>,
    clock: MatchClock,
    receiver: mpsc::Receiver<RoomCommand>,
    /// Where the actor announces that it stopped.
    closed: mpsc::UnboundedSender<RoomCode>,
}

impl RoomActor {
    /// Runs the actor loop until the room closes.
    async fn run(mut self) {
        let room_code = self.state.room_code().clone();
        tracing::info!(%room_code, anonymous = self.state.anonymous(), "room opened");

        loop {
            let flow = tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => ControlFlow::Break(()),
                },
                kind = self.clock.wait() => self.handle_timer(kind),
            };
            if flow.is_break() {
                break;
            }
        }

        self.clock.clear();
        // Closing the inbox first makes `RoomHandle::is_closed` true by
        // the time the manager hears about it.
        self.receiver.close();
        let _ = self.closed.send(room_code.clone());
        tracing::info!(%room_code, "room closed");
    }

    fn handle_command(&mut self, cmd: RoomCommand) -> ControlFlow<()> {
        match cmd {
            RoomCommand::Join {
                player,
                sender,
                reply,
            } => {
                let result = self.handle_join(player, sender);
                let _ = reply.send(result);
            }
            RoomCommand::Move { player, choice } => self.handle_move(player, choice),
            RoomCommand::Rematch { player } => self.handle_rematch(player),
            RoomCommand::Chat { player, message } => self.handle_chat(player, message),
            RoomCommand::Leave { player, reply } => {
                if !self.state.contains(player) {
                    let _ = reply.send(Err(RoomError::NotInRoom(player, self.code())));
                    return ControlFlow::Continue(());
                }
                self.handle_leave(player);
                let _ = reply.send(Ok(()));
                return ControlFlow::Break(());
            }
            RoomCommand::Disconnect { player, reply } => {
                if !self.state.contains(player) {
                    let _ = reply.send(false);
                    return ControlFlow::Continue(());
                }
                let held = self.handle_disconnect(player);
                let _ = reply.send(held);
                if !held {
                    return ControlFlow::Break(());
                }
            }
            RoomCommand::Rejoin {
                player,
                mode,
                sender,
                reply,
            } => {
                let result = self.handle_rejoin(player, mode, sender);
                let _ = reply.send(result);
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_timer(&mut self, kind: TimerKind) -> ControlFlow<()> {
        match kind {
            TimerKind::Round => {
                tracing::debug!(room_code = %self.code(), round = self.state.round(), "round deadline reached");
                self.finish_round();
            }
            TimerKind::Intermission => self.begin_round(),
            TimerKind::Rematch => {
                tracing::info!(room_code = %self.code(), "rematch window closed without consensus");
                self.dispatch(vec![(Recipient::All, ServerEvent::MatchTimeout)]);
                return ControlFlow::Break(());
            }
            TimerKind::Reconnect => {
                let during = self.state.phase();
                if let Some(player) = self.away.take() {
                    tracing::info!(room_code = %self.code(), %player, "reconnect grace expired");
                    self.dispatch(vec![(
                        Recipient::AllExcept(player),
                        ServerEvent::PlayerDisconnected { during },
                    )]);
                }
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_join(&mut self, player: PlayerId, sender: PlayerSender) -> Result<(), RoomError> {
        self.state.add_player(player)?;
        self.senders.insert(player, sender);
        tracing::info!(
            room_code = %self.code(),
            %player,
            players = self.state.players().len(),
            "player joined"
        );

        if self.state.is_full() {
            tracing::info!(room_code = %self.code(), "match started");
            self.dispatch(vec![(Recipient::All, ServerEvent::GameStart(self.code()))]);
            self.begin_round();
        }
        Ok(())
    }

    fn handle_move(&mut self, player: PlayerId, choice: Move) {
        if self.away.is_some() {
            tracing::debug!(room_code = %self.code(), %player, "move ignored while a player is away");
            return;
        }
        match self.state.submit_move(player, choice) {
            MoveOutcome::Ignored => {
                tracing::debug!(
                    room_code = %self.code(),
                    %player,
                    phase = %self.state.phase(),
                    "move ignored"
                );
            }
            MoveOutcome::Recorded => {}
            MoveOutcome::RoundComplete => {
                self.clock.cancel();
                self.finish_round();
            }
        }
    }

    fn handle_rematch(&mut self, player: PlayerId) {
        if self.away.is_some() {
            tracing::debug!(room_code = %self.code(), %player, "vote ignored while a player is away");
            return;
        }
        let (outcome, events) = self.state.vote_rematch(player);
        self.dispatch(events);

        match outcome {
            VoteOutcome::Ignored => {
                tracing::debug!(room_code = %self.code(), %player, "rematch vote ignored");
            }
            VoteOutcome::Counted => {}
            VoteOutcome::Agreed => {
                self.clock.cancel();
                tracing::info!(room_code = %self.code(), "rematch agreed");
                let events = self.state.reset_for_rematch();
                self.dispatch(events);
                self.begin_round();
            }
        }
    }

    fn handle_chat(&mut self, player: PlayerId, message: String) {
        if !self.state.contains(player) {
            tracing::warn!(room_code = %self.code(), %player, "chat from non-member, ignoring");
            return;
        }
        let message: String = message.chars().take(MAX_CHAT_CHARS).collect();
        self.dispatch(vec![(
            Recipient::All,
            ServerEvent::Chat {
                message,
                sender_id: player,
            },
        )]);
    }

    fn handle_leave(&mut self, player: PlayerId) {
        let during = self.state.phase();
        self.state.remove_player(player);
        self.senders.remove(&player);
        tracing::info!(room_code = %self.code(), %player, %during, "player left");
        self.dispatch(vec![(
            Recipient::All,
            ServerEvent::PlayerDisconnected { during },
        )]);
    }

    /// Returns whether the seat is held for a reconnect.
    fn handle_disconnect(&mut self, player: PlayerId) -> bool {
        self.senders.remove(&player);

        // Already away: a resumed connection that dropped again before
        // rejoining. The grace timer keeps running from the first drop.
        if self.away == Some(player) {
            tracing::debug!(room_code = %self.code(), %player, "away player dropped again");
            return true;
        }

        if !self.state.is_full() || self.away.is_some() {
            tracing::info!(room_code = %self.code(), %player, "player dropped, nobody left to wait");
            return false;
        }

        self.away = Some(player);
        self.clock.suspend();
        self.clock.arm(TimerKind::Reconnect, self.config.reconnect_grace);

        let grace_secs = self.config.reconnect_grace.as_secs();
        tracing::info!(room_code = %self.code(), %player, grace_secs, "player dropped, holding seat");
        self.dispatch(vec![(
            Recipient::AllExcept(player),
            ServerEvent::OpponentTemporaryDisconnect { grace_secs },
        )]);
        true
    }

    fn handle_rejoin(
        &mut self,
        player: PlayerId,
        mode: GameMode,
        sender: PlayerSender,
    ) -> Result<MatchSnapshot, RoomError> {
        if self.away != Some(player) {
            return Err(RoomError::NotInRoom(player, self.code()));
        }
        if GameMode::of(self.state.anonymous()) != mode {
            return Err(RoomError::WrongMode(self.code()));
        }

        self.away = None;
        self.clock.cancel();
        self.clock.resume();

        let time_left_ms = self.clock.remaining().map(|d| d.as_millis() as u64);
        let snapshot = self.state.snapshot(time_left_ms);

        self.senders.insert(player, sender);
        tracing::info!(room_code = %self.code(), %player, "player rejoined");
        self.dispatch(vec![
            (
                Recipient::Player(player),
                ServerEvent::RejoinSuccess(snapshot.clone()),
            ),
            (Recipient::AllExcept(player), ServerEvent::OpponentReconnected),
        ]);
        Ok(snapshot)
    }

    /// Starts the current round and arms its deadline.
    fn begin_round(&mut self) {
        let events = self.state.start_round();
        self.dispatch(events);
        self.clock.arm(TimerKind::Round, self.config.round_time);
    }

    /// Scores the round and arms whatever comes next.
    fn finish_round(&mut self) {
        let events = self.state.resolve_round();
        if events.is_empty() {
            return;
        }
        self.dispatch(events);

        if self.state.phase() == Phase::MatchEnd {
            tracing::info!(room_code = %self.code(), "match finished");
            self.clock.arm(TimerKind::Rematch, self.config.rematch_window);
        } else {
            self.clock.arm(TimerKind::Intermission, self.config.round_pause);
        }
    }

    /// Dispatches outbound events to the correct recipients.
    fn dispatch(&self, events: Outbound) {
        for (recipient, event) in events {
            match recipient {
                Recipient::All => {
                    for player in self.state.players() {
                        self.send_to(player.id, event.clone());
                    }
                }
                Recipient::Player(player) => self.send_to(player, event),
                Recipient::AllExcept(excluded) => {
                    for player in self.state.players() {
                        if player.id != excluded {
                            self.send_to(player.id, event.clone());
                        }
                    }
                }
            }
        }
    }

    /// Sends an event to a single player. Silently drops it if the player
    /// is away or their receiver is gone.
    fn send_to(&self, player: PlayerId, event: ServerEvent) {
        if let Some(sender) = self.senders.get(&player) {
            let _ = sender.send(event);
        }
    }

    fn code(&self) -> RoomCode {
        self.state.room_code().clone()
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_code: self.code(),
            phase: self.state.phase(),
            players: self.state.players().iter().map(|p| p.id).collect(),
            anonymous: self.state.anonymous(),
            away: self.away,
        }
    }
}

/// Spawns a new room actor task and returns a handle to communicate with it.
///
/// `config.channel_size` controls backpressure: if the inbox fills up,
/// senders wait (bounded channel).
pub(crate) fn spawn_room(
    room_code: RoomCode,
    anonymous: bool,
    config: MatchConfig,
    closed: mpsc::UnboundedSender<RoomCode>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.channel_size);

    let actor = RoomActor {
        state: MatchState::new(room_code.clone(), anonymous, config.win_score),
        config,
        senders: HashMap::new(),
        away: None,
        clock: MatchClock::new(),
        receiver: rx,
        closed,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_code,
        sender: tx,
    }
}
