//! Per-connection handler: hello, event routing, and cleanup.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `hello` → validate version, resume or open a session
//!   2. Send `welcome` → register the player's outbound channel
//!   3. Loop: decode inbound events and route them; forward room events
//!      from the outbound channel to the socket
//!   4. Release the session and seat before the socket is dropped
//!
//! Replies to the sender go through the same outbound channel as room
//! broadcasts, so a player always sees events in the order they were
//! produced.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clash_protocol::{ClientEvent, Codec, Move, PlayerId, ProtocolError, ServerEvent};
use clash_room::{Matchmaking, PlayerSender, RoomError};
use clash_session::SessionError;
use clash_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout, timeout_at};

use crate::ClashError;
use crate::server::{PROTOCOL_VERSION, ServerState};

/// How long a new connection has to say hello.
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

const ROOM_NOT_FOUND_OR_FULL: &str = "Room not found or full";
const ALREADY_IN_A_ROOM: &str = "Already in a room";
const INVALID_MOVE: &str = "Invalid move";

/// Releases a player's connection when the handler exits.
///
/// The normal exit path awaits [`release`](Self::release) so the session
/// and seat are freed before the task ends, and a client reconnecting with
/// its token right away finds its session already marked as dropped. If
/// the handler panics instead, `Drop` spawns the same cleanup.
struct ConnectionGuard<C: Codec> {
    player_id: PlayerId,
    sender: PlayerSender,
    state: Arc<ServerState<C>>,
    released: bool,
}

impl<C: Codec> ConnectionGuard<C> {
    async fn release(mut self) {
        self.released = true;
        release_connection(&self.state, self.player_id, &self.sender).await;
    }
}

impl<C: Codec> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let player_id = self.player_id;
        let sender = self.sender.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            release_connection(&state, player_id, &sender).await;
        });
    }
}

/// Marks the session dropped and hands the seat to the grace mechanism.
///
/// Holds the room lock throughout, so a resumed connection can't register
/// or rejoin halfway through.
async fn release_connection<C: Codec>(
    state: &ServerState<C>,
    player_id: PlayerId,
    sender: &PlayerSender,
) {
    let mut rooms = state.rooms.lock().await;
    // A newer connection may already speak for this player.
    if !rooms.unregister(player_id, sender) {
        return;
    }
    let _ = state.sessions.lock().await.disconnect(player_id);
    rooms.disconnect(player_id).await;
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), ClashError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: hello ---
    let player_id = match perform_hello(&conn, &state).await {
        Ok(player_id) => player_id,
        Err(e) => {
            let _ = conn.close().await;
            return Err(e);
        }
    };

    // --- Step 2: register ---
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    state
        .rooms
        .lock()
        .await
        .register(player_id, outbound_tx.clone());
    let guard = ConnectionGuard {
        player_id,
        sender: outbound_tx.clone(),
        state: Arc::clone(&state),
        released: false,
    };
    tracing::info!(%conn_id, %player_id, "player connected");

    // --- Step 3: event loop ---
    let result = serve(&conn, &state, player_id, &outbound_tx, outbound_rx).await;

    guard.release().await;
    result
}

/// Runs the event loop until the socket closes, errors, or goes idle.
async fn serve<C: Codec>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<C>>,
    player_id: PlayerId,
    outbound_tx: &PlayerSender,
    mut outbound_rx: mpsc::UnboundedReceiver<ServerEvent>,
) -> Result<(), ClashError> {
    let mut idle_deadline = Instant::now() + state.idle_timeout;

    loop {
        tokio::select! {
            inbound = timeout_at(idle_deadline, conn.recv()) => {
                let data = match inbound {
                    Ok(Ok(Some(data))) => data,
                    Ok(Ok(None)) => {
                        tracing::info!(%player_id, "connection closed cleanly");
                        return Ok(());
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(%player_id, error = %e, "recv error");
                        return Ok(());
                    }
                    Err(_) => {
                        tracing::info!(%player_id, "connection idle, dropping");
                        return Ok(());
                    }
                };
                idle_deadline = Instant::now() + state.idle_timeout;

                match state.codec.decode::<ClientEvent>(&data) {
                    Ok(event) => route_event(state, player_id, event, outbound_tx).await,
                    Err(e) => {
                        tracing::debug!(%player_id, error = %e, "failed to decode event");
                    }
                }
            }
            Some(event) = outbound_rx.recv() => {
                let bytes = state.codec.encode(&event)?;
                conn.send(&bytes).await?;
            }
        }
    }
}

/// Performs the hello exchange and returns the connection's player.
async fn perform_hello<C: Codec>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<C>>,
) -> Result<PlayerId, ClashError> {
    let data = match timeout(HELLO_TIMEOUT, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before hello".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("hello timed out".into()).into());
        }
    };

    let (version, token) = match state.codec.decode::<ClientEvent>(&data) {
        Ok(ClientEvent::Hello { version, token }) => (version, token),
        _ => {
            send_event(conn, &state.codec, &ServerEvent::error("Expected hello")).await?;
            return Err(
                ProtocolError::InvalidMessage("first message must be hello".into()).into(),
            );
        }
    };

    if version != PROTOCOL_VERSION {
        let message = format!("Version mismatch: expected {PROTOCOL_VERSION}, got {version}");
        send_event(conn, &state.codec, &ServerEvent::error(message)).await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let (session, resumed) = state.sessions.lock().await.connect(token.as_deref());
    tracing::debug!(player_id = %session.player_id, resumed, "hello accepted");

    let welcome = ServerEvent::Welcome {
        player_id: session.player_id,
        token: session.resume_token,
    };
    send_event(conn, &state.codec, &welcome).await?;

    Ok(session.player_id)
}

/// Dispatches one decoded client event.
///
/// Rejections go back to the sender as `error` (or `rejoinFailed`);
/// nothing here is fatal to the connection.
async fn route_event<C: Codec>(
    state: &Arc<ServerState<C>>,
    player_id: PlayerId,
    event: ClientEvent,
    reply: &PlayerSender,
) {
    let respond = |event: ServerEvent| {
        let _ = reply.send(event);
    };

    match event {
        ClientEvent::Hello { .. } => {
            tracing::debug!(%player_id, "repeated hello, ignoring");
        }

        ClientEvent::Heartbeat { client_time } => {
            respond(ServerEvent::HeartbeatAck {
                client_time,
                server_time: unix_millis(),
            });
        }

        ClientEvent::CreateGame => {
            let result = state.rooms.lock().await.create_room(player_id).await;
            match result {
                Ok(room_code) => respond(ServerEvent::GameCreated(room_code)),
                Err(e) => respond(ServerEvent::error(matchmaking_error(&e))),
            }
        }

        ClientEvent::JoinGame(room_code) => {
            let result = state
                .rooms
                .lock()
                .await
                .join_room(player_id, &room_code)
                .await;
            if let Err(e) = result {
                tracing::debug!(%player_id, %room_code, error = %e, "join rejected");
                let message = match e {
                    RoomError::AlreadyInRoom(..) => ALREADY_IN_A_ROOM,
                    _ => ROOM_NOT_FOUND_OR_FULL,
                };
                respond(ServerEvent::error(message));
            }
        }

        ClientEvent::JoinRandom => {
            let result = state.rooms.lock().await.join_random(player_id).await;
            match result {
                Ok(Matchmaking::Waiting) => respond(ServerEvent::Waiting),
                Ok(Matchmaking::Paired(_)) => {}
                Err(e) => respond(ServerEvent::error(matchmaking_error(&e))),
            }
        }

        ClientEvent::CancelWaiting => {
            if let Err(e) = state.rooms.lock().await.cancel_waiting(player_id).await {
                tracing::debug!(%player_id, error = %e, "cancel waiting failed");
            }
        }

        ClientEvent::Move { room_code, choice } => {
            let Ok(choice) = choice.parse::<Move>() else {
                respond(ServerEvent::error(INVALID_MOVE));
                return;
            };
            let result = state
                .rooms
                .lock()
                .await
                .submit_move(player_id, &room_code, choice)
                .await;
            if let Err(e) = result {
                tracing::debug!(%player_id, %room_code, error = %e, "move dropped");
            }
        }

        ClientEvent::RequestRematch(room_code) => {
            let result = state
                .rooms
                .lock()
                .await
                .request_rematch(player_id, &room_code)
                .await;
            if let Err(e) = result {
                tracing::debug!(%player_id, %room_code, error = %e, "rematch vote dropped");
            }
        }

        ClientEvent::LeaveRoom(room_code) => {
            let result = state
                .rooms
                .lock()
                .await
                .leave_room(player_id, &room_code)
                .await;
            if let Err(e) = result {
                tracing::debug!(%player_id, %room_code, error = %e, "leave room failed");
            }
        }

        ClientEvent::Chat { room_code, message } => {
            let result = state
                .rooms
                .lock()
                .await
                .chat(player_id, &room_code, message)
                .await;
            if let Err(e) = result {
                tracing::debug!(%player_id, %room_code, error = %e, "chat dropped");
            }
        }

        ClientEvent::AttemptRejoin {
            room_code,
            game_mode,
        } => {
            let result = state
                .rooms
                .lock()
                .await
                .rejoin(player_id, &room_code, game_mode)
                .await;
            // On success the room already sent `rejoinSuccess`.
            if let Err(e) = result {
                tracing::info!(%player_id, %room_code, error = %e, "rejoin failed");
                respond(ServerEvent::RejoinFailed {
                    reason: rejoin_reason(&e).to_string(),
                });
            }
        }
    }
}

fn matchmaking_error(e: &RoomError) -> String {
    match e {
        RoomError::AlreadyInRoom(..) => ALREADY_IN_A_ROOM.to_string(),
        other => other.to_string(),
    }
}

fn rejoin_reason(e: &RoomError) -> &'static str {
    match e {
        RoomError::Session(SessionError::GraceExpired(_)) => "Reconnect window expired",
        RoomError::Session(SessionError::WrongRoom { .. }) => "Not a member of this room",
        RoomError::WrongMode(_) => "Game mode mismatch",
        _ => "Room no longer available",
    }
}

/// Encodes and sends one event directly on the socket.
async fn send_event(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    event: &ServerEvent,
) -> Result<(), ClashError> {
    let bytes = codec.encode(event)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Wall-clock milliseconds since the Unix epoch.
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
