//! Who is away from which room, and until when.
//!
//! When a player drops out of a full room, the room keeps their seat for a
//! grace period. The tracker remembers that absence so a later
//! `attemptRejoin` can be checked without asking the room.

use std::collections::HashMap;
use std::time::Duration;

use clash_protocol::{PlayerId, RoomCode};
use tokio::time::Instant;

use crate::SessionError;

/// A recorded absence: the room a player dropped out of and the moment
/// their seat is given up.
#[derive(Debug, Clone)]
pub struct Absence {
    pub room: RoomCode,
    pub deadline: Instant,
}

/// Absent players, keyed by ID. At most one absence per player.
#[derive(Debug, Default)]
pub struct DisconnectTracker {
    absences: HashMap<PlayerId, Absence>,
}

impl DisconnectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `player` left `room` and may come back within `grace`.
    /// Replaces any earlier absence.
    pub fn record(&mut self, player: PlayerId, room: RoomCode, grace: Duration) {
        tracing::debug!(%player, %room, grace_secs = grace.as_secs(), "absence recorded");
        self.absences.insert(
            player,
            Absence {
                room,
                deadline: Instant::now() + grace,
            },
        );
    }

    /// Checks that `player` may rejoin `room` right now.
    ///
    /// # Errors
    /// - [`SessionError::NotAway`]: no absence is recorded
    /// - [`SessionError::WrongRoom`]: they dropped out of a different room
    /// - [`SessionError::GraceExpired`]: the deadline has passed
    pub fn check(&self, player: PlayerId, room: &RoomCode) -> Result<(), SessionError> {
        let absence = self
            .absences
            .get(&player)
            .ok_or(SessionError::NotAway(player))?;

        if &absence.room != room {
            return Err(SessionError::WrongRoom {
                player,
                room: room.clone(),
            });
        }
        if Instant::now() >= absence.deadline {
            return Err(SessionError::GraceExpired(player));
        }
        Ok(())
    }

    /// Forgets a player's absence (they came back, or left for good).
    pub fn remove(&mut self, player: PlayerId) -> Option<Absence> {
        self.absences.remove(&player)
    }

    /// Forgets every absence tied to `room`. Returns the affected players.
    pub fn forget_room(&mut self, room: &RoomCode) -> Vec<PlayerId> {
        let players: Vec<PlayerId> = self
            .absences
            .iter()
            .filter(|(_, a)| &a.room == room)
            .map(|(p, _)| *p)
            .collect();
        for player in &players {
            self.absences.remove(player);
        }
        players
    }

    /// Drops absences whose deadline has passed. Returns the players dropped.
    pub fn expire_stale(&mut self) -> Vec<PlayerId> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.absences.retain(|player, absence| {
            if now >= absence.deadline {
                expired.push(*player);
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn is_away(&self, player: PlayerId) -> bool {
        self.absences.contains_key(&player)
    }

    pub fn get(&self, player: PlayerId) -> Option<&Absence> {
        self.absences.get(&player)
    }

    pub fn len(&self) -> usize {
        self.absences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.absences.is_empty()
    }
}
