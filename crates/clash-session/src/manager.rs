//! The session manager: issues player identities and resume tokens.
//!
//! Every connection opens with `hello`. A `hello` without a usable token
//! gets a brand-new identity; a `hello` carrying the token of a recently
//! dropped session gets the old identity back, which is what lets a
//! player rejoin their room after a network blip.
//!
//! # Concurrency note
//!
//! `SessionManager` is a plain struct over `HashMap`s. The server owns one
//! behind a mutex; nothing here locks on its own.

use std::collections::HashMap;
use std::time::Duration;

use clash_protocol::PlayerId;
use rand::Rng;
use tokio::time::Instant;

use crate::{Session, SessionConfig, SessionError, SessionState};

/// Tracks every player identity the server has handed out.
///
/// ```text
/// open() ──→ [Connected] ──disconnect()──→ [Disconnected] ──resume()──→ [Connected]
///                                               │
///                                               ▼ expire_stale()
///                                           [Expired] ──cleanup_expired()──→ gone
/// ```
pub struct SessionManager {
    /// All sessions, keyed by player ID.
    sessions: HashMap<PlayerId, Session>,

    /// Resume token → player ID, kept in sync with `sessions`.
    tokens: HashMap<String, PlayerId>,

    config: SessionConfig,

    /// Next identifier to hand out. Identifiers are never reused while
    /// the process lives.
    next_id: u64,
}

impl SessionManager {
    /// Creates a new, empty session manager with the given config.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            tokens: HashMap::new(),
            config,
            next_id: 1,
        }
    }

    /// Handles a `hello`: resumes the session behind `token` if possible,
    /// otherwise opens a fresh one.
    ///
    /// Returns the (connected) session and whether it was resumed. A stale,
    /// unknown, or in-use token is not an error for the client; it just
    /// starts over with a new identity.
    pub fn connect(&mut self, token: Option<&str>) -> (Session, bool) {
        if let Some(token) = token {
            match self.resume(token) {
                Ok(session) => return (session.clone(), true),
                Err(e) => {
                    tracing::debug!(error = %e, "resume refused, opening new session");
                }
            }
        }
        (self.open().clone(), false)
    }

    /// Opens a session with a new player ID and resume token.
    pub fn open(&mut self) -> &Session {
        let player_id = PlayerId(self.next_id);
        self.next_id += 1;

        let token = generate_token();
        let session = Session {
            player_id,
            state: SessionState::Connected,
            resume_token: token.clone(),
        };

        self.tokens.insert(token, player_id);
        tracing::info!(%player_id, "session opened");
        self.sessions.entry(player_id).or_insert(session)
    }

    /// Marks a player's connection as dropped. Starts the resume window.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if no session exists.
    pub fn disconnect(&mut self, player_id: PlayerId) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(SessionError::NotFound(player_id))?;

        session.state = SessionState::Disconnected {
            since: Instant::now(),
        };

        tracing::info!(%player_id, "connection dropped, resume window started");
        Ok(())
    }

    /// Claims a dropped session back with its resume token.
    ///
    /// # Errors
    /// - [`SessionError::InvalidToken`]: token not recognized
    /// - [`SessionError::SessionExpired`]: resume window elapsed
    /// - [`SessionError::AlreadyConnected`]: the old connection is still open
    pub fn resume(&mut self, token: &str) -> Result<&Session, SessionError> {
        let player_id = self
            .tokens
            .get(token)
            .copied()
            .ok_or(SessionError::InvalidToken)?;

        let grace = self.grace();
        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(SessionError::InvalidToken)?;

        match &session.state {
            SessionState::Disconnected { since } => {
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    return Err(SessionError::SessionExpired(player_id));
                }
                session.state = SessionState::Connected;
                tracing::info!(%player_id, "session resumed");
                Ok(session)
            }
            SessionState::Connected => Err(SessionError::AlreadyConnected(player_id)),
            SessionState::Expired => Err(SessionError::SessionExpired(player_id)),
        }
    }

    /// Expires every dropped session whose resume window has elapsed.
    ///
    /// Returns the expired player IDs. The sessions stay in the map until
    /// [`cleanup_expired`](Self::cleanup_expired).
    pub fn expire_stale(&mut self) -> Vec<PlayerId> {
        let grace = self.grace();
        let mut expired = Vec::new();

        for session in self.sessions.values_mut() {
            if let SessionState::Disconnected { since } = &session.state {
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    expired.push(session.player_id);
                    tracing::debug!(player_id = %session.player_id, "session expired");
                }
            }
        }

        expired
    }

    /// Removes expired sessions and their tokens.
    pub fn cleanup_expired(&mut self) {
        self.sessions.retain(|_, session| {
            if matches!(session.state, SessionState::Expired) {
                self.tokens.remove(&session.resume_token);
                false
            } else {
                true
            }
        });
    }

    /// Looks up a session by player ID.
    pub fn get(&self, player_id: &PlayerId) -> Option<&Session> {
        self.sessions.get(player_id)
    }

    /// Returns the number of sessions (any state).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn grace(&self) -> Duration {
        Duration::from_secs(self.config.resume_grace_secs)
    }
}

/// Generates a random 32-character hex token (128 bits of entropy).
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionManager`, named
    //! `test_{function}_{scenario}_{expected}`.
    //!
    //! Grace-dependent cases use a 0-second window (expires on the first
    //! tick of elapsed time) or paused Tokio time.

    use super::*;

    fn manager_with_instant_expiry() -> SessionManager {
        SessionManager::new(SessionConfig {
            resume_grace_secs: 0,
        })
    }

    fn manager_with_long_grace() -> SessionManager {
        SessionManager::new(SessionConfig {
            resume_grace_secs: 3600,
        })
    }

    // =====================================================================
    // open() / connect()
    // =====================================================================

    #[test]
    fn test_open_issues_distinct_ids_and_tokens() {
        let mut mgr = manager_with_long_grace();
        let s1 = mgr.open().clone();
        let s2 = mgr.open().clone();

        assert_ne!(s1.player_id, s2.player_id);
        assert_ne!(s1.resume_token, s2.resume_token);
        assert_eq!(s1.resume_token.len(), 32);
        assert!(matches!(s1.state, SessionState::Connected));
    }

    #[test]
    fn test_connect_without_token_opens_new_session() {
        let mut mgr = manager_with_long_grace();
        let (session, resumed) = mgr.connect(None);
        assert!(!resumed);
        assert_eq!(mgr.get(&session.player_id).unwrap().resume_token, session.resume_token);
    }

    #[test]
    fn test_connect_with_dropped_token_restores_identity() {
        let mut mgr = manager_with_long_grace();
        let (first, _) = mgr.connect(None);
        mgr.disconnect(first.player_id).unwrap();

        let (again, resumed) = mgr.connect(Some(&first.resume_token));

        assert!(resumed);
        assert_eq!(again.player_id, first.player_id);
        assert!(matches!(again.state, SessionState::Connected));
    }

    #[test]
    fn test_connect_with_unknown_token_starts_over() {
        let mut mgr = manager_with_long_grace();
        let (first, _) = mgr.connect(None);

        let (other, resumed) = mgr.connect(Some("not-a-real-token"));

        assert!(!resumed);
        assert_ne!(other.player_id, first.player_id);
    }

    #[test]
    fn test_connect_with_token_of_open_connection_starts_over() {
        // The first connection hasn't been seen dropping yet; the
        // identity can't be in two places at once.
        let mut mgr = manager_with_long_grace();
        let (first, _) = mgr.connect(None);

        let (other, resumed) = mgr.connect(Some(&first.resume_token));

        assert!(!resumed);
        assert_ne!(other.player_id, first.player_id);
    }

    // =====================================================================
    // disconnect() / resume()
    // =====================================================================

    #[test]
    fn test_disconnect_unknown_player_returns_not_found() {
        let mut mgr = manager_with_long_grace();
        let result = mgr.disconnect(PlayerId(99));
        assert!(matches!(result, Err(SessionError::NotFound(p)) if p == PlayerId(99)));
    }

    #[test]
    fn test_disconnect_preserves_resume_token() {
        let mut mgr = manager_with_long_grace();
        let session = mgr.open().clone();
        mgr.disconnect(session.player_id).unwrap();

        let stored = mgr.get(&session.player_id).unwrap();
        assert_eq!(stored.resume_token, session.resume_token);
        assert!(matches!(stored.state, SessionState::Disconnected { .. }));
    }

    #[test]
    fn test_resume_invalid_token_returns_error() {
        let mut mgr = manager_with_long_grace();
        assert!(matches!(mgr.resume("nope"), Err(SessionError::InvalidToken)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_after_grace_period_returns_expired() {
        let mut mgr = SessionManager::new(SessionConfig {
            resume_grace_secs: 30,
        });
        let session = mgr.open().clone();
        mgr.disconnect(session.player_id).unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;

        let result = mgr.resume(&session.resume_token);
        assert!(
            matches!(result, Err(SessionError::SessionExpired(p)) if p == session.player_id)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_just_inside_grace_succeeds() {
        let mut mgr = SessionManager::new(SessionConfig {
            resume_grace_secs: 30,
        });
        let session = mgr.open().clone();
        mgr.disconnect(session.player_id).unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;

        let resumed = mgr.resume(&session.resume_token).unwrap();
        assert_eq!(resumed.player_id, session.player_id);
    }

    #[test]
    fn test_resume_already_connected_returns_error() {
        let mut mgr = manager_with_long_grace();
        let session = mgr.open().clone();
        let result = mgr.resume(&session.resume_token);
        assert!(matches!(result, Err(SessionError::AlreadyConnected(_))));
    }

    // =====================================================================
    // expire_stale() / cleanup_expired()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_expire_stale_only_touches_dropped_sessions() {
        let mut mgr = manager_with_instant_expiry();
        let dropped = mgr.open().player_id;
        let online = mgr.open().player_id;
        mgr.disconnect(dropped).unwrap();
        tokio::time::advance(Duration::from_millis(1)).await;

        assert_eq!(mgr.expire_stale(), vec![dropped]);
        assert!(matches!(mgr.get(&online).unwrap().state, SessionState::Connected));
    }

    #[test]
    fn test_expire_stale_skips_sessions_within_grace() {
        let mut mgr = manager_with_long_grace();
        let player = mgr.open().player_id;
        mgr.disconnect(player).unwrap();
        assert!(mgr.expire_stale().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired_removes_session_and_token() {
        let mut mgr = manager_with_instant_expiry();
        let session = mgr.open().clone();
        mgr.open();
        mgr.disconnect(session.player_id).unwrap();
        tokio::time::advance(Duration::from_millis(1)).await;
        mgr.expire_stale();

        mgr.cleanup_expired();

        assert_eq!(mgr.len(), 1);
        assert!(mgr.get(&session.player_id).is_none());
        assert!(matches!(
            mgr.resume(&session.resume_token),
            Err(SessionError::InvalidToken)
        ));
    }

    #[test]
    fn test_len_tracks_session_count() {
        let mut mgr = manager_with_long_grace();
        assert!(mgr.is_empty());
        mgr.open();
        mgr.open();
        assert_eq!(mgr.len(), 2);
    }
}
