//! Deadline timer for Clash room actors.
//!
//! A match room has at most one pending autonomous transition at a time:
//! the round deadline, the pause between rounds, the rematch window, or
//! the reconnect grace period. [`MatchClock`] is that single slot.
//! Arming a timer replaces whatever was armed before, so "exactly one
//! timer per room" holds by construction.
//!
//! When a player drops mid-match the running timer is [suspended]
//! (its remaining time is kept) while the grace timer runs, and
//! [resumed] with the same remaining time if they come back.
//!
//! [suspended]: MatchClock::suspend
//! [resumed]: MatchClock::resume
//!
//! # Integration
//!
//! The clock sits inside a room actor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         kind = clock.wait() => { /* round timed out, pause over, … */ }
//!     }
//! }
//! ```
//!
//! With nothing armed, [`MatchClock::wait`] pends forever, so the loop
//! only reacts to commands.

use std::fmt;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Timer kinds
// ---------------------------------------------------------------------------

/// What a timer is for. Returned by [`MatchClock::wait`] when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Round deadline: missing moves become null moves.
    Round,
    /// Pause between a scored round and the next one.
    Intermission,
    /// Rematch window after the match ended.
    Rematch,
    /// Grace period for a dropped player to come back.
    Reconnect,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Round => write!(f, "round"),
            Self::Intermission => write!(f, "intermission"),
            Self::Rematch => write!(f, "rematch"),
            Self::Reconnect => write!(f, "reconnect"),
        }
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Armed {
    kind: TimerKind,
    deadline: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Suspended {
    kind: TimerKind,
    remaining: Duration,
}

/// Single-slot deadline timer. One `MatchClock` per room actor.
///
/// Uses Tokio's clock, so tests can drive it with
/// `#[tokio::test(start_paused = true)]`.
#[derive(Debug, Default)]
pub struct MatchClock {
    armed: Option<Armed>,
    suspended: Option<Suspended>,
}

impl MatchClock {
    /// Creates a clock with nothing armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `kind` to fire `after` from now, replacing any armed timer.
    pub fn arm(&mut self, kind: TimerKind, after: Duration) {
        if let Some(previous) = self.armed {
            trace!(previous = %previous.kind, %kind, "replacing armed timer");
        }
        self.armed = Some(Armed {
            kind,
            deadline: Instant::now() + after,
        });
        debug!(%kind, after_ms = after.as_millis() as u64, "timer armed");
    }

    /// Disarms the current timer. Returns what was armed, if anything.
    ///
    /// A suspended timer is left alone.
    pub fn cancel(&mut self) -> Option<TimerKind> {
        let kind = self.armed.take().map(|a| a.kind);
        if let Some(kind) = kind {
            trace!(%kind, "timer cancelled");
        }
        kind
    }

    /// Disarms everything, including a suspended timer.
    pub fn clear(&mut self) {
        self.armed = None;
        self.suspended = None;
    }

    /// Waits until the armed timer fires and returns its kind.
    ///
    /// The timer is disarmed once it fires. With nothing armed this future
    /// pends forever; `select!` still services its other branches.
    ///
    /// Cancel-safe: dropping the future before it completes leaves the
    /// timer armed.
    pub async fn wait(&mut self) -> TimerKind {
        let Some(Armed { kind, deadline }) = self.armed else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(deadline).await;

        self.armed = None;
        debug!(%kind, "timer fired");
        kind
    }

    /// Parks the armed timer, remembering how much time it had left.
    ///
    /// Returns the kind that was suspended. Does nothing (and returns
    /// `None`) when nothing is armed. Suspending again overwrites an
    /// earlier suspended timer.
    pub fn suspend(&mut self) -> Option<TimerKind> {
        let armed = self.armed.take()?;
        let remaining = armed.deadline.saturating_duration_since(Instant::now());
        self.suspended = Some(Suspended {
            kind: armed.kind,
            remaining,
        });
        debug!(
            kind = %armed.kind,
            remaining_ms = remaining.as_millis() as u64,
            "timer suspended"
        );
        Some(armed.kind)
    }

    /// Re-arms a suspended timer with the time it had left.
    ///
    /// Replaces whatever is armed. Returns the resumed kind, or `None` if
    /// nothing was suspended.
    pub fn resume(&mut self) -> Option<TimerKind> {
        let Suspended { kind, remaining } = self.suspended.take()?;
        self.arm(kind, remaining);
        Some(kind)
    }

    /// The kind of the armed timer.
    pub fn armed(&self) -> Option<TimerKind> {
        self.armed.map(|a| a.kind)
    }

    /// The kind of the suspended timer.
    pub fn suspended(&self) -> Option<TimerKind> {
        self.suspended.map(|s| s.kind)
    }

    /// Time left on the armed timer (zero if it is already due).
    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .map(|a| a.deadline.saturating_duration_since(Instant::now()))
    }

    /// Time the suspended timer will get back on [`resume`](Self::resume).
    pub fn suspended_remaining(&self) -> Option<Duration> {
        self.suspended.map(|s| s.remaining)
    }
}
