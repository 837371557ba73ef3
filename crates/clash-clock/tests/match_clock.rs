//! Integration tests for the room deadline timer.
//!
//! Time is paused (`start_paused = true`), so sleeps resolve as soon as
//! every task is idle and the clock auto-advances.

use std::time::Duration;

use clash_clock::{MatchClock, TimerKind};
use tokio::time::{Instant, timeout};

// =========================================================================
// Arming and firing
// =========================================================================

#[test]
fn test_new_clock_has_nothing_armed() {
    let clock = MatchClock::new();
    assert_eq!(clock.armed(), None);
    assert_eq!(clock.suspended(), None);
    assert_eq!(clock.remaining(), None);
}

#[tokio::test(start_paused = true)]
async fn test_wait_fires_after_duration_and_disarms() {
    let mut clock = MatchClock::new();
    let start = Instant::now();
    clock.arm(TimerKind::Round, Duration::from_secs(10));

    let kind = clock.wait().await;

    assert_eq!(kind, TimerKind::Round);
    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert_eq!(clock.armed(), None, "fired timer should be disarmed");
}

#[tokio::test(start_paused = true)]
async fn test_unarmed_clock_pends_forever() {
    let mut clock = MatchClock::new();
    let result = timeout(Duration::from_secs(3600), clock.wait()).await;
    assert!(result.is_err(), "nothing armed, wait should never resolve");
}

#[tokio::test(start_paused = true)]
async fn test_arm_replaces_previous_timer() {
    let mut clock = MatchClock::new();
    clock.arm(TimerKind::Round, Duration::from_secs(10));
    clock.arm(TimerKind::Intermission, Duration::from_secs(3));

    let start = Instant::now();
    assert_eq!(clock.wait().await, TimerKind::Intermission);
    assert_eq!(start.elapsed(), Duration::from_secs(3));

    // The replaced round timer is gone for good.
    let result = timeout(Duration::from_secs(60), clock.wait()).await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_disarms() {
    let mut clock = MatchClock::new();
    clock.arm(TimerKind::Rematch, Duration::from_secs(15));

    assert_eq!(clock.cancel(), Some(TimerKind::Rematch));
    assert_eq!(clock.cancel(), None);

    let result = timeout(Duration::from_secs(60), clock.wait()).await;
    assert!(result.is_err(), "cancelled timer must not fire");
}

#[tokio::test(start_paused = true)]
async fn test_dropped_wait_keeps_timer_armed() {
    let mut clock = MatchClock::new();
    clock.arm(TimerKind::Round, Duration::from_secs(10));

    // Lose a race against a shorter timeout, like a command winning a
    // select! branch.
    let raced = timeout(Duration::from_secs(4), clock.wait()).await;
    assert!(raced.is_err());
    assert_eq!(clock.armed(), Some(TimerKind::Round));
    assert_eq!(clock.remaining(), Some(Duration::from_secs(6)));

    assert_eq!(clock.wait().await, TimerKind::Round);
}

// =========================================================================
// Suspend / resume
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_suspend_keeps_remaining_time() {
    let mut clock = MatchClock::new();
    clock.arm(TimerKind::Round, Duration::from_secs(10));
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(clock.suspend(), Some(TimerKind::Round));
    assert_eq!(clock.armed(), None);
    assert_eq!(clock.suspended(), Some(TimerKind::Round));
    assert_eq!(clock.suspended_remaining(), Some(Duration::from_secs(6)));
}

#[tokio::test(start_paused = true)]
async fn test_suspended_timer_does_not_fire() {
    let mut clock = MatchClock::new();
    clock.arm(TimerKind::Round, Duration::from_secs(10));
    clock.suspend();

    let result = timeout(Duration::from_secs(60), clock.wait()).await;
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_grace_then_resume_restores_remaining_time() {
    let mut clock = MatchClock::new();
    clock.arm(TimerKind::Round, Duration::from_secs(10));
    tokio::time::sleep(Duration::from_secs(7)).await;

    // Player drops: park the round, run the grace timer.
    clock.suspend();
    clock.arm(TimerKind::Reconnect, Duration::from_secs(30));
    tokio::time::sleep(Duration::from_secs(20)).await;

    // They come back: grace cancelled, round resumes with 3s left.
    assert_eq!(clock.cancel(), Some(TimerKind::Reconnect));
    assert_eq!(clock.resume(), Some(TimerKind::Round));
    assert_eq!(clock.suspended(), None);

    let start = Instant::now();
    assert_eq!(clock.wait().await, TimerKind::Round);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_suspend_with_nothing_armed_is_noop() {
    let mut clock = MatchClock::new();
    assert_eq!(clock.suspend(), None);
    assert_eq!(clock.resume(), None);
    assert_eq!(clock.armed(), None);
}

#[tokio::test(start_paused = true)]
async fn test_clear_drops_suspended_timer_too() {
    let mut clock = MatchClock::new();
    clock.arm(TimerKind::Rematch, Duration::from_secs(15));
    clock.suspend();
    clock.arm(TimerKind::Reconnect, Duration::from_secs(30));

    clock.clear();

    assert_eq!(clock.armed(), None);
    assert_eq!(clock.resume(), None);
}

#[test]
fn test_timer_kind_display() {
    assert_eq!(TimerKind::Round.to_string(), "round");
    assert_eq!(TimerKind::Reconnect.to_string(), "reconnect");
}
