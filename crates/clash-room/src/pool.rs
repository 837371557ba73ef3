//! Anonymous matchmaking queue.

use clash_protocol::PlayerId;

/// Players waiting for an anonymous opponent, oldest first.
#[derive(Debug, Default)]
pub struct MatchmakingPool {
    waiting: Vec<PlayerId>,
}

impl MatchmakingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player to the back of the queue. Returns `false` if they
    /// were already waiting (their place is kept).
    pub fn enroll(&mut self, player: PlayerId) -> bool {
        if self.waiting.contains(&player) {
            return false;
        }
        self.waiting.push(player);
        true
    }

    /// Finds the longest-waiting player other than `requester` and takes
    /// both out of the queue.
    ///
    /// Returns the partner, or `None` (leaving the queue untouched) when
    /// nobody else is waiting.
    pub fn take_partner(&mut self, requester: PlayerId) -> Option<PlayerId> {
        let index = self.waiting.iter().position(|p| *p != requester)?;
        let partner = self.waiting.remove(index);
        self.waiting.retain(|p| *p != requester);
        Some(partner)
    }

    /// Takes a player out of the queue. Returns whether they were in it.
    pub fn remove(&mut self, player: PlayerId) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|p| *p != player);
        self.waiting.len() != before
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.waiting.contains(&player)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_partner_never_pairs_player_with_itself() {
        let mut pool = MatchmakingPool::new();
        pool.enroll(PlayerId(1));
        assert_eq!(pool.take_partner(PlayerId(1)), None);
        assert!(pool.contains(PlayerId(1)));
    }

    #[test]
    fn test_take_partner_picks_oldest_waiter_and_removes_both() {
        let mut pool = MatchmakingPool::new();
        pool.enroll(PlayerId(1));
        pool.enroll(PlayerId(2));
        pool.enroll(PlayerId(3));

        assert_eq!(pool.take_partner(PlayerId(3)), Some(PlayerId(1)));
        assert!(!pool.contains(PlayerId(1)));
        assert!(!pool.contains(PlayerId(3)));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_enroll_twice_keeps_one_entry() {
        let mut pool = MatchmakingPool::new();
        assert!(pool.enroll(PlayerId(1)));
        assert!(!pool.enroll(PlayerId(1)));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_paired_players_are_not_paired_again() {
        let mut pool = MatchmakingPool::new();
        pool.enroll(PlayerId(1));
        pool.enroll(PlayerId(2));
        assert_eq!(pool.take_partner(PlayerId(2)), Some(PlayerId(1)));

        pool.enroll(PlayerId(3));
        assert_eq!(pool.take_partner(PlayerId(3)), None);
    }

    #[test]
    fn test_remove_reports_membership() {
        let mut pool = MatchmakingPool::new();
        pool.enroll(PlayerId(1));
        assert!(pool.remove(PlayerId(1)));
        assert!(!pool.remove(PlayerId(1)));
        assert!(pool.is_empty());
    }
}
