//! Round scoring.

use clash_protocol::{Move, Verdict};

/// Decides a round from the two players' moves, in seat order.
///
/// `None` is a player who didn't choose before the deadline: it loses to
/// any real move and ties only with another `None`.
pub fn determine_winner(player1: Option<Move>, player2: Option<Move>) -> Verdict {
    match (player1, player2) {
        (None, None) => Verdict::Tie,
        (Some(_), None) => Verdict::Player1,
        (None, Some(_)) => Verdict::Player2,
        (Some(a), Some(b)) if a == b => Verdict::Tie,
        (Some(a), Some(b)) if a.beats(b) => Verdict::Player1,
        (Some(_), Some(_)) => Verdict::Player2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Move::{Paper, Rock, Scissors};

    #[test]
    fn test_determine_winner_dominance_table() {
        assert_eq!(determine_winner(Some(Rock), Some(Scissors)), Verdict::Player1);
        assert_eq!(determine_winner(Some(Scissors), Some(Paper)), Verdict::Player1);
        assert_eq!(determine_winner(Some(Paper), Some(Rock)), Verdict::Player1);

        assert_eq!(determine_winner(Some(Scissors), Some(Rock)), Verdict::Player2);
        assert_eq!(determine_winner(Some(Paper), Some(Scissors)), Verdict::Player2);
        assert_eq!(determine_winner(Some(Rock), Some(Paper)), Verdict::Player2);
    }

    #[test]
    fn test_determine_winner_equal_moves_tie() {
        for m in [Rock, Paper, Scissors] {
            assert_eq!(determine_winner(Some(m), Some(m)), Verdict::Tie);
        }
    }

    #[test]
    fn test_determine_winner_null_move_loses_to_any_move() {
        for m in [Rock, Paper, Scissors] {
            assert_eq!(determine_winner(Some(m), None), Verdict::Player1);
            assert_eq!(determine_winner(None, Some(m)), Verdict::Player2);
        }
    }

    #[test]
    fn test_determine_winner_both_null_tie() {
        assert_eq!(determine_winner(None, None), Verdict::Tie);
    }
}
