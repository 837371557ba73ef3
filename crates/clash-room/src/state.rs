//! The match state machine, without timers or channels.
//!
//! `MatchState` is plain data plus transitions. The room actor owns one,
//! feeds it commands and timer expiries, and delivers whatever events it
//! returns. Keeping it synchronous means every rule can be unit-tested
//! without a runtime.
//!
//! ```text
//! Waiting ─(2nd player)─→ Playing ─(both moves / deadline)─→ RoundEnd ─(pause)─→ Playing
//!                            ↑                                   │
//!                            │                                   └─(score == win)─→ MatchEnd
//!                            └──────────────(rematch agreed)─────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap};

use clash_protocol::{
    MatchSnapshot, Move, Phase, PlayerId, Recipient, RoomCode, ScoreEntry, ServerEvent, Shown,
    Verdict,
};

use crate::RoomError;
use crate::rules::determine_winner;

/// Events produced by a transition, with who should receive them.
pub type Outbound = Vec<(Recipient, ServerEvent)>;

/// A seat in the match. Seat order is join order and never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub score: u32,
}

/// What happened to a submitted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Not accepted: wrong phase or not a member.
    Ignored,
    /// Stored; still waiting for the other player.
    Recorded,
    /// Stored, and both moves are in. The round should resolve now.
    RoundComplete,
}

/// What happened to a rematch vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Wrong phase, not a member, or a repeated vote.
    Ignored,
    /// A new vote; the other player hasn't voted yet.
    Counted,
    /// A new vote that completes consensus.
    Agreed,
}

/// One room's match: seats, scores, the current round, and its moves.
#[derive(Debug, Clone)]
pub struct MatchState {
    room_code: RoomCode,
    anonymous: bool,
    win_score: u32,
    players: Vec<Player>,
    moves: HashMap<PlayerId, Move>,
    round: u32,
    phase: Phase,
    rematch_votes: Vec<PlayerId>,
}

impl MatchState {
    /// A fresh match with its creator in seat one, waiting for an opponent.
    pub fn new(room_code: RoomCode, anonymous: bool, win_score: u32) -> Self {
        Self {
            room_code,
            anonymous,
            win_score,
            players: Vec::with_capacity(2),
            moves: HashMap::new(),
            round: 1,
            phase: Phase::Waiting,
            rematch_votes: Vec::new(),
        }
    }

    pub fn room_code(&self) -> &RoomCode {
        &self.room_code
    }

    pub fn anonymous(&self) -> bool {
        self.anonymous
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == player)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= 2
    }

    pub fn scores(&self) -> Vec<ScoreEntry> {
        self.players
            .iter()
            .map(|p| ScoreEntry {
                id: p.id,
                score: p.score,
            })
            .collect()
    }

    /// Seats a player. The match does not start by itself; the actor
    /// calls [`start_round`](Self::start_round) once the room is full.
    pub fn add_player(&mut self, player: PlayerId) -> Result<(), RoomError> {
        if self.contains(player) {
            return Err(RoomError::AlreadyInRoom(player, self.room_code.clone()));
        }
        if self.is_full() {
            return Err(RoomError::RoomFull(self.room_code.clone()));
        }
        self.players.push(Player {
            id: player,
            score: 0,
        });
        Ok(())
    }

    /// Unseats a player. Returns whether they were seated.
    pub fn remove_player(&mut self, player: PlayerId) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.id != player);
        self.moves.remove(&player);
        self.rematch_votes.retain(|p| *p != player);
        self.players.len() != before
    }

    /// Opens the current round: clears moves and announces it.
    pub fn start_round(&mut self) -> Outbound {
        self.moves.clear();
        self.phase = Phase::Playing;
        vec![(
            Recipient::All,
            ServerEvent::RoundStart {
                round: self.round,
                scores: self.scores(),
            },
        )]
    }

    /// Records a move. A player may change their mind until the round
    /// resolves; the last submission counts.
    pub fn submit_move(&mut self, player: PlayerId, choice: Move) -> MoveOutcome {
        if self.phase != Phase::Playing || !self.contains(player) {
            return MoveOutcome::Ignored;
        }
        self.moves.insert(player, choice);
        if self.moves.len() == self.players.len() && self.is_full() {
            MoveOutcome::RoundComplete
        } else {
            MoveOutcome::Recorded
        }
    }

    /// Scores the current round. Missing moves count as `none`.
    ///
    /// Leaves the match in `RoundEnd` (with the round counter advanced) or
    /// in `MatchEnd` when someone reached the winning score. Does nothing
    /// outside `Playing`.
    pub fn resolve_round(&mut self) -> Outbound {
        if self.phase != Phase::Playing || !self.is_full() {
            return Vec::new();
        }

        let first = self.players[0].id;
        let second = self.players[1].id;
        let m1 = self.moves.get(&first).copied();
        let m2 = self.moves.get(&second).copied();

        let verdict = determine_winner(m1, m2);
        let winner_seat = match verdict {
            Verdict::Player1 => Some(0),
            Verdict::Player2 => Some(1),
            Verdict::Tie => None,
        };

        let mut match_winner = None;
        if let Some(seat) = winner_seat {
            let player = &mut self.players[seat];
            player.score += 1;
            if player.score >= self.win_score {
                match_winner = Some(player.id);
            }
        }

        let shown: BTreeMap<PlayerId, Shown> =
            BTreeMap::from([(first, Shown::from(m1)), (second, Shown::from(m2))]);

        if match_winner.is_some() {
            self.phase = Phase::MatchEnd;
            self.rematch_votes.clear();
        } else {
            self.phase = Phase::RoundEnd;
            self.round += 1;
        }

        vec![(
            Recipient::All,
            ServerEvent::RoundResult {
                moves: shown,
                result: verdict,
                scores: self.scores(),
                match_winner,
            },
        )]
    }

    /// Counts a rematch vote. Each new vote is announced to the room.
    pub fn vote_rematch(&mut self, player: PlayerId) -> (VoteOutcome, Outbound) {
        if self.phase != Phase::MatchEnd
            || !self.contains(player)
            || self.rematch_votes.contains(&player)
        {
            return (VoteOutcome::Ignored, Vec::new());
        }

        self.rematch_votes.push(player);
        let announce = vec![(
            Recipient::All,
            ServerEvent::RematchRequested {
                requester_id: player,
                votes: self.rematch_votes.clone(),
            },
        )];

        let outcome = if self.rematch_votes.len() >= self.players.len() {
            VoteOutcome::Agreed
        } else {
            VoteOutcome::Counted
        };
        (outcome, announce)
    }

    /// Resets scores, round, votes, and moves for a rematch on the same
    /// seats. The caller starts the first round.
    pub fn reset_for_rematch(&mut self) -> Outbound {
        for player in &mut self.players {
            player.score = 0;
        }
        self.round = 1;
        self.moves.clear();
        self.rematch_votes.clear();
        vec![(Recipient::All, ServerEvent::RematchStarting)]
    }

    /// Everything a rejoining client needs to redraw the match.
    pub fn snapshot(&self, time_left_ms: Option<u64>) -> MatchSnapshot {
        MatchSnapshot {
            room_code: self.room_code.clone(),
            state: self.phase,
            round: self.round,
            scores: self.scores(),
            moves: self.moves.iter().map(|(p, m)| (*p, *m)).collect(),
            rematch_votes: self.rematch_votes.clone(),
            anonymous: self.anonymous,
            time_left_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PlayerId = PlayerId(1);
    const B: PlayerId = PlayerId(2);

    fn playing() -> MatchState {
        let mut state = MatchState::new(RoomCode::from("ABC123"), false, 2);
        state.add_player(A).unwrap();
        state.add_player(B).unwrap();
        state.start_round();
        state
    }

    fn result_of(events: &Outbound) -> (Verdict, Vec<ScoreEntry>, Option<PlayerId>) {
        match &events[0].1 {
            ServerEvent::RoundResult {
                result,
                scores,
                match_winner,
                ..
            } => (*result, scores.clone(), *match_winner),
            other => panic!("expected RoundResult, got {other:?}"),
        }
    }

    fn play(state: &mut MatchState, a: Move, b: Move) -> Outbound {
        state.submit_move(A, a);
        assert_eq!(state.submit_move(B, b), MoveOutcome::RoundComplete);
        state.resolve_round()
    }

    // =====================================================================
    // Seating
    // =====================================================================

    #[test]
    fn test_add_player_rejects_third_player() {
        let mut state = playing();
        assert!(matches!(
            state.add_player(PlayerId(3)),
            Err(RoomError::RoomFull(_))
        ));
        assert_eq!(state.players().len(), 2);
    }

    #[test]
    fn test_add_player_twice_is_rejected() {
        let mut state = MatchState::new(RoomCode::from("ABC123"), false, 2);
        state.add_player(A).unwrap();
        assert!(matches!(
            state.add_player(A),
            Err(RoomError::AlreadyInRoom(..))
        ));
    }

    #[test]
    fn test_start_round_announces_round_and_zero_scores() {
        let mut state = MatchState::new(RoomCode::from("ABC123"), false, 2);
        state.add_player(A).unwrap();
        state.add_player(B).unwrap();

        let events = state.start_round();

        assert_eq!(state.phase(), Phase::Playing);
        assert_eq!(
            events,
            vec![(
                Recipient::All,
                ServerEvent::RoundStart {
                    round: 1,
                    scores: vec![
                        ScoreEntry { id: A, score: 0 },
                        ScoreEntry { id: B, score: 0 },
                    ],
                }
            )]
        );
    }

    // =====================================================================
    // Moves and rounds
    // =====================================================================

    #[test]
    fn test_submit_move_outside_playing_is_ignored() {
        let mut state = MatchState::new(RoomCode::from("ABC123"), false, 2);
        state.add_player(A).unwrap();
        assert_eq!(state.submit_move(A, Move::Rock), MoveOutcome::Ignored);
    }

    #[test]
    fn test_submit_move_from_stranger_is_ignored() {
        let mut state = playing();
        assert_eq!(state.submit_move(PlayerId(9), Move::Rock), MoveOutcome::Ignored);
        assert!(state.snapshot(None).moves.is_empty());
    }

    #[test]
    fn test_submit_move_last_choice_counts() {
        let mut state = playing();
        assert_eq!(state.submit_move(A, Move::Paper), MoveOutcome::Recorded);
        assert_eq!(state.submit_move(A, Move::Rock), MoveOutcome::Recorded);

        let events = play(&mut state, Move::Rock, Move::Scissors);
        assert_eq!(result_of(&events).0, Verdict::Player1);
    }

    #[test]
    fn test_rock_beats_scissors_scores_player1() {
        let mut state = playing();
        let events = play(&mut state, Move::Rock, Move::Scissors);

        let (verdict, scores, winner) = result_of(&events);
        assert_eq!(verdict, Verdict::Player1);
        assert_eq!(
            scores,
            vec![ScoreEntry { id: A, score: 1 }, ScoreEntry { id: B, score: 0 }]
        );
        assert_eq!(winner, None);
        assert_eq!(state.phase(), Phase::RoundEnd);
        assert_eq!(state.round(), 2);
    }

    #[test]
    fn test_tie_changes_no_score_but_advances_round() {
        let mut state = playing();
        let events = play(&mut state, Move::Paper, Move::Paper);

        let (verdict, scores, _) = result_of(&events);
        assert_eq!(verdict, Verdict::Tie);
        assert!(scores.iter().all(|s| s.score == 0));
        assert_eq!(state.round(), 2);
    }

    #[test]
    fn test_resolve_round_backfills_missing_moves_as_none() {
        let mut state = playing();
        state.submit_move(B, Move::Scissors);

        let events = state.resolve_round();

        match &events[0].1 {
            ServerEvent::RoundResult { moves, result, .. } => {
                assert_eq!(moves[&A], Shown::None);
                assert_eq!(moves[&B], Shown::Scissors);
                assert_eq!(*result, Verdict::Player2);
            }
            other => panic!("expected RoundResult, got {other:?}"),
        }
    }

    #[test]
    fn test_second_win_ends_match_with_winner() {
        let mut state = playing();
        play(&mut state, Move::Rock, Move::Scissors);
        state.start_round();
        let events = play(&mut state, Move::Paper, Move::Rock);

        let (_, scores, winner) = result_of(&events);
        assert_eq!(winner, Some(A));
        assert_eq!(scores[0].score, 2);
        assert_eq!(state.phase(), Phase::MatchEnd);
        // The final round does not advance the counter.
        assert_eq!(state.round(), 2);
    }

    #[test]
    fn test_resolve_round_twice_is_noop() {
        let mut state = playing();
        play(&mut state, Move::Rock, Move::Scissors);
        assert!(state.resolve_round().is_empty());
        assert_eq!(state.scores()[0].score, 1);
    }

    #[test]
    fn test_start_round_clears_previous_moves() {
        let mut state = playing();
        play(&mut state, Move::Rock, Move::Scissors);
        assert_eq!(state.snapshot(None).moves.len(), 2);

        state.start_round();
        assert!(state.snapshot(None).moves.is_empty());
    }

    // =====================================================================
    // Rematch
    // =====================================================================

    fn finished() -> MatchState {
        let mut state = playing();
        play(&mut state, Move::Rock, Move::Scissors);
        state.start_round();
        play(&mut state, Move::Rock, Move::Scissors);
        assert_eq!(state.phase(), Phase::MatchEnd);
        state
    }

    #[test]
    fn test_vote_rematch_outside_match_end_is_ignored() {
        let mut state = playing();
        let (outcome, events) = state.vote_rematch(A);
        assert_eq!(outcome, VoteOutcome::Ignored);
        assert!(events.is_empty());
    }

    #[test]
    fn test_vote_rematch_is_idempotent() {
        let mut state = finished();
        let (first, events) = state.vote_rematch(A);
        assert_eq!(first, VoteOutcome::Counted);
        assert_eq!(
            events[0].1,
            ServerEvent::RematchRequested {
                requester_id: A,
                votes: vec![A],
            }
        );

        let (again, events) = state.vote_rematch(A);
        assert_eq!(again, VoteOutcome::Ignored);
        assert!(events.is_empty());
    }

    #[test]
    fn test_both_votes_agree_and_reset_restores_round_one() {
        let mut state = finished();
        state.vote_rematch(B);
        let (outcome, events) = state.vote_rematch(A);
        assert_eq!(outcome, VoteOutcome::Agreed);
        assert_eq!(
            events[0].1,
            ServerEvent::RematchRequested {
                requester_id: A,
                votes: vec![B, A],
            }
        );

        state.reset_for_rematch();
        state.start_round();

        let snapshot = state.snapshot(None);
        assert_eq!(snapshot.round, 1);
        assert!(snapshot.scores.iter().all(|s| s.score == 0));
        assert!(snapshot.rematch_votes.is_empty());
        assert_eq!(snapshot.state, Phase::Playing);
    }

    // =====================================================================
    // Snapshot
    // =====================================================================

    #[test]
    fn test_snapshot_reports_partial_moves() {
        let mut state = MatchState::new(RoomCode::from("RND-XY12AB"), true, 2);
        state.add_player(A).unwrap();
        state.add_player(B).unwrap();
        state.start_round();
        state.submit_move(A, Move::Paper);

        let snapshot = state.snapshot(Some(4_000));

        assert_eq!(snapshot.room_code.as_str(), "RND-XY12AB");
        assert!(snapshot.anonymous);
        assert_eq!(snapshot.moves, BTreeMap::from([(A, Move::Paper)]));
        assert_eq!(snapshot.time_left_ms, Some(4_000));
    }

    #[test]
    fn test_remove_player_drops_their_move() {
        let mut state = playing();
        state.submit_move(A, Move::Rock);
        assert!(state.remove_player(A));
        assert!(!state.remove_player(A));
        assert!(state.snapshot(None).moves.is_empty());
    }
}
