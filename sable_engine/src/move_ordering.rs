
use crate::heuristics::*;
use crate::position::{MoveList, Position};
use crate::see;
use crate::types::*;

use arrayvec::ArrayVec;
use chess::{ChessMove, Piece, Square};

pub const MAX_MOVES: usize = 256;

const TT_MOVE_SCORE: Score = 2_000_000_000;
const GOOD_CAPTURE_BASE: Score = 1_000_000_000;
const QUEEN_PROMO_BONUS: Score = 500_000;
const KILLER_1_SCORE: Score = 900_000_100;
const KILLER_2_SCORE: Score = 900_000_000;
const COUNTER_SCORE: Score = 850_000_000;
const BAD_CAPTURE_BASE: Score = -1_000_000_000;

#[derive(Debug, Clone, Copy)]
pub struct ScoredMove {
    pub mv: ChessMove,
    pub score: Score,
}

pub type ScoredMoves = ArrayVec<ScoredMove, MAX_MOVES>;

#[derive(Debug, Default, Clone, Copy)]
pub struct OrderingContext {
    pub tt_move: Option<ChessMove>,
    pub height: usize,
    /// previous move's (piece, to), for counter-move / continuation lookups
    pub prev: Option<(Piece, Square)>,
}

/// Per-thread move ordering state. Nothing in here is shared; each worker
/// owns one and updates it from its own cutoffs.
#[derive(Debug, Clone, Default)]
pub struct MoveOrderer {
    pub killers: KillerMoves,
    pub history: ButterflyHistory,
    pub counters: CounterMoves,
    pub capture_history: CaptureHistory,
    pub continuation: ContinuationHistory,
}

/// Scoring
impl MoveOrderer {
    pub fn score_moves(
        &self,
        pos: &Position,
        moves: &MoveList,
        ctx: &OrderingContext,
    ) -> ScoredMoves {
        let side = pos.side_to_move();
        let killers = self.killers.get(ctx.height);
        let counter = ctx
            .prev
            .and_then(|(pc, to)| self.counters.get(side, pc, to));

        let mut out = ScoredMoves::new();
        for &mv in moves.iter() {
            let score = if ctx.tt_move == Some(mv) {
                TT_MOVE_SCORE
            } else if let Some(victim) = pos.captured_piece(mv) {
                let attacker = pos.moved_piece(mv);
                let exchange = see::see(pos, mv);
                let key = see::piece_value(victim) * 8 - see::piece_value(attacker)
                    + exchange
                    + self.capture_history.get(attacker, victim, mv.get_dest());
                let base = if exchange >= 0 {
                    GOOD_CAPTURE_BASE
                } else {
                    BAD_CAPTURE_BASE
                };
                let promo_bonus = if mv.get_promotion() == Some(Piece::Queen) {
                    QUEEN_PROMO_BONUS
                } else {
                    0
                };
                base + key + promo_bonus
            } else if mv.get_promotion() == Some(Piece::Queen) {
                GOOD_CAPTURE_BASE + QUEEN_PROMO_BONUS
            } else if killers[0] == Some(mv) {
                KILLER_1_SCORE
            } else if killers[1] == Some(mv) {
                KILLER_2_SCORE
            } else if counter == Some(mv) {
                COUNTER_SCORE
            } else {
                let mut s = self.history.get(side, mv);
                if let Some((prev_pc, prev_to)) = ctx.prev {
                    s += self
                        .continuation
                        .get(prev_pc, prev_to, pos.moved_piece(mv), mv.get_dest());
                }
                s
            };
            out.push(ScoredMove { mv, score });
        }
        out
    }
}

/// Selection sort on demand: find the best remaining move, swap it into
/// place, return it. Cheap when a cutoff ends the loop early.
pub fn pick_best(moves: &mut ScoredMoves, index: usize) -> ScoredMove {
    let mut best = index;
    for i in index + 1..moves.len() {
        if moves[i].score > moves[best].score {
            best = i;
        }
    }
    moves.swap(index, best);
    moves[index]
}

/// Cutoff updates
impl MoveOrderer {
    /// A quiet move produced a beta cutoff: install killer/counter and give
    /// the quadratic history bonus, with the symmetric malus for the quiets
    /// tried before it.
    pub fn quiet_cutoff(
        &mut self,
        pos: &Position,
        mv: ChessMove,
        ctx: &OrderingContext,
        depth: Depth,
        tried_quiets: &[ChessMove],
    ) {
        let side = pos.side_to_move();
        let bonus = depth_stat_bonus(depth);

        self.killers.store(ctx.height, mv);
        if let Some((prev_pc, prev_to)) = ctx.prev {
            self.counters.insert(side, prev_pc, prev_to, mv);
        }

        self.history.update(side, mv, bonus);
        if let Some((prev_pc, prev_to)) = ctx.prev {
            self.continuation
                .update(prev_pc, prev_to, pos.moved_piece(mv), mv.get_dest(), bonus);
        }

        for &tried in tried_quiets {
            if tried == mv {
                continue;
            }
            self.history.update(side, tried, -bonus);
            if let Some((prev_pc, prev_to)) = ctx.prev {
                self.continuation.update(
                    prev_pc,
                    prev_to,
                    pos.moved_piece(tried),
                    tried.get_dest(),
                    -bonus,
                );
            }
        }
    }

    pub fn capture_cutoff(&mut self, pos: &Position, mv: ChessMove, depth: Depth) {
        if let Some(victim) = pos.captured_piece(mv) {
            let bonus = depth_stat_bonus(depth);
            self.capture_history
                .update(pos.moved_piece(mv), victim, mv.get_dest(), bonus);
        }
    }
}

/// Lifecycle
impl MoveOrderer {
    /// Full reset; a cleared orderer plus a cleared TT reproduces a fresh
    /// engine bit for bit.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Soft aging between searches of the same game.
    pub fn new_search(&mut self) {
        self.killers.clear();
        self.counters.clear();
        self.history.decay();
        self.capture_history.decay();
        self.continuation.decay();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::MoveGenFilter;
    use std::str::FromStr;

    #[test]
    fn tt_move_ranks_first() {
        let pos = Position::startpos();
        let moves = pos.generate_moves(MoveGenFilter::All);
        let orderer = MoveOrderer::default();
        let tt_move = ChessMove::from_str("g1f3").unwrap();

        let ctx = OrderingContext {
            tt_move: Some(tt_move),
            ..Default::default()
        };
        let mut scored = orderer.score_moves(&pos, &moves, &ctx);
        assert_eq!(pick_best(&mut scored, 0).mv, tt_move);
    }

    #[test]
    fn good_capture_before_quiet_before_bad_capture() {
        // white can win a pawn with exd5, or lose a rook with Rxa6 (pawn defended by b7)
        let pos =
            Position::from_fen("k7/1p6/p7/3p4/4P3/8/8/R3K3 w - - 0 1").unwrap();
        let moves = pos.generate_moves(MoveGenFilter::All);
        let orderer = MoveOrderer::default();
        let ctx = OrderingContext::default();
        let mut scored = orderer.score_moves(&pos, &moves, &ctx);

        let first = pick_best(&mut scored, 0).mv;
        assert_eq!(format!("{}", first), "e4d5");

        let last = scored
            .iter()
            .min_by_key(|s| s.score)
            .map(|s| format!("{}", s.mv))
            .unwrap();
        assert_eq!(last, "a1a6");
    }

    #[test]
    fn killer_ranks_above_plain_quiet() {
        let pos = Position::startpos();
        let moves = pos.generate_moves(MoveGenFilter::All);
        let mut orderer = MoveOrderer::default();
        let killer = ChessMove::from_str("b1c3").unwrap();
        orderer.killers.store(0, killer);

        let ctx = OrderingContext::default();
        let mut scored = orderer.score_moves(&pos, &moves, &ctx);
        assert_eq!(pick_best(&mut scored, 0).mv, killer);
    }

    #[test]
    fn cutoff_bonus_reorders_quiets() {
        let pos = Position::startpos();
        let moves = pos.generate_moves(MoveGenFilter::All);
        let mut orderer = MoveOrderer::default();
        let good = ChessMove::from_str("d2d4").unwrap();
        let tried = ChessMove::from_str("a2a3").unwrap();

        // the killer table would mask the history effect at the same height
        let ctx = OrderingContext {
            height: 1,
            ..Default::default()
        };
        orderer.quiet_cutoff(&pos, good, &OrderingContext::default(), 6, &[tried]);

        let scored = orderer.score_moves(&pos, &moves, &ctx);
        let score_of = |mv: ChessMove| scored.iter().find(|s| s.mv == mv).unwrap().score;
        assert!(score_of(good) > 0);
        assert!(score_of(tried) < 0);
        assert!(score_of(good) > score_of(tried));
    }

    #[test]
    fn pick_best_is_a_selection_sort() {
        let pos = Position::startpos();
        let moves = pos.generate_moves(MoveGenFilter::All);
        let orderer = MoveOrderer::default();
        let mut scored = orderer.score_moves(&pos, &moves, &OrderingContext::default());

        let mut last = Score::MAX;
        for i in 0..scored.len() {
            let s = pick_best(&mut scored, i);
            assert!(s.score <= last);
            last = s.score;
        }
    }
}
