
use crate::move_ordering::{pick_best, OrderingContext};
use crate::position::{MoveGenFilter, Position};
use crate::see;
use crate::threading::ExThread;
use crate::types::*;

use chess::Piece;

const DELTA_PRUNE_MARGIN: Score = 200;

/// Quiescence
impl ExThread {
    /// Stripped-down negamax that only resolves captures, promotions and
    /// (at the first quiescence ply) quiet checks, with the static eval as a
    /// stand-pat lower bound. `depth` is 0 at entry and counts down.
    pub fn qsearch(
        &mut self,
        pos: &Position,
        height: usize,
        depth: Depth,
        mut alpha: Score,
        beta: Score,
    ) -> Option<Score> {
        if self.should_abort() {
            return None;
        }
        self.stats.on_qnode_enter(height);
        self.prepare_node(pos, height);

        if pos.is_fifty_move_draw()
            || pos.is_insufficient_material()
            || self.stack.is_repetition(pos, height)
        {
            return Some(DRAW_VALUE);
        }
        if height >= MAX_PLY - 1 {
            return Some(self.leaf_eval(pos, height));
        }

        let is_pv = beta - alpha > 1;
        let hash = pos.hash();

        let tt_entry = self.tt.probe(hash, height);
        let tt_move = tt_entry
            .and_then(|e| e.mv.unpack())
            .filter(|&m| pos.move_is_legal(m));
        if let Some(e) = tt_entry {
            self.stats.tt_hits += 1;
            if (!is_pv || e.bound == Bound::Exact) && e.bound.usable(e.score, alpha, beta) {
                return Some(e.score);
            }
        }

        let in_check = pos.in_check();
        let mut best_score = -INF;
        let mut best_move = PackedMove::NULL;
        let mut bound = Bound::Upper;
        let mut stand_pat = None;

        if !in_check {
            let mut eval = match tt_entry.and_then(|e| e.eval) {
                Some(e) => e,
                None => self.leaf_eval(pos, height),
            };
            // a stored search score bounded toward us beats the raw eval
            if let Some(e) = tt_entry {
                let usable = if e.score > eval {
                    Bound::Lower
                } else {
                    Bound::Upper
                };
                if e.bound == usable {
                    eval = e.score;
                }
            }
            self.stack.at_mut(height).static_eval = Some(eval);
            stand_pat = Some(eval);

            if eval >= beta {
                return Some(eval);
            }
            alpha = alpha.max(eval);
            best_score = eval;
        }

        let moves = if in_check {
            pos.generate_moves(MoveGenFilter::All)
        } else {
            pos.generate_moves(MoveGenFilter::CapturesOnly)
        };

        let ctx = OrderingContext {
            tt_move,
            height,
            prev: self.stack.prev_move_key(height),
        };
        let mut scored = self.orderer.score_moves(pos, &moves, &ctx);

        let mut legal = 0usize;
        let mut cut = false;

        for i in 0..scored.len() {
            let mv = pick_best(&mut scored, i).mv;

            if !in_check {
                if let Some(promo) = mv.get_promotion() {
                    if promo != Piece::Queen {
                        continue;
                    }
                }
                // losing captures are not worth resolving
                if pos.is_capture(mv) && !see::see_ge(pos, mv, 0) {
                    continue;
                }
                // delta pruning: even winning the victim cannot reach alpha
                if !is_pv {
                    if let (Some(sp), Some(victim)) = (stand_pat, pos.captured_piece(mv)) {
                        if sp + see::piece_value(victim) + DELTA_PRUNE_MARGIN <= alpha {
                            continue;
                        }
                    }
                }
            }

            let pc = pos.moved_piece(mv);
            let (child, dirty) = pos.do_move(mv);
            self.prepare_child(height, Some((mv, pc)), &child, Some(&dirty));
            let score = -self.qsearch(&child, height + 1, depth - 1, -beta, -alpha)?;
            legal += 1;

            if score > best_score {
                best_score = score;
                best_move = PackedMove::pack(mv);
                if score > alpha {
                    alpha = score;
                    bound = Bound::Exact;
                    if score >= beta {
                        bound = Bound::Lower;
                        cut = true;
                        break;
                    }
                }
            }
        }

        // quiet checking moves, only at the first quiescence ply
        if depth == 0 && !in_check && !cut {
            let all = pos.generate_moves(MoveGenFilter::All);
            for &mv in all.iter() {
                if !pos.is_quiet(mv) {
                    continue;
                }
                if !see::see_ge(pos, mv, 0) {
                    continue;
                }
                let pc = pos.moved_piece(mv);
                let (child, dirty) = pos.do_move(mv);
                if !child.in_check() {
                    continue;
                }
                self.prepare_child(height, Some((mv, pc)), &child, Some(&dirty));
                let score = -self.qsearch(&child, height + 1, depth - 1, -beta, -alpha)?;
                legal += 1;

                if score > best_score {
                    best_score = score;
                    best_move = PackedMove::pack(mv);
                    if score > alpha {
                        alpha = score;
                        bound = Bound::Exact;
                        if score >= beta {
                            bound = Bound::Lower;
                            break;
                        }
                    }
                }
            }
        }

        if in_check && legal == 0 {
            return Some(-CHECKMATE_VALUE + height as Score);
        }

        let eval = self.stack.at(height).static_eval;
        self.tt
            .store(hash, height, 0, best_score, eval, bound, best_move);

        Some(best_score)
    }
}
