
use crate::explore::PvLine;
use crate::move_ordering::{pick_best, OrderingContext};
use crate::position::{MoveGenFilter, Position};
use crate::see;
use crate::tablebase::wdl_to_score;
use crate::threading::ExThread;
use crate::trans_table::TTEntry;
use crate::tuning::{lmp_threshold, lmr_reduction};
use crate::types::*;

use arrayvec::ArrayVec;
use chess::{CastleRights, ChessMove, Color, Piece};
use rand::Rng;

/// Aspiration windows
impl ExThread {
    /// Iteratively re-searches the root with a window centred on the
    /// previous iteration's score, widening on failure. `None` means the
    /// search was aborted and this iteration's result must be discarded.
    pub fn aspiration_search(
        &mut self,
        depth: Depth,
        pv_index: usize,
        prev_score: Option<Score>,
        excluded: &[ChessMove],
    ) -> Option<PvLine> {
        let mut delta = self.params.aspiration_delta;

        let use_windows = self.cfg.use_aspiration
            && depth >= self.params.aspiration_min_depth
            && matches!(prev_score, Some(s) if s.abs() < KNOWN_WIN_VALUE);

        let (mut alpha, mut beta) = if use_windows {
            let prev = prev_score.unwrap();
            ((prev - delta).max(-INF), (prev + delta).min(INF))
        } else {
            (-INF, INF)
        };

        loop {
            let line = self.root_search(depth, alpha, beta, pv_index, excluded)?;

            if line.score <= alpha {
                alpha = (line.score - delta).max(-INF);
                delta += delta;
            } else if line.score >= beta {
                beta = (line.score + delta).min(INF);
                delta += delta;
            } else {
                return Some(line);
            }

            if delta > 1000 {
                alpha = -INF;
                beta = INF;
            }
        }
    }
}

/// Root search
impl ExThread {
    pub fn root_search(
        &mut self,
        depth: Depth,
        mut alpha: Score,
        beta: Score,
        pv_index: usize,
        excluded: &[ChessMove],
    ) -> Option<PvLine> {
        let pos = self.pos;
        self.prepare_node(&pos, 0);
        self.stack.at_mut(0).excluded = None;

        let mut moves = pos.generate_moves(MoveGenFilter::All);
        if !self.cfg.only_root_moves.is_empty() {
            moves.retain(|m| self.cfg.only_root_moves.contains(m));
        }
        moves.retain(|m| !excluded.contains(m));

        if moves.is_empty() {
            let score = if pos.in_check() {
                -CHECKMATE_VALUE
            } else {
                DRAW_VALUE
            };
            return Some(PvLine {
                moves: vec![],
                score,
                tb_score: None,
            });
        }

        let hash = pos.hash();
        let tt_move = self
            .tt
            .probe(hash, 0)
            .and_then(|e| e.mv.unpack())
            .or_else(|| self.node_cache.probe(hash).and_then(|h| h.best.unpack()))
            .filter(|&m| pos.move_is_legal(m));

        let ctx = OrderingContext {
            tt_move,
            height: 0,
            prev: None,
        };
        let mut scored = self.orderer.score_moves(&pos, &moves, &ctx);

        // helper threads diverge through ordering noise as well as depth
        if self.id != 0 {
            for s in scored.iter_mut() {
                s.score += self.rng.gen_range(0..32);
            }
        }

        let mut best_score = -INF;
        let mut best_move: Option<ChessMove> = None;
        let mut best_moves: Vec<ChessMove> = vec![];
        let mut bound = Bound::Upper;

        for i in 0..scored.len() {
            if self.should_abort() {
                return None;
            }
            let mv = pick_best(&mut scored, i).mv;

            let pc = pos.moved_piece(mv);
            let (child, dirty) = pos.do_move(mv);
            self.prepare_child(0, Some((mv, pc)), &child, Some(&dirty));

            let nodes_before = self.stats.nodes;
            let new_depth = depth - 1;

            let mut score = if i == 0 {
                -self.negamax(&child, new_depth, 1, -beta, -alpha, false)?
            } else {
                -self.negamax(&child, new_depth, 1, -alpha - 1, -alpha, true)?
            };
            if i > 0 && score > alpha && score < beta {
                score = -self.negamax(&child, new_depth, 1, -beta, -alpha, false)?;
            }

            let spent = self.stats.nodes - nodes_before;
            *self
                .root_nodes
                .entry(PackedMove::pack(mv).0)
                .or_insert(0) += spent;
            self.node_cache
                .store(child.hash(), None, PackedMove::NULL, spent);

            if score > best_score {
                best_score = score;
                best_move = Some(mv);
                if score > alpha {
                    alpha = score;
                    bound = Bound::Exact;
                    self.update_pv(0, mv);
                    best_moves = self
                        .stack
                        .at(0)
                        .pv
                        .iter()
                        .filter_map(|&pm| pm.unpack())
                        .collect();
                    if score >= beta {
                        bound = Bound::Lower;
                        break;
                    }
                }
            }
        }

        if best_moves.is_empty() {
            if let Some(mv) = best_move {
                best_moves = vec![mv];
            }
        }
        if !best_moves.is_empty() {
            self.extend_pv_from_tt(&mut best_moves, depth);
        }

        if pv_index == 0 && excluded.is_empty() {
            let packed = best_move.map(PackedMove::pack).unwrap_or(PackedMove::NULL);
            self.tt
                .store(hash, 0, depth, best_score, None, bound, packed);
            let total: u64 = self.root_nodes.values().sum();
            self.node_cache.store(hash, None, packed, total);
        }

        Some(PvLine {
            moves: best_moves,
            score: best_score,
            tb_score: None,
        })
    }

    /// An exact transposition hit inside the variation ends the collected
    /// line early; walk the table to restore the tail, bounded by the
    /// search depth.
    fn extend_pv_from_tt(&self, line: &mut Vec<ChessMove>, depth: Depth) {
        let mut pos = self.pos;
        for &mv in line.iter() {
            pos = pos.do_move(mv).0;
        }
        while (line.len() as Depth) < depth {
            let entry = match self.tt.probe(pos.hash(), 0) {
                Some(e) => e,
                None => break,
            };
            let mv = match entry.mv.unpack() {
                Some(m) => m,
                None => break,
            };
            if !pos.move_is_legal(mv) {
                break;
            }
            line.push(mv);
            pos = pos.do_move(mv).0;
        }
    }

    fn update_pv(&mut self, height: usize, mv: ChessMove) {
        let (parents, children) = self.stack.entries.split_at_mut(height + 1);
        let entry = &mut parents[height];
        let child = &children[0];
        entry.pv.clear();
        entry.pv.push(PackedMove::pack(mv));
        for &m in child.pv.iter() {
            if entry.pv.try_push(m).is_err() {
                break;
            }
        }
    }
}

/// Negamax
impl ExThread {
    /// Alpha-beta with all the trimmings; see the step comments. Returns
    /// `None` only when the stop flag was observed, in which case the caller
    /// unwinds without using the value.
    pub fn negamax(
        &mut self,
        pos: &Position,
        depth: Depth,
        height: usize,
        mut alpha: Score,
        mut beta: Score,
        cut_node: bool,
    ) -> Option<Score> {
        if depth <= 0 {
            return self.qsearch(pos, height, 0, alpha, beta);
        }

        if self.should_abort() {
            return None;
        }
        self.stats.on_node_enter(height);
        self.prepare_node(pos, height);

        let is_pv = beta - alpha > 1;
        let excluded = self.stack.at(height).excluded;

        // upcoming draws end the node before any table lookup
        if pos.is_fifty_move_draw()
            || pos.is_insufficient_material()
            || self.stack.is_repetition(pos, height)
        {
            return Some(DRAW_VALUE);
        }
        if height >= MAX_PLY - 1 {
            return Some(self.leaf_eval(pos, height));
        }

        // mate-distance pruning: the window cannot exceed the best/worst
        // mate still reachable from here
        alpha = alpha.max(-CHECKMATE_VALUE + height as Score);
        beta = beta.min(CHECKMATE_VALUE - height as Score - 1);
        if alpha >= beta {
            return Some(alpha);
        }

        let hash = pos.hash();
        let mut tt_entry: Option<TTEntry> = None;
        let mut tt_move: Option<ChessMove> = None;

        if excluded.is_none() {
            tt_entry = self.tt.probe(hash, height);
            if let Some(e) = tt_entry {
                self.stats.tt_hits += 1;
                tt_move = e.mv.unpack().filter(|&m| pos.move_is_legal(m));
                // PV nodes only trust exact entries; everywhere else any
                // usable bound cuts
                if (!is_pv || e.bound == Bound::Exact)
                    && e.depth >= depth
                    && e.bound.usable(e.score, alpha, beta)
                {
                    return Some(e.score);
                }
            }
        }

        // tablebase probe, only for zeroed positions the tables cover
        if let Some(tb) = self.tb.clone() {
            if excluded.is_none()
                && pos.num_pieces() <= tb.max_pieces()
                && pos.halfmove_count() == 0
                && pos.board.castle_rights(Color::White) == CastleRights::NoRights
                && pos.board.castle_rights(Color::Black) == CastleRights::NoRights
            {
                if let Some(wdl) = tb.probe_wdl(pos) {
                    self.stats.tb_hits += 1;
                    let score = wdl_to_score(wdl, height);
                    self.tt.store(
                        hash,
                        height,
                        depth,
                        score,
                        None,
                        Bound::Exact,
                        PackedMove::NULL,
                    );
                    return Some(score);
                }
            }
        }

        let in_check = self.stack.at(height).in_check;

        let static_eval = if in_check {
            None
        } else {
            let eval = tt_entry
                .and_then(|e| e.eval)
                .or_else(|| {
                    if height <= 2 {
                        self.node_cache.probe(hash).and_then(|h| h.eval)
                    } else {
                        None
                    }
                })
                .unwrap_or_else(|| self.leaf_eval(pos, height));
            Some(eval)
        };
        self.stack.at_mut(height).static_eval = static_eval;

        let improving = match (static_eval, self.stack.eval_two_up(height)) {
            (Some(now), Some(prev)) => now > prev,
            (Some(_), None) => true,
            _ => false,
        };

        let nodes_at_entry = self.stats.nodes;

        if let Some(eval) = static_eval {
            if !is_pv && excluded.is_none() && !self.cfg.analysis_mode {
                // razoring: hopeless nodes drop straight into quiescence
                if depth <= self.params.razor_depth
                    && eval + self.params.razor_margin * depth as Score <= alpha
                {
                    return self.qsearch(pos, height, 0, alpha, beta);
                }

                // reverse futility: a comfortable static margin over beta
                if depth <= self.params.rfp_depth
                    && beta.abs() < MIN_WIN_VALUE
                    && eval - self.params.rfp_margin * depth as Score >= beta
                {
                    return Some(eval);
                }

                // null-move pruning, guarded against zugzwang
                let parent_was_null = height > 0 && self.stack.at(height - 1).null_move;
                if depth > self.params.nmp_base_reduction
                    && eval >= beta
                    && !parent_was_null
                    && self.has_non_pawn_material(pos)
                {
                    if let Some(child) = pos.do_null_move() {
                        self.prepare_child(height, None, &child, None);
                        let reduced =
                            depth - self.params.nmp_base_reduction - depth / 4;
                        let score = -self.negamax(
                            &child,
                            reduced,
                            height + 1,
                            -beta,
                            -beta + 1,
                            !cut_node,
                        )?;
                        if score >= beta {
                            self.stats.null_prunes += 1;
                            return Some(beta);
                        }
                    }
                }
            }
        }

        // internal iterative reduction: no TT move here means the previous
        // pass never visited this node properly
        let mut depth = depth;
        if depth >= self.params.iir_min_depth && tt_move.is_none() && (is_pv || cut_node) {
            depth -= 1;
        }

        let moves = pos.generate_moves(MoveGenFilter::All);
        if moves.is_empty() {
            return Some(if in_check {
                -CHECKMATE_VALUE + height as Score
            } else {
                DRAW_VALUE
            });
        }

        let ctx = OrderingContext {
            tt_move,
            height,
            prev: self.stack.prev_move_key(height),
        };
        let mut scored = self.orderer.score_moves(pos, &moves, &ctx);

        let mut best_score = -INF;
        let mut best_move: Option<ChessMove> = None;
        let mut bound = Bound::Upper;
        let mut searched = 0usize;
        let mut tried_quiets: ArrayVec<ChessMove, 64> = ArrayVec::new();

        for i in 0..scored.len() {
            let mv = pick_best(&mut scored, i).mv;
            if Some(PackedMove::pack(mv)) == excluded {
                continue;
            }

            let is_quiet = pos.is_quiet(mv);

            // shallow-depth prunings need one searched move as a floor
            if searched > 0
                && best_score > -MIN_WIN_VALUE
                && !is_pv
                && !in_check
                && !self.cfg.analysis_mode
            {
                if is_quiet
                    && depth <= self.params.lmp_depth
                    && searched >= lmp_threshold(depth, improving)
                {
                    continue;
                }
                if pos.is_capture(mv)
                    && depth <= self.params.see_prune_depth
                    && !see::see_ge(pos, mv, -self.params.see_prune_margin * depth as Score)
                {
                    continue;
                }
            }

            // singular extension: is the TT move uniquely best here?
            let mut extension: Depth = 0;
            let mut double_extended = false;
            if Some(mv) == tt_move && excluded.is_none() && depth >= self.params.singular_min_depth
            {
                if let Some(e) = tt_entry {
                    if (e.bound == Bound::Lower || e.bound == Bound::Exact)
                        && e.depth >= depth - 3
                        && e.score.abs() < MIN_WIN_VALUE
                    {
                        let sing_beta =
                            (e.score - self.params.singular_margin * depth as Score).max(-INF + 1);
                        self.stack.at_mut(height).excluded = Some(PackedMove::pack(mv));
                        let sing_score = self.negamax(
                            pos,
                            (depth - 1) / 2,
                            height,
                            sing_beta - 1,
                            sing_beta,
                            cut_node,
                        )?;
                        self.stack.at_mut(height).excluded = None;

                        if sing_score < sing_beta {
                            extension = 1;
                            let dext = self.stack.at(height).double_extensions;
                            if sing_score < sing_beta - self.params.singular_double_margin
                                && dext < self.params.max_double_extensions
                            {
                                extension = 2;
                                double_extended = true;
                            }
                        }
                    }
                }
            }

            let pc = pos.moved_piece(mv);
            let (child, dirty) = pos.do_move(mv);
            let gives_check = child.in_check();

            if extension == 0 && gives_check && see::see_ge(pos, mv, 0) {
                extension = 1;
            }

            self.prepare_child(height, Some((mv, pc)), &child, Some(&dirty));
            // only the extended move's own subtree pays for the double
            // extension; siblings inherit the parent's count untouched
            if double_extended {
                self.stack.at_mut(height + 1).double_extensions += 1;
            }
            searched += 1;

            let new_depth = depth - 1 + extension;
            let mut score;

            if searched == 1 {
                score = -self.negamax(&child, new_depth, height + 1, -beta, -alpha, false)?;
            } else {
                // late-move reduction for quiets down the list
                let mut r: Depth = 0;
                if is_quiet && depth >= self.params.lmr_min_depth && searched > self.params.lmr_min_moves
                {
                    r = lmr_reduction(depth, searched);
                    if !is_pv {
                        r += 1;
                    }
                    if cut_node {
                        r += 1;
                    }
                    if in_check {
                        r -= 1;
                    }
                    r = r.clamp(0, (new_depth - 1).max(0));
                }

                score =
                    -self.negamax(&child, new_depth - r, height + 1, -alpha - 1, -alpha, true)?;
                if score > alpha && r > 0 {
                    score = -self.negamax(
                        &child,
                        new_depth,
                        height + 1,
                        -alpha - 1,
                        -alpha,
                        !cut_node,
                    )?;
                }
                if score > alpha && score < beta {
                    score = -self.negamax(&child, new_depth, height + 1, -beta, -alpha, false)?;
                }
            }

            if is_quiet {
                let _ = tried_quiets.try_push(mv);
            }

            if score > best_score {
                best_score = score;
                best_move = Some(mv);
                if score > alpha {
                    alpha = score;
                    bound = Bound::Exact;
                    if is_pv {
                        self.update_pv(height, mv);
                    }
                    if score >= beta {
                        bound = Bound::Lower;
                        self.stats.beta_cuts += 1;
                        if searched == 1 {
                            self.stats.beta_cuts_first += 1;
                        }
                        if is_quiet {
                            self.orderer
                                .quiet_cutoff(pos, mv, &ctx, depth, &tried_quiets);
                        } else {
                            self.orderer.capture_cutoff(pos, mv, depth);
                        }
                        break;
                    }
                }
            }
        }

        if searched == 0 {
            // every generated move was the excluded one
            return Some(alpha);
        }

        if excluded.is_none() {
            let packed = best_move.map(PackedMove::pack).unwrap_or(PackedMove::NULL);
            self.tt
                .store(hash, height, depth, best_score, static_eval, bound, packed);

            if height <= 2 {
                let subtree = self.stats.nodes - nodes_at_entry;
                self.node_cache.store(hash, static_eval, packed, subtree);
            }
        }

        Some(best_score)
    }

    fn has_non_pawn_material(&self, pos: &Position) -> bool {
        let stm = pos.side_to_move();
        [Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen]
            .iter()
            .any(|&pc| pos.get(pc, stm) != chess::EMPTY)
    }
}
