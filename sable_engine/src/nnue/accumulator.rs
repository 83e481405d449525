
use super::{PackedNetwork, MAX_HIDDEN};
use crate::position::{DirtyList, Position};

use chess::{Color, Piece, ALL_PIECES};

/// First-layer activations, one row per perspective colour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    pub vals: [[i16; MAX_HIDDEN]; 2],
    pub computed: bool,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            vals: [[0; MAX_HIDDEN]; 2],
            computed: false,
        }
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

fn add_feature(net: &PackedNetwork, vals: &mut [i16; MAX_HIDDEN], feature: usize) {
    let col = &net.ft_weights[feature * net.hidden..(feature + 1) * net.hidden];
    for (v, w) in vals[..net.hidden].iter_mut().zip(col) {
        *v += *w;
    }
}

fn sub_feature(net: &PackedNetwork, vals: &mut [i16; MAX_HIDDEN], feature: usize) {
    let col = &net.ft_weights[feature * net.hidden..(feature + 1) * net.hidden];
    for (v, w) in vals[..net.hidden].iter_mut().zip(col) {
        *v -= *w;
    }
}

/// Rebuild both perspectives from the full piece placement.
pub fn refresh(net: &PackedNetwork, pos: &Position, accum: &mut Accumulator) {
    for persp in [Color::White, Color::Black] {
        let vals = &mut accum.vals[persp.to_index()];
        vals[..net.hidden].copy_from_slice(&net.ft_bias);

        let king_sq = pos.king_square(persp);
        for color in [Color::White, Color::Black] {
            for pc in ALL_PIECES {
                for sq in pos.get(pc, color) {
                    let idx = PackedNetwork::feature_index(persp, king_sq, pc, color, sq);
                    add_feature(net, vals, idx);
                }
            }
        }
    }
    accum.computed = true;
}

/// `accumulator[child] = accumulator[parent] + added weights - removed
/// weights`. Returns false when the move touched a king: features are
/// king-relative and the caller must refresh instead.
pub fn update(
    net: &PackedNetwork,
    parent: &Accumulator,
    out: &mut Accumulator,
    child: &Position,
    dirty: &DirtyList,
) -> bool {
    debug_assert!(parent.computed);

    if dirty.iter().any(|d| d.pc == Piece::King) {
        out.computed = false;
        return false;
    }

    out.vals = parent.vals;

    for persp in [Color::White, Color::Black] {
        let king_sq = child.king_square(persp);
        let vals = &mut out.vals[persp.to_index()];
        for d in dirty.iter() {
            if let Some(to) = d.to {
                let idx = PackedNetwork::feature_index(persp, king_sq, d.pc, d.color, to);
                add_feature(net, vals, idx);
            }
            if let Some(from) = d.from {
                let idx = PackedNetwork::feature_index(persp, king_sq, d.pc, d.color, from);
                sub_feature(net, vals, idx);
            }
        }
    }

    out.computed = true;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::MoveGenFilter;
    use rand::prelude::*;

    #[test]
    fn incremental_update_matches_refresh_exactly() {
        let net = PackedNetwork::random(0xacc, 64, 4);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..25 {
            let mut pos = Position::startpos();
            let mut accum = Accumulator::new();
            refresh(&net, &pos, &mut accum);

            for _ in 0..50 {
                let moves = pos.generate_moves(MoveGenFilter::All);
                if moves.is_empty() {
                    break;
                }
                let mv = moves[rng.gen_range(0..moves.len())];
                let (child, dirty) = pos.do_move(mv);

                let mut next = Accumulator::new();
                if !update(&net, &accum, &mut next, &child, &dirty) {
                    refresh(&net, &child, &mut next);
                }

                let mut fresh = Accumulator::new();
                refresh(&net, &child, &mut fresh);
                assert_eq!(next, fresh, "accumulator diverged after {}", mv);

                accum = next;
                pos = child;
            }
        }
    }

    #[test]
    fn king_moves_force_refresh() {
        let net = PackedNetwork::random(1, 32, 1);
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let mut accum = Accumulator::new();
        refresh(&net, &pos, &mut accum);

        let mv = chess::ChessMove::from_san(&pos.board, "Kd2").unwrap();
        let (child, dirty) = pos.do_move(mv);
        let mut next = Accumulator::new();
        assert!(!update(&net, &accum, &mut next, &child, &dirty));
        assert!(!next.computed);
    }
}
