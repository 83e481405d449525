
use crate::evaluate::TaperedScore;
use crate::position::{DirtyList, Position};

use chess::{Color, Piece};
use once_cell::sync::Lazy;

/// King-bucketed piece-square tables. The own king's half-board quadrant
/// (rank 0-7 x mirrored file 0-3) selects one of 32 buckets; each bucket
/// holds per-square values for the five non-king piece types, split into
/// "same side as the king" and "enemy" slots. Squares are mirrored
/// horizontally when the king lives on the e-h files, and vertically for the
/// black king, so a single table serves both colours.
const NUM_BUCKETS: usize = 32;
const NUM_SLOTS: usize = 10;

type Entry = (i16, i16);
type BucketTable = [[Entry; 64]; NUM_SLOTS];

static PSQT: Lazy<Box<[BucketTable; NUM_BUCKETS]>> = Lazy::new(build_tables);

#[rustfmt::skip]
const PAWN_MG: [i16; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
     52,  54,  50,  52,  52,  50,  54,  52,
     18,  24,  30,  34,  34,  30,  24,  18,
      8,  10,  16,  26,  26,  16,  10,   8,
      2,   4,   8,  18,  18,   8,   4,   2,
      2,   0,   4,   6,   6,   4,   0,   2,
      4,   6,   2,  -8,  -8,   2,   6,   4,
      0,   0,   0,   0,   0,   0,   0,   0,
];

#[rustfmt::skip]
const PAWN_EG: [i16; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
     92,  88,  84,  80,  80,  84,  88,  92,
     50,  48,  44,  40,  40,  44,  48,  50,
     28,  26,  22,  20,  20,  22,  26,  28,
     16,  14,  12,  10,  10,  12,  14,  16,
      8,   8,   6,   6,   6,   6,   8,   8,
      8,   8,   8,   8,   8,   8,   8,   8,
      0,   0,   0,   0,   0,   0,   0,   0,
];

#[rustfmt::skip]
const KNIGHT_MG: [i16; 64] = [
    -50, -36, -28, -24, -24, -28, -36, -50,
    -36, -18,  -6,   0,   0,  -6, -18, -36,
    -28,  -4,  10,  14,  14,  10,  -4, -28,
    -24,   2,  14,  22,  22,  14,   2, -24,
    -24,   0,  14,  22,  22,  14,   0, -24,
    -28,  -4,  10,  14,  14,  10,  -4, -28,
    -36, -18,  -6,   2,   2,  -6, -18, -36,
    -50, -36, -28, -24, -24, -28, -36, -50,
];

#[rustfmt::skip]
const KNIGHT_EG: [i16; 64] = [
    -40, -30, -20, -16, -16, -20, -30, -40,
    -30, -14,  -4,   2,   2,  -4, -14, -30,
    -20,  -4,   8,  12,  12,   8,  -4, -20,
    -16,   2,  12,  18,  18,  12,   2, -16,
    -16,   2,  12,  18,  18,  12,   2, -16,
    -20,  -4,   8,  12,  12,   8,  -4, -20,
    -30, -14,  -4,   2,   2,  -4, -14, -30,
    -40, -30, -20, -16, -16, -20, -30, -40,
];

#[rustfmt::skip]
const BISHOP_MG: [i16; 64] = [
    -16,  -8,  -8,  -8,  -8,  -8,  -8, -16,
     -8,   2,   0,   0,   0,   0,   2,  -8,
     -8,   6,   6,   6,   6,   6,   6,  -8,
     -8,   0,   6,  10,  10,   6,   0,  -8,
     -8,   4,   6,  10,  10,   6,   4,  -8,
     -8,   8,   8,   6,   6,   8,   8,  -8,
     -8,  10,   2,   2,   2,   2,  10,  -8,
    -16,  -8, -10,  -8,  -8, -10,  -8, -16,
];

#[rustfmt::skip]
const BISHOP_EG: [i16; 64] = [
    -12,  -6,  -4,  -4,  -4,  -4,  -6, -12,
     -6,   0,   0,   2,   2,   0,   0,  -6,
     -4,   0,   4,   6,   6,   4,   0,  -4,
     -4,   2,   6,   8,   8,   6,   2,  -4,
     -4,   2,   6,   8,   8,   6,   2,  -4,
     -4,   0,   4,   6,   6,   4,   0,  -4,
     -6,   0,   0,   2,   2,   0,   0,  -6,
    -12,  -6,  -4,  -4,  -4,  -4,  -6, -12,
];

#[rustfmt::skip]
const ROOK_MG: [i16; 64] = [
      2,   4,   6,   8,   8,   6,   4,   2,
     10,  12,  14,  16,  16,  14,  12,  10,
     -4,   0,   2,   4,   4,   2,   0,  -4,
     -6,  -2,   0,   2,   2,   0,  -2,  -6,
     -6,  -2,   0,   2,   2,   0,  -2,  -6,
     -6,  -2,   0,   2,   2,   0,  -2,  -6,
     -8,  -4,   0,   2,   2,   0,  -4,  -8,
     -4,  -2,   2,   6,   6,   2,  -2,  -4,
];

#[rustfmt::skip]
const ROOK_EG: [i16; 64] = [
      6,   6,   6,   6,   6,   6,   6,   6,
     10,  10,  10,  10,  10,  10,  10,  10,
      2,   2,   2,   2,   2,   2,   2,   2,
      0,   0,   0,   0,   0,   0,   0,   0,
      0,   0,   0,   0,   0,   0,   0,   0,
      0,   0,   0,   0,   0,   0,   0,   0,
     -2,  -2,  -2,  -2,  -2,  -2,  -2,  -2,
     -4,  -4,  -4,  -4,  -4,  -4,  -4,  -4,
];

#[rustfmt::skip]
const QUEEN_MG: [i16; 64] = [
    -12,  -6,  -4,  -2,  -2,  -4,  -6, -12,
     -6,   0,   2,   2,   2,   2,   0,  -6,
     -4,   2,   4,   4,   4,   4,   2,  -4,
     -2,   2,   4,   6,   6,   4,   2,  -2,
     -2,   2,   4,   6,   6,   4,   2,  -2,
     -4,   2,   4,   4,   4,   4,   2,  -4,
     -6,   0,   2,   2,   2,   2,   0,  -6,
    -12,  -6,  -4,  -2,  -2,  -4,  -6, -12,
];

#[rustfmt::skip]
const QUEEN_EG: [i16; 64] = [
    -16,  -8,  -6,  -4,  -4,  -6,  -8, -16,
     -8,  -2,   2,   4,   4,   2,  -2,  -8,
     -6,   2,   6,   8,   8,   6,   2,  -6,
     -4,   4,   8,  12,  12,   8,   4,  -4,
     -4,   4,   8,  12,  12,   8,   4,  -4,
     -6,   2,   6,   8,   8,   6,   2,  -6,
     -8,  -2,   2,   4,   4,   2,  -2,  -8,
    -16,  -8,  -6,  -4,  -4,  -6,  -8, -16,
];

const BASE_MG: [&[i16; 64]; 5] = [&PAWN_MG, &KNIGHT_MG, &BISHOP_MG, &ROOK_MG, &QUEEN_MG];
const BASE_EG: [&[i16; 64]; 5] = [&PAWN_EG, &KNIGHT_EG, &BISHOP_EG, &ROOK_EG, &QUEEN_EG];

/// Base tables are written rank 8 first for readability; `sq` here is from
/// the king owner's orientation (a1 = 0).
fn base(piece: usize, sq: usize) -> Entry {
    (BASE_MG[piece][sq ^ 56], BASE_EG[piece][sq ^ 56])
}

fn chebyshev(a: usize, b: usize) -> i16 {
    let df = (a as i16 % 8 - b as i16 % 8).abs();
    let dr = (a as i16 / 8 - b as i16 / 8).abs();
    df.max(dr)
}

/// Middlegame pressure of an enemy piece standing near the bucket's king.
const TROPISM_WEIGHT: [i16; 5] = [1, 2, 1, 2, 4];

fn build_tables() -> Box<[BucketTable; NUM_BUCKETS]> {
    let mut tables = vec![[[(0i16, 0i16); 64]; NUM_SLOTS]; NUM_BUCKETS];

    for bucket in 0..NUM_BUCKETS {
        let king_sq = (bucket / 4) * 8 + (bucket % 4);
        for piece in 0..5 {
            for sq in 0..64 {
                let dist = chebyshev(sq, king_sq);

                let mut own = base(piece, sq);
                if piece == 0 {
                    // pawn shield in front of the king
                    own.0 += match dist {
                        0 | 1 => 12,
                        2 => 6,
                        _ => 0,
                    };
                }

                // enemy slots hold only the king-pressure term; the piece's
                // positional shape is already counted by its own king's table
                let tropism = TROPISM_WEIGHT[piece] * (5 - dist).max(0);
                let enemy = (-tropism, 0);

                tables[bucket][2 * piece][sq] = own;
                tables[bucket][2 * piece + 1][sq] = enemy;
            }
        }
    }

    tables.into_boxed_slice().try_into().unwrap()
}

struct KingContext {
    white_bucket: usize,
    black_bucket: usize,
    white_mask: usize,
    black_mask: usize,
}

impl KingContext {
    fn of(pos: &Position) -> Self {
        let wk = pos.king_square(Color::White).to_index();
        let bk = pos.king_square(Color::Black).to_index();

        let white_mask = if wk % 8 >= 4 { 0b000_111 } else { 0 };
        let black_mask = if bk % 8 >= 4 { 0b111_111 } else { 0b111_000 };

        let wk_oriented = wk ^ white_mask;
        let bk_oriented = bk ^ black_mask;

        Self {
            white_bucket: (wk_oriented / 8) * 4 + (wk_oriented % 8),
            black_bucket: (bk_oriented / 8) * 4 + (bk_oriented % 8),
            white_mask,
            black_mask,
        }
    }
}

fn entry(bucket: usize, slot: usize, sq: usize) -> TaperedScore {
    let (mg, eg) = PSQT[bucket][slot][sq];
    TaperedScore::new(mg as i32, eg as i32)
}

const PSQT_PIECES: [Piece; 5] = [
    Piece::Pawn,
    Piece::Knight,
    Piece::Bishop,
    Piece::Rook,
    Piece::Queen,
];

/// Full recompute, white-relative.
pub fn compute_psqt(pos: &Position) -> TaperedScore {
    let ctx = KingContext::of(pos);
    let mut value = TaperedScore::default();

    for (p, &pc) in PSQT_PIECES.iter().enumerate() {
        for sq in pos.get(pc, Color::White) {
            let sq = sq.to_index();
            value += entry(ctx.white_bucket, 2 * p, sq ^ ctx.white_mask);
            value -= entry(ctx.black_bucket, 2 * p + 1, sq ^ ctx.black_mask);
        }
        for sq in pos.get(pc, Color::Black) {
            let sq = sq.to_index();
            value += entry(ctx.white_bucket, 2 * p + 1, sq ^ ctx.white_mask);
            value -= entry(ctx.black_bucket, 2 * p, sq ^ ctx.black_mask);
        }
    }

    value
}

/// Applies a move's dirty-piece set to the parent's PSQT sum. The values are
/// king-relative, so any king movement invalidates the carried sum; callers
/// get `None` and must recompute.
pub fn update_psqt(
    prev: TaperedScore,
    child: &Position,
    dirty: &DirtyList,
) -> Option<TaperedScore> {
    if dirty.iter().any(|d| d.pc == Piece::King) {
        return None;
    }

    let ctx = KingContext::of(child);
    let mut value = prev;

    for d in dirty.iter() {
        let p = d.pc.to_index();
        let color = if d.color == Color::White { 0 } else { 1 };
        let white_slot = 2 * p + color;
        let black_slot = 2 * p + (1 ^ color);

        if let Some(to) = d.to {
            let sq = to.to_index();
            value += entry(ctx.white_bucket, white_slot, sq ^ ctx.white_mask);
            value -= entry(ctx.black_bucket, black_slot, sq ^ ctx.black_mask);
        }
        if let Some(from) = d.from {
            let sq = from.to_index();
            value -= entry(ctx.white_bucket, white_slot, sq ^ ctx.white_mask);
            value += entry(ctx.black_bucket, black_slot, sq ^ ctx.black_mask);
        }
    }

    Some(value)
}
