
use crate::endgame;
use crate::position::{dark_squares, light_squares, Position};
use crate::psqt;
use crate::types::*;

use chess::{BitBoard, Color, Piece, EMPTY};

pub const ENDGAME_SCALE_MAX: Score = 128;

const EVAL_SATURATION_THRESHOLD: Score = 8000;

/// Below `NN_THRESHOLD_MIN` the network output is used purely, above
/// `NN_THRESHOLD_MAX` not at all; in between the two evals blend linearly.
pub const NN_THRESHOLD_MIN: Score = 768;
pub const NN_THRESHOLD_MAX: Score = 1024;

/// 400/ln(10), converts the network's logistic output into centipawns.
pub const NN_OUTPUT_TO_CENTIPAWNS: Score = 174;

#[derive(Debug, Default, Eq, PartialEq, PartialOrd, Clone, Copy)]
pub struct TaperedScore {
    pub mid: Score,
    pub end: Score,
}

impl TaperedScore {
    pub const fn new(mid: Score, end: Score) -> Self {
        Self { mid, end }
    }

    pub fn taper(self, phase: Score) -> Score {
        interpolate(phase, self)
    }
}

impl std::ops::Add for TaperedScore {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self::new(self.mid + other.mid, self.end + other.end)
    }
}

impl std::ops::AddAssign for TaperedScore {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl std::ops::Sub for TaperedScore {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self::new(self.mid - other.mid, self.end - other.end)
    }
}

impl std::ops::SubAssign for TaperedScore {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl std::ops::Neg for TaperedScore {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.mid, -self.end)
    }
}

impl std::ops::Mul<Score> for TaperedScore {
    type Output = Self;
    fn mul(self, k: Score) -> Self {
        Self::new(self.mid * k, self.end * k)
    }
}

const fn ts(mid: Score, end: Score) -> TaperedScore {
    TaperedScore::new(mid, end)
}

pub const PAWN_VALUE: TaperedScore = ts(97, 166);
pub const KNIGHT_VALUE: TaperedScore = ts(455, 371);
pub const BISHOP_VALUE: TaperedScore = ts(494, 385);
pub const ROOK_VALUE: TaperedScore = ts(607, 656);
pub const QUEEN_VALUE: TaperedScore = ts(1427, 1086);

pub const PIECE_VALUES: [TaperedScore; 6] = [
    PAWN_VALUE,
    KNIGHT_VALUE,
    BISHOP_VALUE,
    ROOK_VALUE,
    QUEEN_VALUE,
    ts(0, 0),
];

const TEMPO_BONUS: TaperedScore = ts(2, 2);
const BISHOP_PAIR_BONUS: TaperedScore = ts(33, 63);

const KNIGHT_MOBILITY: [TaperedScore; 9] = [
    ts(-28, -112), ts(-14, -39), ts(-8, -5), ts(-2, 12), ts(3, 22),
    ts(5, 34), ts(14, 32), ts(21, 28), ts(27, 17),
];

const BISHOP_MOBILITY: [TaperedScore; 14] = [
    ts(-29, -105), ts(-22, -49), ts(-10, -29), ts(-6, -6), ts(-1, 2),
    ts(0, 8), ts(4, 16), ts(10, 22), ts(12, 20), ts(17, 22),
    ts(25, 14), ts(36, 18), ts(32, 20), ts(37, 17),
];

const ROOK_MOBILITY: [TaperedScore; 15] = [
    ts(-28, -75), ts(-21, -39), ts(-17, -21), ts(-13, -14), ts(-15, 4),
    ts(-10, 7), ts(-4, 17), ts(1, 14), ts(3, 13), ts(8, 17),
    ts(15, 20), ts(27, 15), ts(36, 11), ts(41, 1), ts(75, -16),
];

const QUEEN_MOBILITY: [TaperedScore; 28] = [
    ts(-34, -70), ts(-23, -80), ts(-16, -78), ts(-13, -72), ts(-10, -56),
    ts(-7, -44), ts(-7, -22), ts(-3, -21), ts(-5, -11), ts(0, 6),
    ts(1, 10), ts(2, 20), ts(0, 26), ts(0, 32), ts(2, 40),
    ts(5, 38), ts(4, 33), ts(8, 34), ts(19, 35), ts(28, 32),
    ts(34, 16), ts(45, 11), ts(40, 17), ts(35, 10), ts(31, 9),
    ts(28, 3), ts(25, 6), ts(20, 1),
];

/// 0 = bare kings, 64 = full opening material.
pub fn game_phase(pos: &Position) -> Score {
    let count = |pc: Piece| {
        (pos.get(pc, Color::White).popcnt() + pos.get(pc, Color::Black).popcnt()) as Score
    };
    let phase = count(Piece::Pawn)
        + 2 * count(Piece::Knight)
        + 2 * count(Piece::Bishop)
        + 4 * count(Piece::Rook)
        + 8 * count(Piece::Queen);
    phase.min(64)
}

pub fn interpolate(phase: Score, score: TaperedScore) -> Score {
    let mg = phase.min(64);
    let eg = 64 - mg;
    (score.mid * mg + score.end * eg) / 64
}

fn pawn_attacks(pos: &Position, color: Color) -> BitBoard {
    let mut out = EMPTY;
    for sq in pos.get(Piece::Pawn, color) {
        out |= chess::get_pawn_attacks(sq, color, !EMPTY);
    }
    out
}

fn knight_attacks(bb: BitBoard) -> BitBoard {
    let mut out = EMPTY;
    for sq in bb {
        out |= chess::get_knight_moves(sq);
    }
    out
}

fn mobility_for(pos: &Position, color: Color) -> TaperedScore {
    let occ = pos.occupied();
    let own = pos.colored(color);
    let enemy_pawn_attacks = pawn_attacks(pos, !color);
    let enemy_knight_attacks = knight_attacks(pos.get(Piece::Knight, !color));

    let minors_area = !own & !enemy_pawn_attacks;
    let majors_area = minors_area & !enemy_knight_attacks;

    let mut value = TaperedScore::default();
    for sq in pos.get(Piece::Knight, color) {
        value += KNIGHT_MOBILITY[(chess::get_knight_moves(sq) & minors_area).popcnt() as usize];
    }
    for sq in pos.get(Piece::Bishop, color) {
        value += BISHOP_MOBILITY[(chess::get_bishop_moves(sq, occ) & minors_area).popcnt() as usize];
    }
    for sq in pos.get(Piece::Rook, color) {
        value += ROOK_MOBILITY[(chess::get_rook_moves(sq, occ) & majors_area).popcnt() as usize];
    }
    for sq in pos.get(Piece::Queen, color) {
        let attacks = chess::get_rook_moves(sq, occ) | chess::get_bishop_moves(sq, occ);
        value += QUEEN_MOBILITY[(attacks & majors_area).popcnt() as usize];
    }
    value
}

fn evaluate_mobility(pos: &Position) -> TaperedScore {
    mobility_for(pos, Color::White) - mobility_for(pos, Color::Black)
}

fn has_bishop_pair(pos: &Position, color: Color) -> bool {
    let bishops = pos.get(Piece::Bishop, color);
    (bishops & light_squares()) != EMPTY && (bishops & dark_squares()) != EMPTY
}

/// Side-to-move-relative leaf evaluation.
///
/// `psqt_hint` is the incrementally maintained king-bucketed PSQT sum, if the
/// caller carries one. `nn_eval` is invoked lazily for balanced positions and
/// must return a white-relative centipawn score from the network.
pub fn evaluate<F>(pos: &Position, psqt_hint: Option<TaperedScore>, nn_eval: F) -> Score
where
    F: FnOnce() -> Option<Score>,
{
    let mut scale = ENDGAME_SCALE_MAX;

    if pos.num_pieces() <= 6 {
        if let Some(score) = endgame::evaluate_endgame(pos) {
            let score = score.clamp(-TB_WIN_VALUE + 1, TB_WIN_VALUE - 1);
            return if pos.side_to_move() == Color::White {
                score
            } else {
                -score
            };
        }
        scale = endgame::endgame_scale(pos);
    }

    let mut value = match psqt_hint {
        Some(v) => v,
        None => psqt::compute_psqt(pos),
    };

    for pc in [
        Piece::Pawn,
        Piece::Knight,
        Piece::Bishop,
        Piece::Rook,
        Piece::Queen,
    ] {
        let diff = pos.get(pc, Color::White).popcnt() as Score
            - pos.get(pc, Color::Black).popcnt() as Score;
        value += PIECE_VALUES[pc.to_index()] * diff;
    }

    if pos.side_to_move() == Color::White {
        value += TEMPO_BONUS;
    } else {
        value -= TEMPO_BONUS;
    }

    if has_bishop_pair(pos, Color::White) {
        value += BISHOP_PAIR_BONUS;
    }
    if has_bishop_pair(pos, Color::Black) {
        value -= BISHOP_PAIR_BONUS;
    }

    value += evaluate_mobility(pos);

    let mut final_value = interpolate(game_phase(pos), value);

    // blend in the network for balanced positions
    if final_value.abs() < NN_THRESHOLD_MAX {
        if let Some(nn_value) = nn_eval() {
            let blend_range = NN_THRESHOLD_MAX - NN_THRESHOLD_MIN;
            let factor = Score::max(0, final_value.abs() - NN_THRESHOLD_MIN);
            final_value =
                (factor * final_value + nn_value * (blend_range - factor)) / blend_range;
        }
    }

    if final_value > EVAL_SATURATION_THRESHOLD {
        final_value = EVAL_SATURATION_THRESHOLD + (final_value - EVAL_SATURATION_THRESHOLD) / 8;
    } else if final_value < -EVAL_SATURATION_THRESHOLD {
        final_value = -EVAL_SATURATION_THRESHOLD - (-EVAL_SATURATION_THRESHOLD - final_value) / 8;
    }

    final_value = final_value * scale / ENDGAME_SCALE_MAX;
    final_value = final_value.clamp(-KNOWN_WIN_VALUE + 1, KNOWN_WIN_VALUE - 1);

    if pos.side_to_move() == Color::White {
        final_value
    } else {
        -final_value
    }
}

/// Raw network output (logistic space, `OUTPUT_SCALE` units) to centipawns.
pub fn nn_to_centipawns(raw: Score, output_scale: Score) -> Score {
    (raw * NN_OUTPUT_TO_CENTIPAWNS + output_scale / 2) / output_scale
}

/// Eval (in pawns) to win probability, for WDL-style reporting. The model
/// gets slightly more decisive as the game goes on.
pub fn eval_to_win_probability(eval: f32, ply: u32) -> f32 {
    let a = 2.0 + ply as f32 / 240.0;
    let b = 0.5;
    1.0 / (1.0 + ((a - eval) / b).exp())
}

pub fn eval_to_draw_probability(eval: f32, ply: u32) -> f32 {
    let win = eval_to_win_probability(eval, ply);
    let loss = eval_to_win_probability(-eval, ply);
    (1.0 - win - loss).max(0.0)
}

/// Eval (in pawns) to expected game score in `[0, 1]`.
pub fn eval_to_expected_game_score(eval: f32) -> f32 {
    1.0 / (1.0 + 10f32.powf(-eval / 4.0))
}

pub fn internal_eval_to_expected_game_score(eval: Score) -> f32 {
    eval_to_expected_game_score(eval as f32 * 0.01)
}


#[cfg(test)]
mod tests {
    use super::test_util::mirror_fen;
    use super::*;
    use crate::position::Position;

    fn eval_no_nn(pos: &Position) -> Score {
        evaluate(pos, None, || None)
    }

    #[test]
    fn startpos_is_balanced() {
        let pos = Position::startpos();
        let v = eval_no_nn(&pos);
        assert!(v.abs() <= 50, "startpos eval {}", v);
    }

    #[test]
    fn material_advantage_shows() {
        // white is a queen up
        let pos =
            Position::from_fen("rnb1kbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1").unwrap();
        assert!(eval_no_nn(&pos) > 500);
        // and from black's perspective it is bad
        let pos =
            Position::from_fen("rnb1kbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1").unwrap();
        assert!(eval_no_nn(&pos) < -500);
    }

    #[test]
    fn stm_relative_symmetry() {
        for fen in [
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3",
            "1k1r4/pp1b1R2/3q2pp/4p3/2B5/4Q3/PPP2B1P/2K5 b - - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        ] {
            let pos = Position::from_fen(fen).unwrap();
            let mirrored = Position::from_fen(&mirror_fen(fen)).unwrap();
            assert_eq!(
                eval_no_nn(&pos),
                eval_no_nn(&mirrored),
                "asymmetric eval for {}",
                fen
            );
        }
    }

    #[test]
    fn phase_bounds() {
        assert_eq!(game_phase(&Position::startpos()), 64);
        let kk = Position::from_fen("8/8/8/4k3/8/4K3/8/8 w - - 0 1").unwrap();
        assert_eq!(game_phase(&kk), 0);
    }

    #[test]
    fn evaluator_output_is_bounded() {
        // seven queens against a bare king saturate rather than overflowing
        let pos = Position::from_fen("KQQQQQ2/QQ6/8/8/8/8/8/6k1 b - - 0 1").unwrap();
        let v = eval_no_nn(&pos);
        assert!(v < -5000, "saturation failed: {}", v);
        assert!(v > -KNOWN_WIN_VALUE);
    }

    #[test]
    fn probability_model_shape() {
        // a dead-equal position is mostly a draw, a queen up mostly a win
        assert!(eval_to_draw_probability(0.0, 40) > 0.9);
        assert!(eval_to_win_probability(9.0, 40) > 0.9);
        assert!(eval_to_win_probability(-9.0, 40) < 0.1);

        assert!((eval_to_expected_game_score(0.0) - 0.5).abs() < 1e-6);
        assert!(internal_eval_to_expected_game_score(400) > 0.85);
        assert!(internal_eval_to_expected_game_score(-400) < 0.15);
    }

    #[test]
    fn blending_moves_eval_toward_network() {
        let pos = Position::startpos();
        let plain = eval_no_nn(&pos);
        let with_nn = evaluate(&pos, None, || Some(300));
        assert!(with_nn > plain);
        assert!(with_nn <= 300 + plain.abs());
    }
}
