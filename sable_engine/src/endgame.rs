
use crate::evaluate::ENDGAME_SCALE_MAX;
use crate::position::{dark_squares, light_squares, Position};
use crate::see::piece_value;
use crate::types::*;

use chess::{Color, Piece, Square, EMPTY};

pub mod helpers {
    use super::*;

    fn edge_distance(rank_or_file: i32) -> i32 {
        rank_or_file.min(7 - rank_or_file)
    }

    pub fn push_king_to_edge(ksq: Square) -> Score {
        let fd = edge_distance(ksq.get_file().to_index() as i32);
        let rd = edge_distance(ksq.get_rank().to_index() as i32);
        90 - (7 * fd * fd / 2 + 7 * rd * rd / 2)
    }

    pub fn push_close(a: Square, b: Square) -> Score {
        let df = (a.get_file().to_index() as i32 - b.get_file().to_index() as i32).abs();
        let dr = (a.get_rank().to_index() as i32 - b.get_rank().to_index() as i32).abs();
        140 - 20 * df.max(dr)
    }
}

use self::helpers::*;

fn non_pawn_material(pos: &Position, color: Color) -> Score {
    [Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen]
        .iter()
        .map(|&pc| pos.get(pc, color).popcnt() as Score * piece_value(pc))
        .sum()
}

fn has_only_king(pos: &Position, color: Color) -> bool {
    pos.colored(color).popcnt() == 1
}

/// KQ/KR/KBB/KBN against a bare king force mate; two knights or a lone
/// minor do not.
fn has_mating_material(pos: &Position, color: Color) -> bool {
    if pos.get(Piece::Queen, color) != EMPTY || pos.get(Piece::Rook, color) != EMPTY {
        return true;
    }
    let bishops = pos.get(Piece::Bishop, color);
    let pair =
        (bishops & light_squares()) != EMPTY && (bishops & dark_squares()) != EMPTY;
    if pair {
        return true;
    }
    bishops != EMPTY && pos.get(Piece::Knight, color) != EMPTY
}

/// Definite score for trivially decided low-piece positions, white-relative.
/// `None` means the position still has to be searched.
pub fn evaluate_endgame(pos: &Position) -> Option<Score> {
    if pos.is_insufficient_material() {
        return Some(DRAW_VALUE);
    }

    for (strong, sign) in [(Color::White, 1), (Color::Black, -1)] {
        let weak = !strong;
        if !has_only_king(pos, weak) || pos.get(Piece::Pawn, strong) != EMPTY {
            continue;
        }
        if !has_mating_material(pos, strong) {
            // lone minors or two knights cannot force mate
            if pos.get(Piece::Queen, strong) == EMPTY
                && pos.get(Piece::Rook, strong) == EMPTY
                && pos.get(Piece::Knight, strong).popcnt() <= 2
                && pos.get(Piece::Bishop, strong).popcnt() <= 1
            {
                return Some(DRAW_VALUE);
            }
            continue;
        }

        let score = KNOWN_WIN_VALUE
            + non_pawn_material(pos, strong)
            + push_king_to_edge(pos.king_square(weak))
            + push_close(pos.king_square(strong), pos.king_square(weak));
        return Some(sign * score);
    }

    None
}

/// Drawish-material damping in `[0, ENDGAME_SCALE_MAX]`.
pub fn endgame_scale(pos: &Position) -> Score {
    let wb = pos.get(Piece::Bishop, Color::White);
    let bb = pos.get(Piece::Bishop, Color::Black);

    // opposite-coloured bishops with no other pieces
    let only_bishops = non_pawn_material(pos, Color::White) == piece_value(Piece::Bishop)
        && non_pawn_material(pos, Color::Black) == piece_value(Piece::Bishop);
    if only_bishops && wb.popcnt() == 1 && bb.popcnt() == 1 {
        let opposite =
            ((wb & light_squares()) != EMPTY) != ((bb & light_squares()) != EMPTY);
        if opposite {
            return ENDGAME_SCALE_MAX / 2;
        }
    }

    // a pawnless material edge of at most a minor piece is hard to convert
    let w = non_pawn_material(pos, Color::White);
    let b = non_pawn_material(pos, Color::Black);
    let (strong, lead) = if w >= b {
        (Color::White, w - b)
    } else {
        (Color::Black, b - w)
    };
    if pos.get(Piece::Pawn, strong) == EMPTY && lead <= piece_value(Piece::Bishop) {
        return ENDGAME_SCALE_MAX / 8;
    }

    ENDGAME_SCALE_MAX
}
