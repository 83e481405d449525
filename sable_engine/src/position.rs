
use crate::types::*;

use arrayvec::ArrayVec;
use chess::{
    BitBoard, Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Square, EMPTY,
};
use std::str::FromStr;

pub const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum MoveGenFilter {
    All,
    CapturesOnly,
}

/// One piece added to or removed from the board by a move. `from == None`
/// means the piece appeared (promotion), `to == None` that it vanished
/// (capture victim, promoting pawn).
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct DirtyPiece {
    pub pc: Piece,
    pub color: Color,
    pub from: Option<Square>,
    pub to: Option<Square>,
}

pub type DirtyList = ArrayVec<DirtyPiece, 4>;

pub type MoveList = ArrayVec<ChessMove, 256>;

/// Value-type position: the external `chess` board plus the clocks the
/// search needs. Copied freely down the tree, never mutated in place.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct Position {
    pub board: Board,
    pub halfmove_clock: u16,
    pub game_ply: u16,
}

/// New
impl Position {
    pub fn startpos() -> Self {
        Self {
            board: Board::default(),
            halfmove_clock: 0,
            game_ply: 0,
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, chess::Error> {
        let board = Board::from_str(fen)?;
        let mut fields = fen.split_whitespace();
        let halfmove_clock = fields.nth(4).and_then(|s| s.parse().ok()).unwrap_or(0);
        let fullmove: u16 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(1);
        let game_ply = 2 * fullmove.saturating_sub(1)
            + if board.side_to_move() == Color::Black { 1 } else { 0 };
        Ok(Self {
            board,
            halfmove_clock,
            game_ply,
        })
    }
}

/// Accessors
impl Position {
    pub fn hash(&self) -> u64 {
        self.board.get_hash()
    }

    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    pub fn num_pieces(&self) -> u32 {
        self.board.combined().popcnt()
    }

    pub fn halfmove_count(&self) -> u16 {
        self.halfmove_clock
    }

    pub fn in_check(&self) -> bool {
        *self.board.checkers() != EMPTY
    }

    pub fn occupied(&self) -> BitBoard {
        *self.board.combined()
    }

    pub fn colored(&self, color: Color) -> BitBoard {
        *self.board.color_combined(color)
    }

    pub fn get(&self, pc: Piece, color: Color) -> BitBoard {
        *self.board.pieces(pc) & *self.board.color_combined(color)
    }

    pub fn king_square(&self, color: Color) -> Square {
        self.board.king_square(color)
    }

    pub fn piece_at(&self, sq: Square) -> Option<(Piece, Color)> {
        let pc = self.board.piece_on(sq)?;
        let color = self.board.color_on(sq)?;
        Some((pc, color))
    }

    pub fn status(&self) -> BoardStatus {
        self.board.status()
    }

    pub fn move_is_legal(&self, mv: ChessMove) -> bool {
        self.board.legal(mv)
    }

    /// A root sanity check: the side that just moved must not have left its
    /// king capturable.
    pub fn is_legal_position(&self) -> bool {
        let stm = self.side_to_move();
        let opp_king = self.king_square(!stm);
        let occ = self.occupied();
        let bq = self.get(Piece::Bishop, stm) | self.get(Piece::Queen, stm);
        let rq = self.get(Piece::Rook, stm) | self.get(Piece::Queen, stm);

        let attacked = (chess::get_pawn_attacks(opp_king, !stm, !EMPTY)
            & self.get(Piece::Pawn, stm))
            != EMPTY
            || (chess::get_knight_moves(opp_king) & self.get(Piece::Knight, stm)) != EMPTY
            || (chess::get_king_moves(opp_king) & self.get(Piece::King, stm)) != EMPTY
            || (chess::get_bishop_moves(opp_king, occ) & bq) != EMPTY
            || (chess::get_rook_moves(opp_king, occ) & rq) != EMPTY;
        !attacked
    }
}

/// Move properties
impl Position {
    pub fn moved_piece(&self, mv: ChessMove) -> Piece {
        self.board.piece_on(mv.get_source()).unwrap_or(Piece::Pawn)
    }

    pub fn is_en_passant(&self, mv: ChessMove) -> bool {
        self.board.piece_on(mv.get_source()) == Some(Piece::Pawn)
            && mv.get_source().get_file() != mv.get_dest().get_file()
            && self.board.piece_on(mv.get_dest()).is_none()
    }

    pub fn is_capture(&self, mv: ChessMove) -> bool {
        self.board.piece_on(mv.get_dest()).is_some() || self.is_en_passant(mv)
    }

    pub fn captured_piece(&self, mv: ChessMove) -> Option<Piece> {
        if let Some(pc) = self.board.piece_on(mv.get_dest()) {
            Some(pc)
        } else if self.is_en_passant(mv) {
            Some(Piece::Pawn)
        } else {
            None
        }
    }

    pub fn is_quiet(&self, mv: ChessMove) -> bool {
        !self.is_capture(mv) && mv.get_promotion().is_none()
    }

    fn is_castle(&self, mv: ChessMove) -> bool {
        self.board.piece_on(mv.get_source()) == Some(Piece::King)
            && (mv.get_source().get_file().to_index() as i32
                - mv.get_dest().get_file().to_index() as i32)
                .abs()
                == 2
    }
}

/// Making moves
impl Position {
    /// Legal move generation. `CapturesOnly` covers normal captures, en
    /// passant and capture-promotions; quiet promotions are appended so the
    /// quiescence search sees them too.
    pub fn generate_moves(&self, filter: MoveGenFilter) -> MoveList {
        let mut out = MoveList::new();
        let mut gen = MoveGen::new_legal(&self.board);
        match filter {
            MoveGenFilter::All => {
                for mv in gen {
                    out.push(mv);
                }
            }
            MoveGenFilter::CapturesOnly => {
                let stm = self.side_to_move();
                let mut targets = self.colored(!stm);
                if let Some(ep_pawn) = self.board.en_passant() {
                    // en_passant() is the victim pawn's square, the capture
                    // lands on the empty square behind it
                    targets |= BitBoard::from_square(shift_square(ep_pawn, stm));
                }
                gen.set_iterator_mask(targets);
                for mv in &mut gen {
                    out.push(mv);
                }
                gen.set_iterator_mask(!EMPTY);
                for mv in gen {
                    if mv.get_promotion().is_some() {
                        out.push(mv);
                    }
                }
            }
        }
        out
    }

    /// Produces the child position plus the dirty-piece set describing the
    /// board delta, for incremental PSQT/accumulator updates.
    pub fn do_move(&self, mv: ChessMove) -> (Position, DirtyList) {
        let stm = self.side_to_move();
        let from = mv.get_source();
        let to = mv.get_dest();
        let pc = self.moved_piece(mv);

        let mut dirty = DirtyList::new();

        if let Some(victim) = self.board.piece_on(to) {
            dirty.push(DirtyPiece {
                pc: victim,
                color: !stm,
                from: Some(to),
                to: None,
            });
        } else if self.is_en_passant(mv) {
            dirty.push(DirtyPiece {
                pc: Piece::Pawn,
                color: !stm,
                from: Some(shift_square(to, !stm)),
                to: None,
            });
        }

        if let Some(promo) = mv.get_promotion() {
            dirty.push(DirtyPiece {
                pc: Piece::Pawn,
                color: stm,
                from: Some(from),
                to: None,
            });
            dirty.push(DirtyPiece {
                pc: promo,
                color: stm,
                from: None,
                to: Some(to),
            });
        } else {
            dirty.push(DirtyPiece {
                pc,
                color: stm,
                from: Some(from),
                to: Some(to),
            });
            if self.is_castle(mv) {
                let (rook_from, rook_to) = rook_castle_squares(from, to);
                dirty.push(DirtyPiece {
                    pc: Piece::Rook,
                    color: stm,
                    from: Some(rook_from),
                    to: Some(rook_to),
                });
            }
        }

        let resets_clock = pc == Piece::Pawn || self.is_capture(mv);
        let child = Position {
            board: self.board.make_move_new(mv),
            halfmove_clock: if resets_clock {
                0
            } else {
                self.halfmove_clock + 1
            },
            game_ply: self.game_ply + 1,
        };

        (child, dirty)
    }

    /// Flip the side to move. Not available while in check.
    pub fn do_null_move(&self) -> Option<Position> {
        let board = self.board.null_move()?;
        Some(Position {
            board,
            halfmove_clock: self.halfmove_clock + 1,
            game_ply: self.game_ply + 1,
        })
    }
}

/// One rank toward `color`'s side of the board. Callers guarantee the result
/// stays on the board.
fn shift_square(sq: Square, color: Color) -> Square {
    let idx = sq.to_index() as i32 + if color == Color::White { 8 } else { -8 };
    unsafe { Square::new(idx as u8) }
}

fn rook_castle_squares(king_from: Square, king_to: Square) -> (Square, Square) {
    let kingside = king_to.get_file().to_index() > king_from.get_file().to_index();
    let base = king_from.to_index() as u8 & 0b111000;
    if kingside {
        unsafe { (Square::new(base + 7), Square::new(base + 5)) }
    } else {
        unsafe { (Square::new(base), Square::new(base + 3)) }
    }
}

/// Draw detection
impl Position {
    pub fn is_fifty_move_draw(&self) -> bool {
        self.halfmove_clock >= 100
    }

    /// KvK, KNvK, KBvK and KBvKB with same-coloured bishops.
    pub fn is_insufficient_material(&self) -> bool {
        let heavy = *self.board.pieces(Piece::Queen)
            | *self.board.pieces(Piece::Rook)
            | *self.board.pieces(Piece::Pawn);
        if heavy != EMPTY {
            return false;
        }

        let wn = self.get(Piece::Knight, Color::White).popcnt();
        let bn = self.get(Piece::Knight, Color::Black).popcnt();
        let wb = self.get(Piece::Bishop, Color::White);
        let bb = self.get(Piece::Bishop, Color::Black);

        if wn == 0 && bn == 0 {
            if (wb == EMPTY && bb.popcnt() <= 1) || (wb.popcnt() <= 1 && bb == EMPTY) {
                return true;
            }
            if wb.popcnt() == 1 && bb.popcnt() == 1 {
                let light = light_squares();
                return ((wb & light) != EMPTY) == ((bb & light) != EMPTY);
            }
        }

        if wb == EMPTY && bb == EMPTY {
            if (wn == 0 && bn <= 1) || (wn <= 1 && bn == 0) {
                return true;
            }
        }

        false
    }
}

pub fn light_squares() -> BitBoard {
    BitBoard::new(0x55aa_55aa_55aa_55aa)
}

pub fn dark_squares() -> BitBoard {
    !light_squares()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startpos_basics() {
        let pos = Position::startpos();
        assert_eq!(pos.num_pieces(), 32);
        assert_eq!(pos.halfmove_count(), 0);
        assert!(!pos.in_check());
        assert_eq!(pos.generate_moves(MoveGenFilter::All).len(), 20);
        assert_eq!(pos.generate_moves(MoveGenFilter::CapturesOnly).len(), 0);
    }

    #[test]
    fn fen_halfmove_clock_parsed() {
        let pos = Position::from_fen("8/8/8/4k3/8/4K3/8/8 w - - 37 60").unwrap();
        assert_eq!(pos.halfmove_count(), 37);
        assert!(!pos.is_fifty_move_draw());
        let pos = Position::from_fen("8/8/8/4k3/8/4K3/8/8 w - - 100 80").unwrap();
        assert!(pos.is_fifty_move_draw());
    }

    #[test]
    fn do_move_dirty_pieces() {
        let pos = Position::startpos();
        let mv = ChessMove::from_san(&pos.board, "e4").unwrap();
        let (child, dirty) = pos.do_move(mv);
        assert_eq!(child.side_to_move(), Color::Black);
        assert_eq!(child.halfmove_clock, 0);
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].pc, Piece::Pawn);
        assert_eq!(dirty[0].from, Some(mv.get_source()));
        assert_eq!(dirty[0].to, Some(mv.get_dest()));

        // knight move bumps the clock
        let mv = ChessMove::from_san(&pos.board, "Nf3").unwrap();
        let (child, _) = pos.do_move(mv);
        assert_eq!(child.halfmove_clock, 1);
    }

    #[test]
    fn en_passant_capture_is_generated_and_dirty() {
        let pos =
            Position::from_fen("rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3")
                .unwrap();
        let caps = pos.generate_moves(MoveGenFilter::CapturesOnly);
        let ep = caps.iter().find(|mv| pos.is_en_passant(**mv)).copied();
        let ep = ep.expect("en passant capture missing");
        let (_, dirty) = pos.do_move(ep);
        assert_eq!(dirty.len(), 2);
        assert!(dirty
            .iter()
            .any(|d| d.pc == Piece::Pawn && d.color == Color::Black && d.to.is_none()));
    }

    #[test]
    fn castle_dirty_includes_rook() {
        let pos =
            Position::from_fen("r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4")
                .unwrap();
        let castle = ChessMove::from_san(&pos.board, "O-O").unwrap();
        let (_, dirty) = pos.do_move(castle);
        assert_eq!(dirty.len(), 2);
        assert!(dirty.iter().any(|d| d.pc == Piece::Rook));
        assert!(dirty.iter().any(|d| d.pc == Piece::King));
    }

    #[test]
    fn quiet_promotions_included_in_captures_filter() {
        let pos = Position::from_fen("3k4/6P1/8/8/8/8/8/3K4 w - - 0 1").unwrap();
        let caps = pos.generate_moves(MoveGenFilter::CapturesOnly);
        assert!(caps
            .iter()
            .any(|mv| mv.get_promotion() == Some(Piece::Queen)));
    }

    #[test]
    fn insufficient_material_cases() {
        for (fen, expect) in [
            ("8/8/8/4k3/8/4K3/8/8 w - - 0 1", true),
            ("8/8/8/4k3/8/4KN2/8/8 w - - 0 1", true),
            ("8/8/8/4k3/8/4KB2/8/8 w - - 0 1", true),
            // same-coloured bishops
            ("8/8/2b5/4k3/8/4KB2/8/8 w - - 0 1", true),
            ("8/8/8/4k3/8/4KP2/8/8 w - - 0 1", false),
            ("8/8/8/4k3/8/3NKN2/8/8 w - - 0 1", false),
        ] {
            let pos = Position::from_fen(fen).unwrap();
            assert_eq!(pos.is_insufficient_material(), expect, "{}", fen);
        }
    }
}
