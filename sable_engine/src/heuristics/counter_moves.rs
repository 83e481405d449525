
use chess::{ChessMove, Color, Piece};

/// Refutation move indexed by the previous move's piece and target square.
#[derive(Debug, Clone)]
pub struct CounterMoves {
    buf: Box<[[[Option<ChessMove>; 64]; 6]; 2]>,
}

impl Default for CounterMoves {
    fn default() -> Self {
        Self {
            buf: Box::new([[[None; 64]; 6]; 2]),
        }
    }
}

impl CounterMoves {
    pub fn insert(&mut self, side: Color, prev_piece: Piece, prev_to: chess::Square, mv: ChessMove) {
        self.buf[side.to_index()][prev_piece.to_index()][prev_to.to_index()] = Some(mv);
    }

    pub fn get(&self, side: Color, prev_piece: Piece, prev_to: chess::Square) -> Option<ChessMove> {
        self.buf[side.to_index()][prev_piece.to_index()][prev_to.to_index()]
    }

    pub fn clear(&mut self) {
        for side in self.buf.iter_mut() {
            for pc in side.iter_mut() {
                pc.fill(None);
            }
        }
    }
}
