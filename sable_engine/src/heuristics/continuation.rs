
use super::history_update;
use crate::types::Score;

use chess::{Piece, Square};

/// Follow-up history keyed by the previous move's (piece, to) pair: rewards
/// quiet moves that tend to work right after a particular opponent move.
#[derive(Debug, Clone)]
pub struct ContinuationHistory {
    buf: Box<[[[[Score; 64]; 6]; 64]; 6]>,
}

impl Default for ContinuationHistory {
    fn default() -> Self {
        // 6 * 64 * 6 * 64 entries, far too large for the stack
        let buf = vec![[[[0; 64]; 6]; 64]; 6].into_boxed_slice();
        let buf: Box<[[[[Score; 64]; 6]; 64]; 6]> = buf.try_into().unwrap();
        Self { buf }
    }
}

impl ContinuationHistory {
    pub fn get(&self, prev_piece: Piece, prev_to: Square, pc: Piece, to: Square) -> Score {
        self.buf[prev_piece.to_index()][prev_to.to_index()][pc.to_index()][to.to_index()]
    }

    pub fn update(
        &mut self,
        prev_piece: Piece,
        prev_to: Square,
        pc: Piece,
        to: Square,
        bonus: Score,
    ) {
        let entry = &mut self.buf[prev_piece.to_index()][prev_to.to_index()][pc.to_index()]
            [to.to_index()];
        history_update(entry, bonus);
    }

    pub fn decay(&mut self) {
        for a in self.buf.iter_mut() {
            for b in a.iter_mut() {
                for c in b.iter_mut() {
                    for entry in c.iter_mut() {
                        *entry /= 2;
                    }
                }
            }
        }
    }
}
