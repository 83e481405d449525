
use super::history_update;
use crate::types::Score;

use chess::{Piece, Square};

/// `[attacker piece][captured piece][to]` history for capture ordering.
#[derive(Debug, Clone)]
pub struct CaptureHistory {
    buf: Box<[[[Score; 64]; 6]; 6]>,
}

impl Default for CaptureHistory {
    fn default() -> Self {
        Self {
            buf: Box::new([[[0; 64]; 6]; 6]),
        }
    }
}

impl CaptureHistory {
    pub fn get(&self, pc: Piece, victim: Piece, to: Square) -> Score {
        self.buf[pc.to_index()][victim.to_index()][to.to_index()]
    }

    pub fn update(&mut self, pc: Piece, victim: Piece, to: Square, bonus: Score) {
        let entry = &mut self.buf[pc.to_index()][victim.to_index()][to.to_index()];
        history_update(entry, bonus);
    }

    pub fn decay(&mut self) {
        for pc in self.buf.iter_mut() {
            for victim in pc.iter_mut() {
                for entry in victim.iter_mut() {
                    *entry /= 2;
                }
            }
        }
    }
}
