
use super::history_update;
use crate::types::Score;

use chess::{ChessMove, Color};

/// `[color][from][to]` counters biasing quiet-move ordering.
#[derive(Debug, Clone)]
pub struct ButterflyHistory {
    buf: Box<[[[Score; 64]; 64]; 2]>,
}

impl Default for ButterflyHistory {
    fn default() -> Self {
        Self {
            buf: Box::new([[[0; 64]; 64]; 2]),
        }
    }
}

impl ButterflyHistory {
    pub fn get(&self, side: Color, mv: ChessMove) -> Score {
        self.buf[side.to_index()][mv.get_source().to_index()][mv.get_dest().to_index()]
    }

    pub fn update(&mut self, side: Color, mv: ChessMove, bonus: Score) {
        let entry = &mut self.buf[side.to_index()][mv.get_source().to_index()]
            [mv.get_dest().to_index()];
        history_update(entry, bonus);
    }

    /// Age rather than forget: keeps ordering quality across searches.
    pub fn decay(&mut self) {
        for side in self.buf.iter_mut() {
            for from in side.iter_mut() {
                for entry in from.iter_mut() {
                    *entry /= 2;
                }
            }
        }
    }
}
