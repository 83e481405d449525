
use crate::types::MAX_PLY;

use chess::ChessMove;

/// Two quiet cutoff moves per ply, most recent first.
#[derive(Debug, Clone)]
pub struct KillerMoves {
    buf: Box<[[Option<ChessMove>; 2]; MAX_PLY]>,
}

impl Default for KillerMoves {
    fn default() -> Self {
        Self {
            buf: Box::new([[None; 2]; MAX_PLY]),
        }
    }
}

impl KillerMoves {
    pub fn get(&self, height: usize) -> [Option<ChessMove>; 2] {
        if height < MAX_PLY {
            self.buf[height]
        } else {
            [None; 2]
        }
    }

    pub fn store(&mut self, height: usize, mv: ChessMove) {
        if height >= MAX_PLY {
            return;
        }
        let slot = &mut self.buf[height];
        if slot[0] != Some(mv) {
            slot[1] = slot[0];
            slot[0] = Some(mv);
        }
    }

    pub fn clear(&mut self) {
        self.buf.fill([None; 2]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn store_shifts_previous_killer_down() {
        let mut killers = KillerMoves::default();
        let a = ChessMove::from_str("e2e4").unwrap();
        let b = ChessMove::from_str("d2d4").unwrap();

        killers.store(3, a);
        assert_eq!(killers.get(3), [Some(a), None]);
        // re-storing the same move does not duplicate it
        killers.store(3, a);
        assert_eq!(killers.get(3), [Some(a), None]);
        killers.store(3, b);
        assert_eq!(killers.get(3), [Some(b), Some(a)]);
    }
}
