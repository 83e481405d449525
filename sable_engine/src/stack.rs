
use crate::evaluate::TaperedScore;
use crate::nnue::Accumulator;
use crate::position::Position;
use crate::types::*;

use arrayvec::ArrayVec;
use chess::{ChessMove, Piece};

pub type PvBuffer = ArrayVec<PackedMove, MAX_PLY>;

/// Per-ply search state. Entries are preallocated once per thread; the
/// recursion only indexes by height, so there is no allocation on the hot
/// path.
#[derive(Debug, Clone)]
pub struct StackEntry {
    pub hash: u64,
    pub current_move: Option<ChessMove>,
    pub moved_piece: Option<Piece>,
    pub excluded: Option<PackedMove>,
    pub static_eval: Option<Score>,
    pub psqt: Option<TaperedScore>,
    pub in_check: bool,
    pub null_move: bool,
    pub double_extensions: u8,
    pub pv: PvBuffer,
    pub accum: Accumulator,
}

impl Default for StackEntry {
    fn default() -> Self {
        Self {
            hash: 0,
            current_move: None,
            moved_piece: None,
            excluded: None,
            static_eval: None,
            psqt: None,
            in_check: false,
            null_move: false,
            double_extensions: 0,
            pv: PvBuffer::new(),
            accum: Accumulator::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ABStack {
    pub entries: Vec<StackEntry>,
    /// Hashes of the game positions leading up to the root, oldest first.
    pub game_history: Vec<u64>,
}

/// New
impl ABStack {
    pub fn new() -> Self {
        Self {
            entries: vec![StackEntry::default(); MAX_PLY + 8],
            game_history: Vec::new(),
        }
    }

    pub fn new_with_history(history: &[u64]) -> Self {
        let mut out = Self::new();
        out.game_history = history.to_vec();
        out
    }
}

impl Default for ABStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ABStack {
    pub fn at(&self, height: usize) -> &StackEntry {
        &self.entries[height]
    }

    pub fn at_mut(&mut self, height: usize) -> &mut StackEntry {
        &mut self.entries[height]
    }

    /// Previous move's (piece, to), for counter-move and continuation
    /// history lookups. `None` right after a null move.
    pub fn prev_move_key(&self, height: usize) -> Option<(Piece, chess::Square)> {
        if height == 0 {
            return None;
        }
        let parent = &self.entries[height - 1];
        if parent.null_move {
            return None;
        }
        let mv = parent.current_move?;
        let pc = parent.moved_piece?;
        Some((pc, mv.get_dest()))
    }

    /// Static eval two plies up, for "improving" decisions.
    pub fn eval_two_up(&self, height: usize) -> Option<Score> {
        if height >= 2 {
            self.entries[height - 2].static_eval
        } else {
            None
        }
    }

    /// Two-fold repetition along the current search path, continuing into
    /// the pre-root game history. Only positions within the reversible-move
    /// window can repeat.
    pub fn is_repetition(&self, pos: &Position, height: usize) -> bool {
        let hash = pos.hash();
        let max_back = pos.halfmove_count() as usize;

        let mut back = 2;
        while back <= max_back {
            if back <= height {
                if self.entries[height - back].hash == hash {
                    return true;
                }
            } else {
                let over = back - height;
                if over > self.game_history.len() {
                    break;
                }
                if self.game_history[self.game_history.len() - over] == hash {
                    return true;
                }
            }
            back += 2;
        }
        false
    }

    /// Reset per-node fields below a fresh search; the accumulators keep
    /// their buffers.
    pub fn clear_for_search(&mut self) {
        for e in self.entries.iter_mut() {
            e.hash = 0;
            e.current_move = None;
            e.moved_piece = None;
            e.excluded = None;
            e.static_eval = None;
            e.psqt = None;
            e.in_check = false;
            e.null_move = false;
            e.double_extensions = 0;
            e.pv.clear();
            e.accum.computed = false;
        }
    }
}
