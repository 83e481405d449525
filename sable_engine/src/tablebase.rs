
use crate::position::Position;
use crate::types::*;

use chess::ChessMove;

/// Win/draw/loss from the side to move's perspective.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Copy)]
pub enum Wdl {
    Loss,
    Draw,
    Win,
}

/// Pluggable endgame tablebase oracle. The engine only consumes this
/// interface; a Syzygy prober (or a test stub) plugs in from outside.
pub trait TablebaseProbe: Send + Sync {
    /// Largest piece count covered by the tables.
    fn max_pieces(&self) -> u32;

    /// WDL value of the position, if the tables cover it.
    fn probe_wdl(&self, pos: &Position) -> Option<Wdl>;

    /// Best move preserving the WDL outcome (DTZ-informed), for root use.
    fn probe_best_move(&self, pos: &Position) -> Option<(Wdl, ChessMove)>;
}

/// Tablebase outcomes score just below proven mates so a real mate line is
/// always preferred, and are height-anchored like mate scores.
pub fn wdl_to_score(wdl: Wdl, height: usize) -> Score {
    match wdl {
        Wdl::Win => TB_WIN_VALUE - height as Score,
        Wdl::Draw => DRAW_VALUE,
        Wdl::Loss => -(TB_WIN_VALUE - height as Score),
    }
}
