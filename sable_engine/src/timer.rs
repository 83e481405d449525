
use crate::types::*;

use chess::{ChessMove, Color};
use std::time::{Duration, Instant};

/// Raw clock inputs from the `go` command.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TimeSettings {
    pub wtime: Option<u64>,
    pub btime: Option<u64>,
    pub winc: Option<u64>,
    pub binc: Option<u64>,
    pub moves_to_go: Option<u32>,
    pub move_time: Option<u64>,
    pub move_overhead: u64,
    pub infinite: bool,
}

impl TimeSettings {
    pub fn infinite() -> Self {
        Self {
            infinite: true,
            ..Default::default()
        }
    }

    pub fn fixed_move_time(millis: u64) -> Self {
        Self {
            move_time: Some(millis),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchLimits {
    pub max_depth: Depth,
    pub max_nodes: Option<u64>,
    pub time: TimeSettings,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_depth: MAX_PLY as Depth - 1,
            max_nodes: None,
            time: TimeSettings::infinite(),
        }
    }
}

impl SearchLimits {
    pub fn depth(depth: Depth) -> Self {
        Self {
            max_depth: depth,
            ..Default::default()
        }
    }
}

const MOVES_LEFT_MIDPOINT: f64 = 36.0;
const MOVES_LEFT_STEEPNESS: f64 = 2.22;
const IDEAL_TIME_FACTOR: f64 = 0.843;

const NODES_COUNT_SCALE: f64 = 1.95;
const NODES_COUNT_OFFSET: f64 = 0.53;

const STABILITY_SCALE: f64 = 0.041;
const STABILITY_OFFSET: f64 = 1.264;

const SCORE_CHANGE_SCALE: f64 = 0.012;
const SCORE_CHANGE_OFFSET: f64 = 0.803;
const SCORE_CHANGE_MAX: Score = 49;

/// Parametric moves-left curve (the LeelaChessZero shape).
fn estimate_moves_left(moves_played: f64) -> f64 {
    let m = MOVES_LEFT_MIDPOINT;
    let s = MOVES_LEFT_STEEPNESS;
    m * (1.0 + 1.5 * (moves_played / m).powf(s)).powf(1.0 / s) - moves_played
}

/// Converts clock state into a soft (ideal) and hard (max) deadline and
/// re-scales the soft one between iterations from PV stability, score
/// swings and the node share of the best move.
#[derive(Debug, Clone)]
pub struct TimeManager {
    pub start: Instant,
    ideal_base: Option<Duration>,
    ideal: Option<Duration>,
    max: Option<Duration>,
    stability: u32,
    prev_best: Option<ChessMove>,
    score_history: Vec<Score>,
}

/// Init
impl TimeManager {
    pub fn new(settings: &TimeSettings, side: Color, game_ply: u16) -> Self {
        let mut ideal = None;
        let mut max = None;

        let remaining = match side {
            Color::White => settings.wtime,
            Color::Black => settings.btime,
        };
        let increment = match side {
            Color::White => settings.winc,
            Color::Black => settings.binc,
        }
        .unwrap_or(0) as f64;

        if !settings.infinite {
            if let Some(remaining) = remaining {
                let remaining = remaining as f64;
                let overhead = settings.move_overhead as f64;
                let moves_left = match settings.moves_to_go {
                    Some(n) => (n.max(1)) as f64,
                    None => estimate_moves_left((game_ply / 2) as f64),
                };

                let mut ideal_ms = IDEAL_TIME_FACTOR * (remaining / moves_left + increment);
                let mut max_ms = (remaining - overhead) / moves_left.sqrt() + increment;

                let cap = (0.5 * remaining - overhead).max(0.01);
                ideal_ms = ideal_ms.clamp(0.0, cap);
                max_ms = max_ms.clamp(0.0, cap);

                ideal = Some(Duration::from_secs_f64(ideal_ms / 1000.0));
                max = Some(Duration::from_secs_f64(max_ms / 1000.0));
            }

            if let Some(move_time) = settings.move_time {
                let d = Duration::from_millis(move_time);
                ideal = Some(d);
                max = Some(d);
            }
        }

        Self {
            start: Instant::now(),
            ideal_base: ideal,
            ideal,
            max,
            stability: 0,
            prev_best: None,
            score_history: Vec::new(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn ideal_time(&self) -> Option<Duration> {
        self.ideal
    }

    pub fn max_time(&self) -> Option<Duration> {
        self.max
    }
}

/// Stop decisions
impl TimeManager {
    /// Checked only at iteration boundaries.
    pub fn should_stop_soft(&self) -> bool {
        match self.ideal {
            Some(ideal) => self.elapsed() >= ideal,
            None => false,
        }
    }

    /// Checked mid-search; overrunning this aborts all workers.
    pub fn should_stop_hard(&self) -> bool {
        match self.max {
            Some(max) => self.elapsed() >= max,
            None => false,
        }
    }
}

/// Per-iteration update
impl TimeManager {
    pub fn update(
        &mut self,
        best_move: Option<ChessMove>,
        score: Score,
        best_move_node_fraction: f64,
    ) {
        let base = match self.ideal_base {
            Some(b) => b,
            None => {
                self.score_history.push(score);
                return;
            }
        };

        if best_move.is_some() && best_move == self.prev_best {
            self.stability += 1;
        } else {
            self.stability = 0;
        }
        self.prev_best = best_move;

        let stability_factor =
            STABILITY_OFFSET - STABILITY_SCALE * self.stability.min(10) as f64;

        let score_change_factor = if self.score_history.len() >= 3 {
            let n = self.score_history.len();
            let mut change = 0;
            change += (self.score_history[n - 1] - score).min(SCORE_CHANGE_MAX);
            change += (self.score_history[n - 3] - score).min(SCORE_CHANGE_MAX);
            change as f64 * SCORE_CHANGE_SCALE + SCORE_CHANGE_OFFSET
        } else {
            1.0
        };

        let node_count_factor =
            (1.0 - best_move_node_fraction.clamp(0.0, 1.0)) * NODES_COUNT_SCALE
                + NODES_COUNT_OFFSET;

        self.score_history.push(score);

        let factor = stability_factor * score_change_factor * node_count_factor;
        self.ideal = Some(base.mul_f64(factor.max(0.01)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn moves_left_curve_is_sane() {
        let early = estimate_moves_left(0.0);
        let mid = estimate_moves_left(36.0);
        let late = estimate_moves_left(90.0);
        // fresh games expect the most moves; the curve bottoms out near the
        // midpoint and rises slowly for marathon games
        assert!(early > mid);
        assert!(early > late);
        assert!(mid > 0.0 && late > 0.0);
    }

    #[test]
    fn fixed_move_time_sets_both_deadlines() {
        let tm = TimeManager::new(&TimeSettings::fixed_move_time(500), Color::White, 0);
        assert_eq!(tm.ideal_time(), Some(Duration::from_millis(500)));
        assert_eq!(tm.max_time(), Some(Duration::from_millis(500)));
        assert!(!tm.should_stop_soft());
    }

    #[test]
    fn infinite_never_stops() {
        let tm = TimeManager::new(&TimeSettings::infinite(), Color::White, 0);
        assert!(!tm.should_stop_soft());
        assert!(!tm.should_stop_hard());
    }

    #[test]
    fn stable_best_move_shrinks_ideal_time() {
        let settings = TimeSettings {
            wtime: Some(60_000),
            winc: Some(1_000),
            move_overhead: 10,
            ..Default::default()
        };
        let mut tm = TimeManager::new(&settings, Color::White, 20);
        let base = tm.ideal_time().unwrap();
        let mv = ChessMove::from_str("e2e4").unwrap();
        for _ in 0..12 {
            tm.update(Some(mv), 25, 0.9);
        }
        assert!(tm.ideal_time().unwrap() < base);
    }

    #[test]
    fn dropping_score_extends_ideal_time() {
        let settings = TimeSettings {
            wtime: Some(60_000),
            move_overhead: 10,
            ..Default::default()
        };
        let mut tm = TimeManager::new(&settings, Color::White, 20);

        let a = ChessMove::from_str("e2e4").unwrap();
        let b = ChessMove::from_str("d2d4").unwrap();
        for s in [50, 40, 45] {
            tm.update(Some(a), s, 0.5);
        }
        let steady = tm.ideal_time().unwrap();
        // the score collapses and the best move flips
        tm.update(Some(b), -80, 0.2);
        assert!(tm.ideal_time().unwrap() > steady);
    }

    #[test]
    fn hard_deadline_below_half_of_remaining() {
        let settings = TimeSettings {
            wtime: Some(1_000),
            move_overhead: 50,
            ..Default::default()
        };
        let tm = TimeManager::new(&settings, Color::White, 4);
        assert!(tm.max_time().unwrap() <= Duration::from_millis(500));
    }
}
