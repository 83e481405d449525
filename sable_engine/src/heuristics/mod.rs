
pub mod butterfly;
pub mod capture_history;
pub mod continuation;
pub mod counter_moves;
pub mod killer_moves;

pub use self::butterfly::*;
pub use self::capture_history::*;
pub use self::continuation::*;
pub use self::counter_moves::*;
pub use self::killer_moves::*;

use crate::types::{Depth, Score};

pub const HISTORY_MAX: Score = 16_384;

/// Quadratic-in-depth bonus for quiet-move statistics.
pub fn depth_stat_bonus(depth: Depth) -> Score {
    let d = depth.max(0) as Score;
    (d * d).min(1200)
}

/// History updates use the "gravity" form: the increment shrinks as the
/// entry approaches the bound, which keeps every value in
/// `[-HISTORY_MAX, HISTORY_MAX]`.
pub fn history_update(entry: &mut Score, bonus: Score) {
    let bonus = bonus.clamp(-HISTORY_MAX, HISTORY_MAX);
    *entry += bonus - *entry * bonus.abs() / HISTORY_MAX;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    #[test]
    fn bonus_grows_with_depth_and_caps() {
        assert_eq!(depth_stat_bonus(0), 0);
        assert_eq!(depth_stat_bonus(4), 16);
        assert_eq!(depth_stat_bonus(60), 1200);
    }

    #[test]
    fn history_values_stay_bounded() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut entry = 0;
        for _ in 0..100_000 {
            let bonus = rng.gen_range(-3000..=3000);
            history_update(&mut entry, bonus);
            assert!(
                (-HISTORY_MAX..=HISTORY_MAX).contains(&entry),
                "entry escaped bounds: {}",
                entry
            );
        }
    }

    #[test]
    fn saturating_toward_the_bound() {
        let mut entry = 0;
        for _ in 0..1000 {
            history_update(&mut entry, 1200);
        }
        assert!(entry > HISTORY_MAX * 9 / 10);
        assert!(entry <= HISTORY_MAX);
    }
}
