
use crate::types::{Depth, Score};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Search tunables. These are parameters, not contracts; the struct is
/// serializable so tuning runs can dump and reload full sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SParams {
    pub aspiration_min_depth: Depth,
    pub aspiration_delta: Score,

    pub razor_depth: Depth,
    pub razor_margin: Score,

    pub rfp_depth: Depth,
    pub rfp_margin: Score,

    pub nmp_min_depth: Depth,
    pub nmp_base_reduction: Depth,

    pub iir_min_depth: Depth,

    pub lmp_depth: Depth,

    pub see_prune_depth: Depth,
    pub see_prune_margin: Score,

    pub singular_min_depth: Depth,
    pub singular_margin: Score,
    pub singular_double_margin: Score,
    pub max_double_extensions: u8,

    pub lmr_min_depth: Depth,
    pub lmr_min_moves: usize,
}

impl Default for SParams {
    fn default() -> Self {
        Self {
            aspiration_min_depth: 4,
            aspiration_delta: 15,

            razor_depth: 3,
            razor_margin: 220,

            rfp_depth: 8,
            rfp_margin: 75,

            nmp_min_depth: 3,
            nmp_base_reduction: 3,

            iir_min_depth: 4,

            lmp_depth: 8,

            see_prune_depth: 8,
            see_prune_margin: 100,

            singular_min_depth: 7,
            singular_margin: 2,
            singular_double_margin: 24,
            max_double_extensions: 6,

            lmr_min_depth: 3,
            lmr_min_moves: 3,
        }
    }
}

const LMR_TABLE_SIZE: usize = 64;

static LMR_TABLE: Lazy<[[u8; LMR_TABLE_SIZE]; LMR_TABLE_SIZE]> = Lazy::new(|| {
    let mut table = [[0u8; LMR_TABLE_SIZE]; LMR_TABLE_SIZE];
    for (depth, row) in table.iter_mut().enumerate().skip(1) {
        for (mv, cell) in row.iter_mut().enumerate().skip(1) {
            let r = 0.25 + (depth as f64).ln() * (mv as f64).ln() / 2.25;
            *cell = r as u8;
        }
    }
    table
});

pub fn lmr_reduction(depth: Depth, move_index: usize) -> Depth {
    let d = (depth.max(0) as usize).min(LMR_TABLE_SIZE - 1);
    let m = move_index.min(LMR_TABLE_SIZE - 1);
    LMR_TABLE[d][m] as Depth
}

/// Quiet-move count after which late moves are skipped at shallow depth.
pub fn lmp_threshold(depth: Depth, improving: bool) -> usize {
    let d = depth.max(0) as usize;
    if improving {
        3 + d * d
    } else {
        (3 + d * d) / 2
    }
}
