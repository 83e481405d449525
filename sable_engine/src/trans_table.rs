
use crate::types::*;

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering::Relaxed};

pub const DEFAULT_TT_SIZE_MB: usize = 16;

const SLOTS_PER_BUCKET: usize = 4;

/// Replacement score penalty per generation of age.
const AGING_PENALTY: i32 = 8;

const EVAL_NONE: i16 = i16::MIN;

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct TTEntry {
    pub mv: PackedMove,
    pub score: Score,
    pub eval: Option<Score>,
    pub depth: Depth,
    pub bound: Bound,
    pub generation: u8,
}

/// One entry is two atomic words; the key word is `zobrist ^ data`, so a
/// torn read of mismatched halves fails the reconstruction check and is
/// rejected. Plain relaxed ordering everywhere: the table carries hints, not
/// synchronization.
struct Slot {
    key: AtomicU64,
    data: AtomicU64,
}

impl Slot {
    fn empty() -> Self {
        Self {
            key: AtomicU64::new(0),
            data: AtomicU64::new(0),
        }
    }
}

#[repr(align(64))]
struct Bucket {
    slots: [Slot; SLOTS_PER_BUCKET],
}

impl Bucket {
    fn empty() -> Self {
        Self {
            slots: [Slot::empty(), Slot::empty(), Slot::empty(), Slot::empty()],
        }
    }
}

pub struct TransTable {
    buckets: Vec<Bucket>,
    mask: usize,
    generation: CachePadded<AtomicU8>,
}

fn pack(
    mv: PackedMove,
    score: Score,
    eval: Option<Score>,
    depth: Depth,
    bound: Bound,
    generation: u8,
) -> u64 {
    let score16 = score.clamp(i16::MIN as Score + 1, i16::MAX as Score) as i16;
    let eval16 = match eval {
        Some(e) => e.clamp(i16::MIN as Score + 1, i16::MAX as Score) as i16,
        None => EVAL_NONE,
    };
    let depth8 = depth.clamp(i8::MIN as Depth, i8::MAX as Depth) as i8;

    (mv.0 as u64)
        | ((score16 as u16 as u64) << 16)
        | ((eval16 as u16 as u64) << 32)
        | ((depth8 as u8 as u64) << 48)
        | (((generation & 0x3f) as u64) << 56)
        | ((bound as u8 as u64) << 62)
}

fn unpack(data: u64) -> TTEntry {
    let eval16 = (data >> 32) as u16 as i16;
    TTEntry {
        mv: PackedMove(data as u16),
        score: (data >> 16) as u16 as i16 as Score,
        eval: if eval16 == EVAL_NONE {
            None
        } else {
            Some(eval16 as Score)
        },
        depth: (data >> 48) as u8 as i8 as Depth,
        generation: ((data >> 56) & 0x3f) as u8,
        bound: Bound::from_u8((data >> 62) as u8),
    }
}

/// Construction
impl TransTable {
    pub fn new_mb(megabytes: usize) -> Self {
        let mut tt = Self {
            buckets: Vec::new(),
            mask: 0,
            generation: CachePadded::new(AtomicU8::new(0)),
        };
        tt.resize(megabytes.max(1) * 1024 * 1024);
        tt
    }

    /// Allocate zeroed buckets for roughly `bytes` and reset the generation.
    pub fn resize(&mut self, bytes: usize) {
        let max_buckets = (bytes / std::mem::size_of::<Bucket>()).max(1);
        let num_buckets = if max_buckets.is_power_of_two() {
            max_buckets
        } else {
            max_buckets.next_power_of_two() / 2
        };
        self.buckets = (0..num_buckets).map(|_| Bucket::empty()).collect();
        self.mask = num_buckets - 1;
        self.generation.store(0, Relaxed);
    }

    pub fn clear(&self) {
        for bucket in &self.buckets {
            for slot in &bucket.slots {
                slot.key.store(0, Relaxed);
                slot.data.store(0, Relaxed);
            }
        }
    }

    pub fn num_entries(&self) -> usize {
        self.buckets.len() * SLOTS_PER_BUCKET
    }
}

/// Generation
impl TransTable {
    /// Once per root iteration; wraps modulo 64.
    pub fn new_generation(&self) {
        let g = self.generation.load(Relaxed);
        self.generation.store((g + 1) & 0x3f, Relaxed);
    }

    pub fn generation(&self) -> u8 {
        self.generation.load(Relaxed)
    }
}

/// Probe / store
impl TransTable {
    fn bucket(&self, hash: u64) -> &Bucket {
        &self.buckets[(hash as usize) & self.mask]
    }

    pub fn probe(&self, hash: u64, height: usize) -> Option<TTEntry> {
        let bucket = self.bucket(hash);
        for slot in &bucket.slots {
            let key = slot.key.load(Relaxed);
            let data = slot.data.load(Relaxed);
            if data != 0 && key ^ data == hash {
                let mut entry = unpack(data);
                entry.score = score_from_tt(entry.score, height);
                return Some(entry);
            }
        }
        None
    }

    pub fn store(
        &self,
        hash: u64,
        height: usize,
        depth: Depth,
        score: Score,
        eval: Option<Score>,
        bound: Bound,
        mv: PackedMove,
    ) {
        let generation = self.generation();
        let score = score_to_tt(score, height);
        let bucket = self.bucket(hash);

        // a slot already holding this key is always the store target
        let mut target: Option<&Slot> = None;
        for slot in &bucket.slots {
            let key = slot.key.load(Relaxed);
            let data = slot.data.load(Relaxed);
            if data != 0 && key ^ data == hash {
                let old = unpack(data);
                // keep a same-generation deeper entry intact, but refresh its
                // best move when the new search produced one
                if old.generation == generation && old.depth > depth && bound != Bound::Exact {
                    let mv = if mv.is_null() { old.mv } else { mv };
                    let data = pack(mv, old.score, old.eval, old.depth, old.bound, generation);
                    slot.data.store(data, Relaxed);
                    slot.key.store(hash ^ data, Relaxed);
                    return;
                }
                let mv = if mv.is_null() { old.mv } else { mv };
                let data = pack(mv, score, eval, depth, bound, generation);
                slot.data.store(data, Relaxed);
                slot.key.store(hash ^ data, Relaxed);
                return;
            }
            if target.is_none() && data == 0 {
                target = Some(slot);
            }
        }

        // otherwise replace the shallowest, oldest slot
        let target = match target {
            Some(t) => t,
            None => {
                let mut best = &bucket.slots[0];
                let mut best_score = i32::MAX;
                for slot in &bucket.slots {
                    let entry = unpack(slot.data.load(Relaxed));
                    let age = (64 + generation as i32 - entry.generation as i32) & 0x3f;
                    let relevance = entry.depth as i32 - AGING_PENALTY * age;
                    if relevance < best_score {
                        best_score = relevance;
                        best = slot;
                    }
                }
                best
            }
        };

        let data = pack(mv, score, eval, depth, bound, generation);
        target.data.store(data, Relaxed);
        target.key.store(hash ^ data, Relaxed);
    }

    /// Permille of sampled slots written in the current generation.
    pub fn hashfull(&self) -> usize {
        let generation = self.generation();
        let sample = self.buckets.len().min(250);
        let mut used = 0;
        let mut total = 0;
        for bucket in self.buckets.iter().take(sample) {
            for slot in &bucket.slots {
                total += 1;
                let data = slot.data.load(Relaxed);
                if data != 0 && unpack(data).generation == generation {
                    used += 1;
                }
            }
        }
        if total == 0 {
            0
        } else {
            used * 1000 / total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_simple(tt: &TransTable, hash: u64, depth: Depth, score: Score) {
        tt.store(
            hash,
            0,
            depth,
            score,
            Some(score / 2),
            Bound::Exact,
            PackedMove(hash as u16 | 1),
        );
    }

    #[test]
    fn store_probe_round_trip() {
        let tt = TransTable::new_mb(1);
        store_simple(&tt, 0xdead_beef, 9, 133);
        let e = tt.probe(0xdead_beef, 0).unwrap();
        assert_eq!(e.depth, 9);
        assert_eq!(e.score, 133);
        assert_eq!(e.eval, Some(66));
        assert_eq!(e.bound, Bound::Exact);
        assert!(tt.probe(0xdead_beee, 0).is_none());
    }

    #[test]
    fn mate_scores_reanchor_by_height() {
        let tt = TransTable::new_mb(1);
        // mate found 3 plies below a node at height 5
        let score_at_node = CHECKMATE_VALUE - 8;
        tt.store(1, 5, 4, score_at_node, None, Bound::Exact, PackedMove(3));
        // read back at height 9: the mate is now 4 plies closer to the root
        let e = tt.probe(1, 9).unwrap();
        assert_eq!(e.score, CHECKMATE_VALUE - 12);
        // and at the node's own height the score is unchanged
        let e = tt.probe(1, 5).unwrap();
        assert_eq!(e.score, score_at_node);
    }

    #[test]
    fn generation_wraps_modulo_64() {
        let tt = TransTable::new_mb(1);
        for _ in 0..64 {
            tt.new_generation();
        }
        assert_eq!(tt.generation(), 0);
        tt.new_generation();
        assert_eq!(tt.generation(), 1);
    }

    #[test]
    fn same_generation_keeps_deeper_entry() {
        let tt = TransTable::new_mb(1);
        tt.store(7, 0, 10, 55, None, Bound::Lower, PackedMove(11));
        tt.store(7, 0, 3, -20, None, Bound::Lower, PackedMove(13));
        let e = tt.probe(7, 0).unwrap();
        assert_eq!(e.depth, 10);
        assert_eq!(e.score, 55);
        // the shallower store still refreshed the move
        assert_eq!(e.mv, PackedMove(13));

        // next generation: shallower data may replace
        tt.new_generation();
        tt.store(7, 0, 3, -20, None, Bound::Lower, PackedMove(13));
        let e = tt.probe(7, 0).unwrap();
        assert_eq!(e.depth, 3);
    }

    #[test]
    fn depth_is_clamped_on_store() {
        let tt = TransTable::new_mb(1);
        tt.store(9, 0, 4000, 1, None, Bound::Exact, PackedMove(1));
        assert_eq!(tt.probe(9, 0).unwrap().depth, 127);
        tt.store(10, 0, -4000, 1, None, Bound::Exact, PackedMove(1));
        assert_eq!(tt.probe(10, 0).unwrap().depth, -128);
    }

    #[test]
    fn concurrent_reads_never_see_torn_entries() {
        use std::sync::Arc;

        // payload derived from the key, so any probe hit can be validated
        let tt = Arc::new(TransTable::new_mb(1));
        let mut handles = vec![];
        for t in 0..4u64 {
            let tt = tt.clone();
            handles.push(std::thread::spawn(move || {
                let mut x = 0x9e37_79b9 + t;
                for _ in 0..200_000 {
                    x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let hash = x;
                    let score = (hash >> 17) as u16 as i16 as Score;
                    tt.store(
                        hash,
                        0,
                        (hash >> 5) as u8 as i8 as Depth,
                        score,
                        None,
                        Bound::Exact,
                        PackedMove(hash as u16),
                    );
                    if let Some(e) = tt.probe(hash, 0) {
                        // the slot may have been overwritten by another key,
                        // but a hit must carry this key's payload
                        assert_eq!(e.mv, PackedMove(hash as u16));
                        assert_eq!(e.score, score);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
