
use crate::evaluate::{self, nn_to_centipawns};
use crate::explore::{ExConfig, PvLine};
use crate::move_ordering::MoveOrderer;
use crate::node_cache::NodeCache;
use crate::nnue::{self, PackedNetwork, OUTPUT_SCALE};
use crate::position::{DirtyList, Position};
use crate::psqt;
use crate::searchstats::SearchStats;
use crate::stack::ABStack;
use crate::tablebase::TablebaseProbe;
use crate::timer::SearchLimits;
use crate::trans_table::TransTable;
use crate::tuning::SParams;
use crate::types::*;

use std::sync::atomic::{AtomicBool, AtomicI16, Ordering::Relaxed};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender};
use crossbeam::utils::CachePadded;
use derive_new::new;
use parking_lot::{Condvar, Mutex, RwLock};
use rand::rngs::StdRng;
use rustc_hash::FxHashMap;

pub type ExSender = Sender<ExMessage>;
pub type ExReceiver = Receiver<ExMessage>;

/// Worker -> coordinator traffic.
#[derive(Debug, Clone)]
pub enum ExMessage {
    Iteration {
        thread_id: usize,
        depth: Depth,
        pv_lines: Vec<PvLine>,
        stats: SearchStats,
        best_move_node_fraction: f64,
    },
    End(usize),
}

/// Everything a worker needs for one search, pushed through its channel on
/// wakeup. Workers own copies; nothing here is borrowed from the coordinator.
#[derive(Clone, new)]
pub struct ThreadUpdate {
    pub pos: Position,
    pub game_history: Vec<u64>,
    pub cfg: ExConfig,
    pub params: SParams,
    pub limits: SearchLimits,
    pub start: Instant,
    pub hard_deadline: Option<Duration>,
    pub tt: Arc<TransTable>,
    pub tb: Option<Arc<dyn TablebaseProbe>>,
    pub network: Option<Arc<PackedNetwork>>,
}

pub enum ThreadCommand {
    Search(Box<ThreadUpdate>),
    /// Forget all accumulated heuristics; with a cleared TT the next search
    /// replays like a fresh engine.
    Clear,
    Exit,
}

#[derive(new)]
pub struct ThreadPool {
    pub waits: Vec<Arc<(Mutex<bool>, Condvar)>>,
    pub command_txs: Vec<Sender<ThreadCommand>>,
    pub handles: Vec<std::thread::JoinHandle<()>>,
}

impl ThreadPool {
    pub fn wakeup(&self, update: &ThreadUpdate) {
        for tx in &self.command_txs {
            let _ = tx.send(ThreadCommand::Search(Box::new(update.clone())));
        }
        for wait in &self.waits {
            let mut started = wait.0.lock();
            *started = true;
            wait.1.notify_all();
        }
    }

    pub fn clear_workers(&self) {
        for tx in &self.command_txs {
            let _ = tx.send(ThreadCommand::Clear);
        }
        for wait in &self.waits {
            let mut started = wait.0.lock();
            *started = true;
            wait.1.notify_all();
        }
    }

    pub fn shutdown(&mut self) {
        for tx in &self.command_txs {
            let _ = tx.send(ThreadCommand::Exit);
        }
        for wait in &self.waits {
            let mut started = wait.0.lock();
            *started = true;
            wait.1.notify_all();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// One search worker. Owns all per-thread state: the move orderer, the node
/// cache, the ply stack with its NN accumulators, stats and an RNG for
/// root-ordering jitter on helper threads.
pub struct ExThread {
    pub id: usize,

    pub pos: Position,
    pub cfg: ExConfig,
    pub params: SParams,
    pub limits: SearchLimits,
    pub start: Instant,
    pub hard_deadline: Option<Duration>,

    pub stop: Arc<CachePadded<AtomicBool>>,
    pub best_depth: Arc<CachePadded<AtomicI16>>,
    pub best_mate: Arc<RwLock<Option<Depth>>>,

    pub tt: Arc<TransTable>,
    pub tb: Option<Arc<dyn TablebaseProbe>>,
    pub network: Option<Arc<PackedNetwork>>,

    pub tx: ExSender,
    pub wait: Arc<(Mutex<bool>, Condvar)>,
    pub commands: Receiver<ThreadCommand>,

    pub stack: ABStack,
    pub orderer: MoveOrderer,
    pub node_cache: NodeCache,
    pub stats: SearchStats,
    pub root_nodes: FxHashMap<u16, u64>,
    pub check_counter: u32,
    pub rng: StdRng,
}

/// Lazy-SMP schedules: helpers start deeper and stride wider so the pool
/// explores different depths of the tree at the same time.
const SKIP_LEN: usize = 20;
const SKIP_SIZE: [Depth; SKIP_LEN] = [1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4];
const START_PLY: [Depth; SKIP_LEN] = [0, 1, 0, 1, 2, 3, 0, 1, 2, 3, 4, 5, 0, 1, 2, 3, 4, 5, 6, 7];

/// Idle loop
impl ExThread {
    pub fn idle(&mut self) {
        loop {
            {
                let mut started = self.wait.0.lock();
                while !*started {
                    self.wait.1.wait(&mut started);
                }
                *started = false;
            }

            loop {
                match self.commands.try_recv() {
                    Ok(ThreadCommand::Search(update)) => {
                        trace!("thread {:>2} waking up", self.id);
                        self.apply_update(*update);
                        self.iterative_deepening();
                    }
                    Ok(ThreadCommand::Clear) => {
                        self.orderer.clear();
                        self.node_cache.clear();
                    }
                    Ok(ThreadCommand::Exit) => {
                        trace!("thread {:>2} exiting", self.id);
                        return;
                    }
                    Err(_) => break,
                }
            }
        }
    }

    fn apply_update(&mut self, update: ThreadUpdate) {
        self.pos = update.pos;
        self.cfg = update.cfg;
        self.params = update.params;
        self.limits = update.limits;
        self.start = update.start;
        self.hard_deadline = update.hard_deadline;
        self.tt = update.tt;
        self.tb = update.tb;
        self.network = update.network;

        self.stack.clear_for_search();
        self.stack.game_history = update.game_history;
        self.orderer.new_search();
        self.stats = SearchStats::default();
        self.root_nodes.clear();
        self.check_counter = 0;
    }
}

/// Iterative deepening
impl ExThread {
    pub fn iterative_deepening(&mut self) {
        let is_main = self.id == 0;
        let skip = SKIP_SIZE[self.id % SKIP_LEN];
        let mut depth: Depth = if is_main {
            1
        } else {
            1 + START_PLY[self.id % SKIP_LEN]
        };

        let num_pv = if is_main {
            self.cfg.num_pv_lines.max(1)
        } else {
            1
        };
        let mut prev_scores: Vec<Option<Score>> = vec![None; num_pv];

        while !self.stop.load(Relaxed)
            && depth <= self.limits.max_depth
            && self.best_mate.read().is_none()
        {
            if is_main {
                self.tt.new_generation();
            }
            self.root_nodes.clear();

            let mut lines = Vec::with_capacity(num_pv);
            let mut excluded = self.cfg.excluded_root_moves.clone();
            let mut aborted = false;

            for pv_index in 0..num_pv {
                match self.aspiration_search(depth, pv_index, prev_scores[pv_index], &excluded) {
                    Some(line) => {
                        let exhausted = line.moves.is_empty();
                        if let Some(&mv) = line.moves.first() {
                            excluded.push(mv);
                        }
                        lines.push(line);
                        if exhausted {
                            break;
                        }
                    }
                    None => {
                        aborted = true;
                        break;
                    }
                }
            }
            if aborted || lines.is_empty() {
                break;
            }

            for (slot, line) in prev_scores.iter_mut().zip(lines.iter()) {
                *slot = Some(line.score);
            }

            if is_main {
                let fraction = self.best_move_node_fraction(&lines);
                let msg = ExMessage::Iteration {
                    thread_id: self.id,
                    depth,
                    pv_lines: lines,
                    stats: self.stats,
                    best_move_node_fraction: fraction,
                };
                if self.tx.send(msg).is_err() {
                    break;
                }
            }

            depth += if is_main { 1 } else { skip };
        }

        let _ = self.tx.send(ExMessage::End(self.id));
    }

    fn best_move_node_fraction(&self, lines: &[PvLine]) -> f64 {
        let total: u64 = self.root_nodes.values().sum();
        if total == 0 {
            return 0.0;
        }
        let best = lines
            .first()
            .and_then(|l| l.moves.first())
            .map(|&mv| PackedMove::pack(mv).0)
            .and_then(|k| self.root_nodes.get(&k).copied())
            .unwrap_or(0);
        best as f64 / total as f64
    }
}

/// Abort conditions
impl ExThread {
    /// Cheap flag test every node, deadline and node-limit tests every 2048.
    pub fn should_abort(&mut self) -> bool {
        if self.stop.load(Relaxed) {
            return true;
        }
        self.check_counter += 1;
        if self.check_counter >= 2048 {
            self.check_counter = 0;
            if let Some(max) = self.hard_deadline {
                if self.start.elapsed() >= max {
                    self.stop.store(true, Relaxed);
                    return true;
                }
            }
            if let Some(max_nodes) = self.limits.max_nodes {
                if self.stats.nodes >= max_nodes {
                    self.stop.store(true, Relaxed);
                    return true;
                }
            }
        }
        false
    }
}

/// Node preparation
impl ExThread {
    /// Entry bookkeeping for the node at `height`: hash, check state, a PSQT
    /// sum if none was carried in, and a fresh accumulator if the carried one
    /// was invalidated.
    pub fn prepare_node(&mut self, pos: &Position, height: usize) {
        let entry = self.stack.at_mut(height);
        entry.hash = pos.hash();
        entry.in_check = pos.in_check();
        entry.pv.clear();
        if entry.psqt.is_none() {
            entry.psqt = Some(psqt::compute_psqt(pos));
        }
        if let Some(net) = self.network.clone() {
            let entry = self.stack.at_mut(height);
            if !entry.accum.computed {
                nnue::accumulator::refresh(&net, pos, &mut entry.accum);
            }
        }
    }

    /// Record the move made at `height` and seed the child's entry with the
    /// incrementally updated PSQT sum and NN accumulator. A `None` move is a
    /// null move: the piece placement is untouched, so both carry over.
    pub fn prepare_child(
        &mut self,
        height: usize,
        mv: Option<(chess::ChessMove, chess::Piece)>,
        child: &Position,
        dirty: Option<&DirtyList>,
    ) {
        let parent_psqt = self.stack.at(height).psqt;
        let parent_dext = self.stack.at(height).double_extensions;

        {
            let entry = self.stack.at_mut(height);
            match mv {
                Some((m, pc)) => {
                    entry.current_move = Some(m);
                    entry.moved_piece = Some(pc);
                    entry.null_move = false;
                }
                None => {
                    entry.current_move = None;
                    entry.moved_piece = None;
                    entry.null_move = true;
                }
            }
        }

        let child_psqt = match (parent_psqt, dirty) {
            (Some(p), Some(d)) => psqt::update_psqt(p, child, d),
            (Some(p), None) => Some(p),
            _ => None,
        };

        let network = self.network.clone();
        let (parents, children) = self.stack.entries.split_at_mut(height + 1);
        let parent = &parents[height];
        let entry = &mut children[0];

        entry.psqt = child_psqt;
        entry.excluded = None;
        entry.static_eval = None;
        entry.double_extensions = parent_dext;
        entry.pv.clear();
        entry.accum.computed = false;

        if let Some(net) = network.as_ref() {
            if parent.accum.computed {
                match dirty {
                    Some(d) => {
                        if !nnue::accumulator::update(net, &parent.accum, &mut entry.accum, child, d)
                        {
                            nnue::accumulator::refresh(net, child, &mut entry.accum);
                        }
                    }
                    None => {
                        entry.accum = parent.accum.clone();
                    }
                }
            } else {
                nnue::accumulator::refresh(net, child, &mut entry.accum);
            }
        }
    }

    /// Side-to-move-relative static eval using the node's carried PSQT and
    /// accumulator state.
    pub fn leaf_eval(&self, pos: &Position, height: usize) -> Score {
        let entry = self.stack.at(height);
        let psqt_hint = entry.psqt;
        evaluate::evaluate(pos, psqt_hint, || {
            let net = self.network.as_ref()?;
            let raw = if entry.accum.computed {
                net.evaluate(&entry.accum, pos.side_to_move(), net.variant_for(pos.num_pieces()))
            } else {
                net.evaluate_position(pos)
            };
            let cp = nn_to_centipawns(raw, OUTPUT_SCALE);
            Some(if pos.side_to_move() == chess::Color::Black {
                -cp
            } else {
                cp
            })
        })
    }
}
