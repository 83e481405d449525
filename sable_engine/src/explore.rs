
use crate::builder_field;
use crate::nnue::PackedNetwork;
use crate::position::{MoveGenFilter, Position};
use crate::searchstats::SearchStats;
use crate::stack::ABStack;
use crate::tablebase::{wdl_to_score, TablebaseProbe};
use crate::threading::{
    ExMessage, ExReceiver, ExSender, ExThread, ThreadPool, ThreadUpdate,
};
use crate::timer::{SearchLimits, TimeManager};
use crate::trans_table::{TransTable, DEFAULT_TT_SIZE_MB};
use crate::tuning::SParams;
use crate::types::*;

use chess::ChessMove;
use crossbeam::utils::CachePadded;
use itertools::Itertools;
use parking_lot::{Condvar, Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI16, Ordering::Relaxed};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One principal variation: the line, its score, and the tablebase verdict
/// when the root was covered.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PvLine {
    pub moves: Vec<ChessMove>,
    pub score: Score,
    pub tb_score: Option<Score>,
}

pub type SearchResult = Vec<PvLine>;

#[derive(Debug)]
pub enum SearchError {
    InvalidPosition(String),
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchError::InvalidPosition(s) => write!(f, "invalid position: {}", s),
        }
    }
}

impl std::error::Error for SearchError {}

#[derive(Debug, Clone, PartialEq)]
pub struct ExConfig {
    pub num_threads: usize,
    pub num_pv_lines: usize,
    pub excluded_root_moves: Vec<ChessMove>,
    /// non-empty restricts the root to exactly these moves
    pub only_root_moves: Vec<ChessMove>,
    pub debug_log: bool,
    pub use_aspiration: bool,
    pub use_root_tablebase: bool,
    /// keep speculative prunings out of analysis sessions
    pub analysis_mode: bool,
}

impl Default for ExConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            num_pv_lines: 1,
            excluded_root_moves: vec![],
            only_root_moves: vec![],
            debug_log: false,
            use_aspiration: true,
            use_root_tablebase: true,
            analysis_mode: false,
        }
    }
}

impl ExConfig {
    builder_field!(num_threads, usize);
    builder_field!(num_pv_lines, usize);
    builder_field!(debug_log, bool);
    builder_field!(use_aspiration, bool);
    builder_field!(analysis_mode, bool);
}

/// The search coordinator: owns the shared transposition table, the stop
/// flag and a pool of persistent workers, and turns `go` inputs into a
/// `SearchResult`.
pub struct Explorer {
    pub pos: Position,
    pub game_history: Vec<u64>,
    pub cfg: ExConfig,
    pub params: SParams,

    stop: Arc<CachePadded<AtomicBool>>,
    best_depth: Arc<CachePadded<AtomicI16>>,
    best_mate: Arc<RwLock<Option<Depth>>>,

    tt: Arc<TransTable>,
    tb: Option<Arc<dyn TablebaseProbe>>,
    network: Option<Arc<PackedNetwork>>,

    pool: Option<ThreadPool>,
    tx: ExSender,
    rx: ExReceiver,
}

/// New
impl Explorer {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam::channel::unbounded();
        Self {
            pos: Position::startpos(),
            game_history: vec![],
            cfg: ExConfig::default(),
            params: SParams::default(),
            stop: Arc::new(CachePadded::new(AtomicBool::new(false))),
            best_depth: Arc::new(CachePadded::new(AtomicI16::new(0))),
            best_mate: Arc::new(RwLock::new(None)),
            tt: Arc::new(TransTable::new_mb(DEFAULT_TT_SIZE_MB)),
            tb: None,
            network: None,
            pool: None,
            tx,
            rx,
        }
    }
}

impl Default for Explorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration
impl Explorer {
    pub fn set_position(&mut self, pos: Position, history: Vec<u64>) {
        self.pos = pos;
        self.game_history = history;
    }

    /// New table, new generation counter. Swapped atomically: running
    /// workers keep their old Arc until the next search.
    pub fn resize_tt(&mut self, megabytes: usize) {
        self.tt = Arc::new(TransTable::new_mb(megabytes));
    }

    pub fn clear_for_new_game(&mut self) {
        self.tt.clear();
        self.game_history.clear();
        if let Some(pool) = &self.pool {
            pool.clear_workers();
        }
    }

    pub fn set_tablebase(&mut self, tb: Arc<dyn TablebaseProbe>) {
        self.tb = Some(tb);
    }

    /// Failure is non-fatal: the evaluator falls back to the hand-crafted
    /// terms alone.
    pub fn load_network<P: AsRef<Path>>(&mut self, path: P) -> std::io::Result<()> {
        match PackedNetwork::read_network(&path) {
            Ok(net) => {
                info!("loaded network: {}", path.as_ref().display());
                self.network = Some(Arc::new(net));
                Ok(())
            }
            Err(e) => {
                warn!(
                    "failed to load network {}: {}; using hand-crafted eval only",
                    path.as_ref().display(),
                    e
                );
                self.network = None;
                Err(e)
            }
        }
    }

    pub fn hashfull(&self) -> usize {
        self.tt.hashfull()
    }

    pub fn stop_handle(&self) -> Arc<CachePadded<AtomicBool>> {
        self.stop.clone()
    }
}

/// Thread pool
impl Explorer {
    fn spawn_threads(&mut self) {
        let n = self.cfg.num_threads.clamp(1, num_cpus::get().max(1) * 2);
        if let Some(pool) = &self.pool {
            if pool.command_txs.len() == n {
                return;
            }
        }
        if let Some(mut pool) = self.pool.take() {
            pool.shutdown();
        }

        let mut waits = Vec::with_capacity(n);
        let mut command_txs = Vec::with_capacity(n);
        let mut handles = Vec::with_capacity(n);

        for id in 0..n {
            trace!("spawning search thread, id = {}", id);
            let wait = Arc::new((Mutex::new(false), Condvar::new()));
            let (cmd_tx, cmd_rx) = crossbeam::channel::unbounded();

            let mut thread = ExThread {
                id,
                pos: Position::startpos(),
                cfg: self.cfg.clone(),
                params: self.params.clone(),
                limits: SearchLimits::default(),
                start: Instant::now(),
                hard_deadline: None,
                stop: self.stop.clone(),
                best_depth: self.best_depth.clone(),
                best_mate: self.best_mate.clone(),
                tt: self.tt.clone(),
                tb: None,
                network: None,
                tx: self.tx.clone(),
                wait: wait.clone(),
                commands: cmd_rx,
                stack: ABStack::new(),
                orderer: Default::default(),
                node_cache: Default::default(),
                stats: SearchStats::default(),
                root_nodes: Default::default(),
                check_counter: 0,
                rng: StdRng::seed_from_u64(0x9e37_79b9_7f4a_7c15 ^ id as u64),
            };

            let handle = std::thread::spawn(move || thread.idle());

            waits.push(wait);
            command_txs.push(cmd_tx);
            handles.push(handle);
        }

        self.pool = Some(ThreadPool::new(waits, command_txs, handles));
    }
}

impl Drop for Explorer {
    fn drop(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            pool.shutdown();
        }
    }
}

/// Search entry point
impl Explorer {
    pub fn search(&mut self, limits: &SearchLimits) -> Result<SearchResult, SearchError> {
        if !self.pos.is_legal_position() {
            return Err(SearchError::InvalidPosition(
                "side not to move is in check".into(),
            ));
        }

        let root_moves = self.pos.generate_moves(MoveGenFilter::All);
        if root_moves.is_empty() {
            let score = if self.pos.in_check() {
                -CHECKMATE_VALUE
            } else {
                DRAW_VALUE
            };
            return Ok(vec![PvLine {
                moves: vec![],
                score,
                tb_score: None,
            }]);
        }

        // games already over by rule are not searched
        if self.pos.is_fifty_move_draw() || self.pos.is_insufficient_material() {
            return Ok(vec![PvLine {
                moves: vec![root_moves[0]],
                score: DRAW_VALUE,
                tb_score: None,
            }]);
        }

        let mut cfg = self.cfg.clone();
        cfg.num_pv_lines = cfg.num_pv_lines.clamp(1, root_moves.len());

        // root tablebase cut: when the oracle knows the position, search
        // only the move it prescribes and remember the proven outcome
        let mut tb_score = None;
        if cfg.use_root_tablebase {
            if let Some(tb) = &self.tb {
                if self.pos.num_pieces() <= tb.max_pieces() {
                    if let Some((wdl, mv)) = tb.probe_best_move(&self.pos) {
                        debug!("root tablebase hit: {:?} {}", wdl, mv);
                        cfg.only_root_moves = vec![mv];
                        tb_score = Some(wdl_to_score(wdl, 0));
                    }
                }
            }
        }

        self.stop.store(false, Relaxed);
        self.best_depth.store(0, Relaxed);
        *self.best_mate.write() = None;
        self.spawn_threads();

        let timer = TimeManager::new(&limits.time, self.pos.side_to_move(), self.pos.game_ply);
        let start = timer.start;
        let hard_deadline = timer.max_time();

        let out: Arc<RwLock<(Depth, SearchResult, SearchStats)>> =
            Arc::new(RwLock::new((0, vec![], SearchStats::default())));

        let num_threads = self.pool.as_ref().map(|p| p.handles.len()).unwrap_or(1);
        let listener = {
            let rx = self.rx.clone();
            let out = out.clone();
            let stop = self.stop.clone();
            let best_depth = self.best_depth.clone();
            let best_mate = self.best_mate.clone();
            let tt = self.tt.clone();
            let debug_log = cfg.debug_log;
            std::thread::spawn(move || {
                listener_loop(
                    rx, out, stop, best_depth, best_mate, timer, tt, num_threads, debug_log,
                );
            })
        };

        let update = ThreadUpdate::new(
            self.pos,
            self.game_history.clone(),
            cfg,
            self.params.clone(),
            limits.clone(),
            start,
            hard_deadline,
            self.tt.clone(),
            self.tb.clone(),
            self.network.clone(),
        );
        self.pool.as_ref().unwrap().wakeup(&update);

        // the coordinator only polices the hard clock; everything else is
        // event-driven through the listener
        while !listener.is_finished() {
            if let Some(max) = hard_deadline {
                if start.elapsed() >= max {
                    self.stop.store(true, Relaxed);
                }
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        let _ = listener.join();

        let (_depth, mut result, _stats) = {
            let r = out.read();
            r.clone()
        };

        // a bestmove must always exist while legal moves do
        let needs_fallback = result
            .first()
            .map(|l| l.moves.is_empty())
            .unwrap_or(true);
        if needs_fallback {
            result = vec![PvLine {
                moves: vec![root_moves[0]],
                score: DRAW_VALUE,
                tb_score: None,
            }];
        }

        for line in result.iter_mut() {
            line.tb_score = tb_score;
        }

        // sanity: never hand back an illegal bestmove
        if let Some(mv) = result[0].moves.first() {
            if !self.pos.move_is_legal(*mv) {
                debug!("discarding illegal best move {}", mv);
                result[0] = PvLine {
                    moves: vec![root_moves[0]],
                    score: DRAW_VALUE,
                    tb_score,
                };
            }
        }

        Ok(result)
    }

    pub fn stop(&self) {
        self.stop.store(true, Relaxed);
    }
}

#[allow(clippy::too_many_arguments)]
fn listener_loop(
    rx: ExReceiver,
    out: Arc<RwLock<(Depth, SearchResult, SearchStats)>>,
    stop: Arc<CachePadded<AtomicBool>>,
    best_depth: Arc<CachePadded<AtomicI16>>,
    best_mate: Arc<RwLock<Option<Depth>>>,
    mut timer: TimeManager,
    tt: Arc<TransTable>,
    num_threads: usize,
    debug_log: bool,
) {
    let mut ended = 0;

    while ended < num_threads {
        match rx.recv() {
            Ok(ExMessage::Iteration {
                thread_id: _,
                depth,
                pv_lines,
                stats,
                best_move_node_fraction,
            }) => {
                if pv_lines.is_empty() || depth <= best_depth.load(Relaxed) {
                    continue;
                }
                best_depth.store(depth, Relaxed);

                let best = &pv_lines[0];
                let elapsed = timer.elapsed();

                if debug_log {
                    for (i, line) in pv_lines.iter().enumerate() {
                        println!(
                            "{}",
                            format_info(depth, i, line, &stats, elapsed, tt.hashfull())
                        );
                    }
                }

                // a proven mate within this depth ends the search
                if is_mate_score(best.score)
                    && (CHECKMATE_VALUE - best.score.abs()) <= depth as Score
                {
                    let plies = (CHECKMATE_VALUE - best.score.abs()) as Depth;
                    debug!("mate in {} plies proven at depth {}", plies, depth);
                    *best_mate.write() = Some(plies);
                    stop.store(true, Relaxed);
                }

                timer.update(
                    best.moves.first().copied(),
                    best.score,
                    best_move_node_fraction,
                );

                {
                    let mut w = out.write();
                    *w = (depth, pv_lines, stats);
                }

                // ideal-time decisions happen only at iteration boundaries
                if timer.should_stop_soft() {
                    debug!("soft time limit reached at depth {}", depth);
                    stop.store(true, Relaxed);
                }
            }
            Ok(ExMessage::End(id)) => {
                trace!("thread {:>2} finished", id);
                ended += 1;
                // once the main thread is done nothing further can publish
                if id == 0 {
                    stop.store(true, Relaxed);
                }
            }
            Err(_) => break,
        }
    }
}

/// One UCI `info` line.
pub fn format_info(
    depth: Depth,
    pv_index: usize,
    line: &PvLine,
    stats: &SearchStats,
    elapsed: Duration,
    hashfull: usize,
) -> String {
    let millis = elapsed.as_millis().max(1) as u64;
    let nps = stats.nodes * 1000 / millis;
    let pv = line.moves.iter().map(|m| m.to_string()).join(" ");
    let mut s = format!("info depth {} seldepth {}", depth, stats.seldepth);
    s.push_str(&format!(" multipv {}", pv_index + 1));
    s.push_str(&format!(" score {}", format_uci_score(line.score)));
    s.push_str(&format!(
        " nodes {} nps {} hashfull {} time {}",
        stats.nodes, nps, hashfull, millis
    ));
    if !pv.is_empty() {
        s.push_str(&format!(" pv {}", pv));
    }
    s
}
