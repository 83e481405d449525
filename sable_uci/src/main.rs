use sable_engine::explore::Explorer;
use sable_engine::position::Position;
use sable_engine::timer::{SearchLimits, TimeSettings};
use sable_engine::types::{Depth, MAX_PLY};

use chess::ChessMove;
use log::{debug, warn};
use std::io::BufRead;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

const NAME: &str = "sable";
const VERSION: &str = env!("CARGO_PKG_VERSION");

struct Options {
    move_overhead: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self { move_overhead: 10 }
    }
}

fn main() -> std::io::Result<()> {
    env_logger::init();

    let explorer = Arc::new(RwLock::new(Explorer::new()));
    {
        let mut ex = explorer.write().unwrap();
        ex.cfg.debug_log = true;
    }
    let stop = explorer.read().unwrap().stop_handle();
    let mut options = Options::default();

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        debug!("uci> {}", line);
        let mut params = line.split_whitespace();

        match params.next().unwrap_or("") {
            "uci" => {
                println!("id name {} {}", NAME, VERSION);
                println!("id author the {} developers", NAME);
                println!("option name Hash type spin default 16 min 1 max 65536");
                println!(
                    "option name Threads type spin default 1 min 1 max {}",
                    num_threads_max()
                );
                println!("option name MultiPV type spin default 1 min 1 max 64");
                println!("option name MoveOverhead type spin default 10 min 0 max 10000");
                println!("option name EvalFile type string default <empty>");
                println!("option name UCI_AnalyseMode type check default false");
                println!("uciok");
            }
            "isready" => println!("readyok"),
            "ucinewgame" => {
                explorer.write().unwrap().clear_for_new_game();
            }
            "setoption" => {
                let rest: Vec<&str> = params.collect();
                if let Some((name, value)) = parse_setoption(&rest) {
                    apply_option(&explorer, &mut options, &name, &value);
                }
            }
            "position" => {
                let rest: Vec<&str> = params.collect();
                match parse_position(&rest) {
                    Ok((pos, history)) => {
                        explorer.write().unwrap().set_position(pos, history);
                    }
                    Err(e) => warn!("bad position command: {}", e),
                }
            }
            "go" => {
                let rest: Vec<&str> = params.collect();
                let limits = parse_go(&rest, options.move_overhead);
                stop.store(false, std::sync::atomic::Ordering::Relaxed);

                let explorer = explorer.clone();
                std::thread::spawn(move || {
                    let result = {
                        let mut ex = explorer.write().unwrap();
                        ex.search(&limits)
                    };
                    match result {
                        Ok(lines) => {
                            let best = lines.first();
                            match best.and_then(|l| l.moves.first()) {
                                Some(mv) => {
                                    let ponder = best
                                        .and_then(|l| l.moves.get(1))
                                        .map(|p| format!(" ponder {}", p))
                                        .unwrap_or_default();
                                    println!("bestmove {}{}", mv, ponder);
                                }
                                None => println!("bestmove (none)"),
                            }
                        }
                        Err(e) => {
                            warn!("search failed: {}", e);
                            println!("bestmove (none)");
                        }
                    }
                });
            }
            "stop" => {
                stop.store(true, std::sync::atomic::Ordering::Relaxed);
            }
            "quit" => break,
            other => debug!("ignoring unknown command: {}", other),
        }
    }

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    Ok(())
}

fn num_threads_max() -> usize {
    num_cpus_guess().max(1) * 2
}

fn num_cpus_guess() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn parse_setoption(tokens: &[&str]) -> Option<(String, String)> {
    let name_idx = tokens.iter().position(|&t| t == "name")? + 1;
    let value_idx = tokens.iter().position(|&t| t == "value");
    let name_end = value_idx.unwrap_or(tokens.len());
    let name = tokens[name_idx..name_end].join(" ");
    let value = match value_idx {
        Some(i) => tokens[i + 1..].join(" "),
        None => String::new(),
    };
    Some((name, value))
}

fn apply_option(
    explorer: &Arc<RwLock<Explorer>>,
    options: &mut Options,
    name: &str,
    value: &str,
) {
    match name.to_ascii_lowercase().as_str() {
        "hash" => {
            if let Ok(mb) = value.parse::<usize>() {
                explorer.write().unwrap().resize_tt(mb.clamp(1, 65536));
            }
        }
        "threads" => {
            if let Ok(n) = value.parse::<usize>() {
                explorer.write().unwrap().cfg.num_threads = n.clamp(1, num_threads_max());
            }
        }
        "multipv" => {
            if let Ok(n) = value.parse::<usize>() {
                explorer.write().unwrap().cfg.num_pv_lines = n.clamp(1, 64);
            }
        }
        "moveoverhead" => {
            if let Ok(ms) = value.parse::<u64>() {
                options.move_overhead = ms.min(10_000);
            }
        }
        "uci_analysemode" => {
            explorer.write().unwrap().cfg.analysis_mode = value == "true";
        }
        "evalfile" => {
            if value.is_empty() || value == "<empty>" {
                return;
            }
            // load failure is non-fatal, the engine keeps playing on the
            // hand-crafted evaluation
            let _ = explorer.write().unwrap().load_network(value);
        }
        other => debug!("ignoring unknown option: {}", other),
    }
}

fn parse_position(tokens: &[&str]) -> Result<(Position, Vec<u64>), String> {
    let mut pos;
    let mut idx;

    match tokens.first() {
        Some(&"startpos") => {
            pos = Position::startpos();
            idx = 1;
        }
        Some(&"fen") => {
            let end = tokens
                .iter()
                .position(|&t| t == "moves")
                .unwrap_or(tokens.len());
            let fen = tokens[1..end].join(" ");
            pos = Position::from_fen(&fen).map_err(|e| e.to_string())?;
            idx = end;
        }
        _ => return Err("expected 'startpos' or 'fen'".into()),
    }

    let mut history = Vec::new();
    if tokens.get(idx) == Some(&"moves") {
        idx += 1;
        for &token in &tokens[idx..] {
            let mv = ChessMove::from_str(token).map_err(|e| e.to_string())?;
            if !pos.move_is_legal(mv) {
                return Err(format!("illegal move {}", token));
            }
            history.push(pos.hash());
            pos = pos.do_move(mv).0;
        }
    }

    Ok((pos, history))
}

fn parse_go(tokens: &[&str], move_overhead: u64) -> SearchLimits {
    let mut limits = SearchLimits::default();
    let mut time = TimeSettings {
        move_overhead,
        ..Default::default()
    };
    let mut any_time = false;

    let mut iter = tokens.iter();
    while let Some(&token) = iter.next() {
        let mut next_u64 = || iter.next().and_then(|v| v.parse::<u64>().ok());
        match token {
            "depth" => {
                if let Some(d) = next_u64() {
                    limits.max_depth = (d as Depth).clamp(1, MAX_PLY as Depth - 1);
                }
            }
            "nodes" => limits.max_nodes = next_u64(),
            "movetime" => {
                time.move_time = next_u64();
                any_time |= time.move_time.is_some();
            }
            "wtime" => {
                time.wtime = next_u64();
                any_time |= time.wtime.is_some();
            }
            "btime" => {
                time.btime = next_u64();
                any_time |= time.btime.is_some();
            }
            "winc" => time.winc = next_u64(),
            "binc" => time.binc = next_u64(),
            "movestogo" => time.moves_to_go = next_u64().map(|v| v as u32),
            "infinite" => {
                time.infinite = true;
            }
            _ => {}
        }
    }

    time.infinite = time.infinite || !any_time;
    limits.time = time;
    limits
}
