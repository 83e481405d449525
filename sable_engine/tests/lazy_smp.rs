use sable_engine::explore::Explorer;
use sable_engine::position::Position;
use sable_engine::tablebase::{TablebaseProbe, Wdl};
use sable_engine::timer::{SearchLimits, TimeSettings};

use chess::ChessMove;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn four_threads_agree_on_an_obvious_capture() {
    // white wins a hanging queen
    let fen = "rnb1kbnr/pppp1ppp/8/4q3/8/2N5/PPPP1PPP/R1BQKBNR w KQkq - 0 1";

    let mut ex = Explorer::new();
    ex.cfg.num_threads = 4;
    ex.set_position(Position::from_fen(fen).unwrap(), vec![]);
    let result = ex.search(&SearchLimits::depth(7)).unwrap();

    let best = result[0].moves.first().copied().unwrap();
    assert!(
        format!("{}", best).ends_with("e5"),
        "did not take the queen: {}",
        best
    );
    assert!(result[0].score > 500);
}

#[test]
fn helpers_share_the_table_without_corrupting_results() {
    let mut single = Explorer::new();
    single.set_position(Position::startpos(), vec![]);
    let expected = single.search(&SearchLimits::depth(6)).unwrap();

    let mut smp = Explorer::new();
    smp.cfg.num_threads = 4;
    smp.set_position(Position::startpos(), vec![]);
    let got = smp.search(&SearchLimits::depth(6)).unwrap();

    // lazy SMP is nondeterministic, but both must produce a legal move and
    // sane, same-ballpark scores
    let pos = Position::startpos();
    assert!(pos.move_is_legal(*got[0].moves.first().unwrap()));
    assert!((expected[0].score - got[0].score).abs() < 300);
}

#[test]
fn fixed_move_time_returns_promptly() {
    let mut ex = Explorer::new();
    ex.cfg.num_threads = 2;
    ex.set_position(Position::startpos(), vec![]);

    let mut limits = SearchLimits::default();
    limits.time = TimeSettings::fixed_move_time(150);

    let t0 = Instant::now();
    let result = ex.search(&limits).unwrap();
    let elapsed = t0.elapsed();

    assert!(!result[0].moves.is_empty());
    assert!(
        elapsed < Duration::from_millis(2500),
        "search overran: {:?}",
        elapsed
    );
}

#[test]
fn stop_flag_aborts_an_infinite_search() {
    let mut ex = Explorer::new();
    ex.set_position(Position::startpos(), vec![]);
    let stop = ex.stop_handle();

    let handle = std::thread::spawn(move || {
        let result = ex.search(&SearchLimits::default()).unwrap();
        result[0].moves.first().copied()
    });

    std::thread::sleep(Duration::from_millis(300));
    stop.store(true, std::sync::atomic::Ordering::Relaxed);

    let best = handle.join().unwrap();
    assert!(best.is_some());
}

struct AlwaysWinOracle;

impl TablebaseProbe for AlwaysWinOracle {
    fn max_pieces(&self) -> u32 {
        5
    }
    fn probe_wdl(&self, pos: &Position) -> Option<Wdl> {
        // pretend perfect knowledge: the side with the rook wins
        let stm = pos.side_to_move();
        let has_rook = pos.get(chess::Piece::Rook, stm) != chess::EMPTY;
        Some(if has_rook { Wdl::Win } else { Wdl::Loss })
    }
    fn probe_best_move(&self, pos: &Position) -> Option<(Wdl, ChessMove)> {
        let mv = ChessMove::from_str("a2a7").ok()?;
        if pos.move_is_legal(mv) {
            Some((Wdl::Win, mv))
        } else {
            None
        }
    }
}

#[test]
fn root_tablebase_restricts_the_move_choice() {
    let mut ex = Explorer::new();
    ex.set_tablebase(Arc::new(AlwaysWinOracle));
    ex.set_position(
        Position::from_fen("7k/8/8/8/8/8/R7/K7 w - - 0 1").unwrap(),
        vec![],
    );
    let result = ex.search(&SearchLimits::depth(5)).unwrap();

    assert_eq!(
        result[0].moves.first().copied(),
        Some(ChessMove::from_str("a2a7").unwrap())
    );
    assert!(result[0].tb_score.unwrap() > 0);
}
