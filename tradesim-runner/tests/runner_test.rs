//! File-based runs: TOML config and CSV bars on disk.

use std::fmt::Write as _;
use std::path::Path;

use tradesim_core::domain::Side;
use tradesim_core::engine::{NullSignal, ScriptedSignals, SignalSource, TradeSignal};
use tradesim_runner::{
    load_bars, run_from_files, ConfigError, LoadError, ParamSweep, RunConfig, SweepGrid,
};

const CONFIG: &str = r#"
seed = 21

[engine]
signal_check_interval = 1
close_on_finish = true

[engine.quote_model]
type = "FLAT"

[broker]
initial_balance = 25000.0
commission_per_lot = 1.0

[position.trailing]
mode = "DISABLED"

[risk]
base_risk_pct = 1.0
max_single_position_pct = 1000.0
"#;

fn write_bars(path: &Path, n: usize) {
    let mut csv = String::from("time,open,high,low,close,volume\n");
    for i in 0..n {
        let close = 100.0 + (i as f64 * 0.4).sin() * 3.0;
        let time = 1_704_067_200 + i as i64 * 3600;
        writeln!(
            csv,
            "{time},{close:.4},{:.4},{:.4},{close:.4},5",
            close + 1.0,
            close - 1.0
        )
        .unwrap();
    }
    std::fs::write(path, csv).unwrap();
}

fn script() -> ScriptedSignals {
    ScriptedSignals::new(vec![
        (1, TradeSignal::market(Side::Buy, 101.0, 98.0, Some(104.0))),
        (12, TradeSignal::market(Side::Sell, 99.0, 102.0, None)),
    ])
}

#[test]
fn run_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("run.toml");
    let bars_path = dir.path().join("bars.csv");
    std::fs::write(&config_path, CONFIG).unwrap();
    write_bars(&bars_path, 30);

    let report = run_from_files(&config_path, &bars_path, &mut script()).unwrap();
    let config = RunConfig::load(&config_path).unwrap();

    assert_eq!(report.run_id, config.run_id());
    assert_eq!(report.seed, 21);
    assert_eq!(report.result.initial_balance, 25_000.0);
    assert_eq!(report.result.bars_processed, 30);
    assert!(!report.result.trades.is_empty());

    // close_on_finish leaves nothing open
    let realised: f64 = report.result.trades.iter().map(|t| t.profit).sum();
    assert!((report.result.final_balance - (25_000.0 + realised)).abs() < 1e-6);
    assert!((report.result.final_balance - report.result.final_equity).abs() < 1e-9);
}

#[test]
fn report_serializes_to_json() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("run.toml");
    let bars_path = dir.path().join("bars.csv");
    std::fs::write(&config_path, CONFIG).unwrap();
    write_bars(&bars_path, 10);

    let report = run_from_files(&config_path, &bars_path, &mut NullSignal).unwrap();
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains(&report.run_id));
}

#[test]
fn missing_files_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(matches!(
        RunConfig::load(&missing),
        Err(ConfigError::Io { .. })
    ));
    assert!(matches!(
        load_bars(&dir.path().join("nope.csv")),
        Err(LoadError::Io { .. })
    ));

    let bars_path = dir.path().join("bars.csv");
    write_bars(&bars_path, 5);
    let err = run_from_files(&missing, &bars_path, &mut NullSignal).unwrap_err();
    assert!(err.to_string().contains("loading run config"));
}

#[test]
fn sweep_over_loaded_bars() {
    let dir = tempfile::tempdir().unwrap();
    let bars_path = dir.path().join("bars.csv");
    write_bars(&bars_path, 40);
    let loaded = load_bars(&bars_path).unwrap();
    let base = RunConfig::from_toml_str(CONFIG).unwrap();

    let grid = SweepGrid {
        break_even_activation_pct: vec![0.3, 1.0],
        base_risk_pct: vec![0.5, 1.0],
        ..SweepGrid::from_base(&base)
    };
    let results = ParamSweep::new()
        .sweep(&grid, &base, &loaded.bars, || -> Box<dyn SignalSource> {
            Box::new(script())
        })
        .unwrap();

    assert_eq!(results.len(), 4);
    assert!(results.all().iter().all(|o| o.result.bars_processed == 40));
}
