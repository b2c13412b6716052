//! Single-run orchestration: config + bars + signal source → result.
//!
//! Slippage is seeded from the config's master seed and the run's content
//! hash, so a given config replays identically no matter where it runs.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use tradesim_core::domain::Bar;
use tradesim_core::engine::{Backtest, EngineError, RunResult, SignalSource};
use tradesim_core::rng::RngHierarchy;

use crate::config::{ConfigError, RunConfig, RunId};
use crate::data_loader::load_bars;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("no bars to replay")]
    NoBars,
}

/// Result of one run, tagged with the config that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub seed: u64,
    pub signal_source: String,
    pub result: RunResult,
}

/// Run one backtest over pre-loaded bars.
pub fn run_single(
    config: &RunConfig,
    bars: &[Bar],
    signals: &mut dyn SignalSource,
) -> Result<RunReport, RunError> {
    config.validate()?;
    if bars.is_empty() {
        return Err(RunError::NoBars);
    }

    let run_id = config.run_id();
    let slippage = RngHierarchy::new(config.seed).slippage_for(&run_id, 0);
    let mut backtest = Backtest::new(
        config.engine.clone(),
        config.symbol.clone(),
        config.broker.clone(),
        config.position.clone(),
        config.risk.clone(),
        Box::new(slippage),
    )?;

    let result = backtest.run(bars, signals);
    info!(
        run_id = %&run_id[..12],
        trades = result.trades.len(),
        return_pct = result.return_pct(),
        max_drawdown_pct = result.drawdown.max_drawdown_pct,
        "run complete"
    );
    Ok(RunReport {
        run_id,
        seed: config.seed,
        signal_source: signals.name().to_string(),
        result,
    })
}

/// Load a TOML config and a CSV of bars, then run.
pub fn run_from_files(
    config_path: &Path,
    bars_path: &Path,
    signals: &mut dyn SignalSource,
) -> anyhow::Result<RunReport> {
    let config = RunConfig::load(config_path)
        .with_context(|| format!("loading run config {}", config_path.display()))?;
    let loaded = load_bars(bars_path)
        .with_context(|| format!("loading bars {}", bars_path.display()))?;
    let report = run_single(&config, &loaded.bars, signals)?;
    Ok(report)
}
