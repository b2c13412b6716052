//! Outcome of one backtest run.

use serde::{Deserialize, Serialize};

use crate::domain::ClosedTrade;
use crate::metrics::{sharpe_ratio, sortino_ratio, DrawdownStats, EquityPoint, TradeStatistics};

/// Signal funnel counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalCounts {
    pub generated: usize,
    pub executed: usize,
    pub rejected: usize,
    /// Resting orders the driver cancelled after price moved away.
    pub orders_cancelled: usize,
}

impl SignalCounts {
    /// Executed signals as percent of generated ones.
    pub fn execution_rate_pct(&self) -> f64 {
        if self.generated == 0 {
            0.0
        } else {
            self.executed as f64 / self.generated as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub initial_balance: f64,
    pub final_balance: f64,
    pub final_equity: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<ClosedTrade>,
    pub statistics: TradeStatistics,
    pub drawdown: DrawdownStats,
    pub sharpe_ratio: f64,
    /// Like `sharpe_ratio`, but only losing bars count as risk.
    pub sortino_ratio: f64,
    pub signals: SignalCounts,
    pub bars_processed: usize,
    pub bars_skipped: usize,
    /// Equity hit zero before the data ran out.
    pub stopped_early: bool,
}

impl RunResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build(
        initial_balance: f64,
        final_balance: f64,
        final_equity: f64,
        equity_curve: Vec<EquityPoint>,
        trades: Vec<ClosedTrade>,
        signals: SignalCounts,
        bars_processed: usize,
        bars_skipped: usize,
        stopped_early: bool,
    ) -> Self {
        let statistics = TradeStatistics::from_trades(&trades, initial_balance);
        let drawdown = DrawdownStats::from_curve(&equity_curve);
        let equity: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
        Self {
            initial_balance,
            final_balance,
            final_equity,
            sharpe_ratio: sharpe_ratio(&equity),
            sortino_ratio: sortino_ratio(&equity),
            equity_curve,
            trades,
            statistics,
            drawdown,
            signals,
            bars_processed,
            bars_skipped,
            stopped_early,
        }
    }

    pub fn net_profit(&self) -> f64 {
        self.final_balance - self.initial_balance
    }

    pub fn return_pct(&self) -> f64 {
        if self.initial_balance > 0.0 {
            self.net_profit() / self.initial_balance * 100.0
        } else {
            0.0
        }
    }
}
