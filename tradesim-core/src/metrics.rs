//! Run statistics as pure functions over closed trades and the equity curve.
//!
//! Ratios are fractions (0.55 = 55 %) unless the field name ends in `_pct`.
//! Every closed-trade record counts, partial closes included.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ClosedTrade;

/// Cap for profit factor when there are no losing trades.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

const PERIODS_PER_YEAR: f64 = 252.0;

/// Account snapshot recorded once per processed bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub balance: f64,
    pub equity: f64,
    /// Floating profit at the snapshot.
    pub profit: f64,
}

/// Aggregate trade statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStatistics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub net_profit: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub avg_win: f64,
    /// Positive magnitude.
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub return_pct: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub avg_duration_hours: f64,
}

impl TradeStatistics {
    pub fn from_trades(trades: &[ClosedTrade], initial_balance: f64) -> Self {
        if trades.is_empty() {
            return Self::default();
        }
        let profits: Vec<f64> = trades.iter().map(|t| t.profit).collect();
        let wins: Vec<f64> = profits.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = profits.iter().copied().filter(|p| *p < 0.0).collect();

        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().map(|l| l.abs()).sum();
        let net_profit: f64 = profits.iter().sum();
        let n = trades.len() as f64;

        let (max_consecutive_wins, max_consecutive_losses) = streaks(&profits);

        Self {
            total_trades: trades.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: wins.len() as f64 / n,
            net_profit,
            gross_profit,
            gross_loss,
            avg_win: mean_or_zero(&wins),
            avg_loss: if losses.is_empty() {
                0.0
            } else {
                gross_loss / losses.len() as f64
            },
            largest_win: wins.iter().copied().fold(0.0, f64::max),
            largest_loss: losses.iter().copied().fold(0.0, f64::min),
            profit_factor: profit_factor(gross_profit, gross_loss),
            expectancy: net_profit / n,
            return_pct: if initial_balance > 0.0 {
                net_profit / initial_balance * 100.0
            } else {
                0.0
            },
            max_consecutive_wins,
            max_consecutive_losses,
            avg_duration_hours: trades.iter().map(|t| t.duration_hours()).sum::<f64>() / n,
        }
    }
}

/// Drawdown summary of an equity curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawdownStats {
    /// Largest peak-to-trough decline, percent of the peak (positive number).
    pub max_drawdown_pct: f64,
    /// Largest peak-to-trough decline in account currency.
    pub max_drawdown_abs: f64,
    /// Longest time spent below a prior peak, in days.
    pub max_duration_days: f64,
}

impl DrawdownStats {
    pub fn from_curve(curve: &[EquityPoint]) -> Self {
        let Some(first) = curve.first() else {
            return Self::default();
        };
        let mut peak = first.equity;
        let mut peak_time = first.time;
        let mut stats = Self::default();

        for point in curve {
            if point.equity >= peak {
                peak = point.equity;
                peak_time = point.time;
                continue;
            }
            let dd_abs = peak - point.equity;
            stats.max_drawdown_abs = stats.max_drawdown_abs.max(dd_abs);
            if peak > 0.0 {
                stats.max_drawdown_pct = stats.max_drawdown_pct.max(dd_abs / peak * 100.0);
            }
            let days = (point.time - peak_time).num_seconds() as f64 / 86_400.0;
            stats.max_duration_days = stats.max_duration_days.max(days);
        }
        stats
    }
}

// ── Curve functions ─────────────────────────────────────────────────

/// Simple per-period returns. Periods starting from a non-positive value are skipped.
pub fn period_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Annualized Sharpe ratio of per-period returns, `sqrt(252)` scaling.
///
/// Returns 0.0 for fewer than two returns or zero variance.
pub fn sharpe_ratio(values: &[f64]) -> f64 {
    let returns = period_returns(values);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_or_zero(&returns) / std * PERIODS_PER_YEAR.sqrt()
}

/// Annualized Sortino ratio (downside deviation only).
pub fn sortino_ratio(values: &[f64]) -> f64 {
    let returns = period_returns(values);
    if returns.len() < 2 {
        return 0.0;
    }
    let downside: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r * r).sum();
    if downside <= 0.0 {
        return 0.0;
    }
    let downside_std = (downside / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean_or_zero(&returns) / downside_std * PERIODS_PER_YEAR.sqrt()
}

/// Gross profit / gross loss, capped at [`PROFIT_FACTOR_CAP`].
pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

// ── Helpers ─────────────────────────────────────────────────────────

pub(crate) fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_or_zero(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn streaks(profits: &[f64]) -> (usize, usize) {
    let (mut wins, mut losses, mut max_w, mut max_l) = (0, 0, 0, 0);
    for &p in profits {
        if p > 0.0 {
            wins += 1;
            losses = 0;
        } else if p < 0.0 {
            losses += 1;
            wins = 0;
        } else {
            wins = 0;
            losses = 0;
        }
        max_w = max_w.max(wins);
        max_l = max_l.max(losses);
    }
    (max_w, max_l)
}
