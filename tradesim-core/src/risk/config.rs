//! Risk sizer configuration. Percentages are in percent (0.5 = 0.5 %).

use serde::{Deserialize, Serialize};

/// Consecutive losses that block new trades.
pub const LOSS_STREAK_BLOCK: u32 = 3;
/// Consecutive losses that halt trading altogether.
pub const LOSS_STREAK_HALT: u32 = 5;
/// Drawdown from peak balance, in percent, that halts trading.
pub const HALT_DRAWDOWN_PCT: f64 = 20.0;
/// Hard ceiling on the fractional Kelly size (5 % of capital).
pub const KELLY_CAP: f64 = 0.05;
/// Rolling trade-outcome window.
pub const TRADE_HISTORY_LEN: usize = 100;

pub const SCALING_MIN: f64 = 0.3;
pub const SCALING_MAX: f64 = 1.5;
pub const SCALING_WIN_MULT: f64 = 1.05;
pub const SCALING_LOSS_MULT: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub base_risk_pct: f64,
    pub max_daily_loss_pct: f64,
    pub max_weekly_loss_pct: f64,
    pub max_monthly_loss_pct: f64,
    /// Ceiling on open risk plus the new trade's risk, percent of balance.
    pub max_portfolio_exposure: f64,
    /// Notional cap for a single position, percent of balance.
    pub max_single_position_pct: f64,
    pub kelly_fraction: f64,
    pub min_trades_for_kelly: usize,
    /// Starting value of the adaptive scaling factor.
    pub risk_scaling_factor: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            base_risk_pct: 0.5,
            max_daily_loss_pct: 5.0,
            max_weekly_loss_pct: 10.0,
            max_monthly_loss_pct: 15.0,
            max_portfolio_exposure: 10.0,
            max_single_position_pct: 2.0,
            kelly_fraction: 0.25,
            min_trades_for_kelly: 20,
            risk_scaling_factor: 1.0,
        }
    }
}
