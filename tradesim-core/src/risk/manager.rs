//! RiskManager: position sizing, trade eligibility and halt conditions.
//!
//! Sizing combines a base risk percentage (or fractional Kelly once enough
//! outcomes are known) with a volatility adjustment and an adaptive scaling
//! factor that grows after wins and shrinks after losses. Loss limits are
//! tracked per calendar day, ISO week and month of simulation time.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::{
    RiskConfig, HALT_DRAWDOWN_PCT, LOSS_STREAK_BLOCK, LOSS_STREAK_HALT, SCALING_LOSS_MULT,
    SCALING_MAX, SCALING_MIN, SCALING_WIN_MULT,
};
use super::kelly::{calculate_kelly_criterion, TradeHistory, TradeOutcome};
use crate::domain::{ClosedTrade, SymbolSpec, Ticket};

/// Reward:risk assumed when a request carries no take-profit.
pub const DEFAULT_REWARD_RISK: f64 = 2.0;

/// Outcomes counted towards `RiskMetrics::total_exposure`.
const EXPOSURE_WINDOW: usize = 10;

// ── Sizing ──────────────────────────────────────────────────────────

/// Inputs to [`RiskManager::calculate_position_size`].
#[derive(Debug, Clone, PartialEq)]
pub struct SizingRequest {
    pub symbol: String,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub balance: f64,
    /// Current volatility relative to normal (1.0 = normal).
    pub volatility: f64,
    /// Explicit edge estimate `(win_rate, avg_win, avg_loss)`; overrides the
    /// rolling history once Kelly sizing is enabled.
    pub edge: Option<(f64, f64, f64)>,
}

impl SizingRequest {
    pub fn new(symbol: impl Into<String>, entry_price: f64, stop_loss: f64, balance: f64) -> Self {
        Self {
            symbol: symbol.into(),
            entry_price,
            stop_loss,
            take_profit: None,
            balance,
            volatility: 1.0,
            edge: None,
        }
    }

    pub fn with_take_profit(mut self, tp: f64) -> Self {
        self.take_profit = Some(tp);
        self
    }

    pub fn with_volatility(mut self, factor: f64) -> Self {
        self.volatility = factor;
        self
    }

    pub fn with_edge(mut self, win_rate: f64, avg_win: f64, avg_loss: f64) -> Self {
        self.edge = Some((win_rate, avg_win, avg_loss));
        self
    }
}

/// Sizing decision for one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRisk {
    pub symbol: String,
    pub entry_price: f64,
    pub stop_loss: f64,
    /// Size in units of the underlying.
    pub position_size: f64,
    /// Money lost if the stop is hit.
    pub risk_amount: f64,
    /// `risk_amount` as percent of balance.
    pub risk_percentage: f64,
    pub reward_risk_ratio: f64,
    /// Fractional Kelly stake used, 0 when base risk was used.
    pub kelly_fraction: f64,
}

impl PositionRisk {
    /// Size in broker lots, normalised to the symbol's lot grid.
    ///
    /// Falls back to the minimum lot when the computed size is unusable.
    pub fn lots(&self, spec: &SymbolSpec) -> f64 {
        let raw = self.position_size / spec.contract_size;
        let lots = spec.normalize_volume_or_min(raw);
        if lots != raw {
            debug!(raw, lots, symbol = %spec.symbol, "position size normalised to lot grid");
        }
        lots
    }
}

// ── Eligibility ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskRejection {
    #[error("invalid account balance: {0}")]
    InvalidBalance(f64),

    #[error("daily loss limit reached: {0:.2}%")]
    DailyLossLimit(f64),

    #[error("weekly loss limit reached: {0:.2}%")]
    WeeklyLossLimit(f64),

    #[error("monthly loss limit reached: {0:.2}%")]
    MonthlyLossLimit(f64),

    #[error("portfolio exposure limit exceeded: {0:.2}%")]
    ExposureLimit(f64),

    #[error("too many consecutive losses: {0}")]
    ConsecutiveLosses(u32),

    #[error("risk scaled down due to poor performance: {0:.2}")]
    ScalingTooLow(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HaltReason {
    #[error("maximum drawdown exceeded: {0:.2}%")]
    Drawdown(f64),

    #[error("daily loss limit: {0:.2}%")]
    DailyLoss(f64),

    #[error("too many consecutive losses: {0}")]
    ConsecutiveLosses(u32),
}

/// Portfolio statistics over the rolling outcome window.
///
/// Percent fields (`max_drawdown`, `win_rate`, `kelly_percentage`) are in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub total_exposure: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub kelly_percentage: f64,
}

// ── RiskManager ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeriodMarks {
    day: NaiveDate,
    week: (i32, u32),
    month: (i32, u32),
}

impl PeriodMarks {
    fn at(now: DateTime<Utc>) -> Self {
        let iso = now.iso_week();
        Self {
            day: now.date_naive(),
            week: (iso.year(), iso.week()),
            month: (now.year(), now.month()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    daily_pnl: f64,
    weekly_pnl: f64,
    monthly_pnl: f64,
    peak_balance: f64,
    marks: Option<PeriodMarks>,
    history: TradeHistory,
    consecutive_losses: u32,
    scaling: f64,
    open_risk: BTreeMap<Ticket, f64>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        let scaling = config.risk_scaling_factor;
        Self {
            config,
            daily_pnl: 0.0,
            weekly_pnl: 0.0,
            monthly_pnl: 0.0,
            peak_balance: 0.0,
            marks: None,
            history: TradeHistory::new(),
            consecutive_losses: 0,
            scaling,
            open_risk: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl
    }

    pub fn weekly_pnl(&self) -> f64 {
        self.weekly_pnl
    }

    pub fn monthly_pnl(&self) -> f64 {
        self.monthly_pnl
    }

    pub fn peak_balance(&self) -> f64 {
        self.peak_balance
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    pub fn risk_scaling_factor(&self) -> f64 {
        self.scaling
    }

    pub fn history(&self) -> &TradeHistory {
        &self.history
    }

    /// Fractional Kelly with this manager's `kelly_fraction`.
    pub fn kelly(&self, win_rate: f64, avg_win: f64, avg_loss: f64) -> f64 {
        calculate_kelly_criterion(win_rate, avg_win, avg_loss, self.config.kelly_fraction)
    }

    pub fn calculate_position_size(&self, req: &SizingRequest) -> Option<PositionRisk> {
        let balance = req.balance;
        if !(balance.is_finite() && balance > 0.0) {
            warn!(balance, "invalid account balance for sizing");
            return None;
        }
        if !(req.entry_price.is_finite() && req.entry_price > 0.0 && req.stop_loss.is_finite()) {
            warn!(entry = req.entry_price, sl = req.stop_loss, "invalid prices for sizing");
            return None;
        }
        let risk_per_unit = (req.entry_price - req.stop_loss).abs();
        if risk_per_unit == 0.0 {
            warn!(entry = req.entry_price, "stop loss equals entry price");
            return None;
        }

        let volatility = if req.volatility.is_finite() { req.volatility } else { 1.0 };
        let vol_adjust = (1.0 / volatility.max(0.5)).min(2.0);

        let kelly = if self.history.len() >= self.config.min_trades_for_kelly {
            let (w, aw, al) = req.edge.unwrap_or_else(|| {
                (self.history.win_rate(), self.history.avg_win(), self.history.avg_loss())
            });
            self.kelly(w, aw, al)
        } else {
            0.0
        };

        let mut risk_amount = if kelly > 0.0 {
            balance * kelly * vol_adjust
        } else {
            balance * self.config.base_risk_pct / 100.0 * vol_adjust
        };
        risk_amount *= self.scaling;

        let mut position_size = risk_amount / risk_per_unit;

        let max_value = balance * self.config.max_single_position_pct / 100.0;
        if position_size * req.entry_price > max_value {
            position_size = max_value / req.entry_price;
            risk_amount = position_size * risk_per_unit;
        }

        let reward_risk_ratio = req
            .take_profit
            .filter(|tp| tp.is_finite() && *tp > 0.0)
            .map(|tp| (tp - req.entry_price).abs() / risk_per_unit)
            .unwrap_or(DEFAULT_REWARD_RISK);

        let risk = PositionRisk {
            symbol: req.symbol.clone(),
            entry_price: req.entry_price,
            stop_loss: req.stop_loss,
            position_size,
            risk_amount,
            risk_percentage: risk_amount / balance * 100.0,
            reward_risk_ratio,
            kelly_fraction: kelly,
        };
        debug!(
            size = risk.position_size,
            risk = risk.risk_amount,
            risk_pct = risk.risk_percentage,
            kelly,
            scaling = self.scaling,
            "position sized"
        );
        Some(risk)
    }

    /// First failing check wins.
    pub fn can_take_trade(
        &self,
        balance: f64,
        current_exposure: f64,
        new_risk: f64,
    ) -> Result<(), RiskRejection> {
        if !(balance.is_finite() && balance > 0.0) {
            return Err(RiskRejection::InvalidBalance(balance));
        }

        let limits: [(f64, f64, fn(f64) -> RiskRejection); 3] = [
            (self.daily_pnl, self.config.max_daily_loss_pct, RiskRejection::DailyLossLimit),
            (self.weekly_pnl, self.config.max_weekly_loss_pct, RiskRejection::WeeklyLossLimit),
            (self.monthly_pnl, self.config.max_monthly_loss_pct, RiskRejection::MonthlyLossLimit),
        ];
        for (pnl, limit, rejection) in limits {
            let loss_pct = pnl.abs() / balance * 100.0;
            if pnl < 0.0 && loss_pct >= limit {
                return Err(rejection(loss_pct));
            }
        }

        let exposure_pct = (current_exposure + new_risk) / balance * 100.0;
        if exposure_pct > self.config.max_portfolio_exposure {
            return Err(RiskRejection::ExposureLimit(exposure_pct));
        }
        if self.consecutive_losses >= LOSS_STREAK_BLOCK {
            return Err(RiskRejection::ConsecutiveLosses(self.consecutive_losses));
        }
        if self.scaling < SCALING_MIN {
            return Err(RiskRejection::ScalingTooLow(self.scaling));
        }
        Ok(())
    }

    pub fn should_halt_trading(&self, balance: f64) -> Option<HaltReason> {
        if self.peak_balance > 0.0 {
            let dd = (self.peak_balance - balance) / self.peak_balance * 100.0;
            if dd > HALT_DRAWDOWN_PCT {
                return Some(HaltReason::Drawdown(dd));
            }
        }
        if self.daily_pnl < 0.0 && balance > 0.0 {
            let loss_pct = self.daily_pnl.abs() / balance * 100.0;
            if loss_pct >= self.config.max_daily_loss_pct {
                return Some(HaltReason::DailyLoss(loss_pct));
            }
        }
        if self.consecutive_losses >= LOSS_STREAK_HALT {
            return Some(HaltReason::ConsecutiveLosses(self.consecutive_losses));
        }
        None
    }

    /// Reset period P&L when `now` enters a new day, ISO week or month.
    ///
    /// The peak balance is raised on the first call and on every day change.
    pub fn roll_periods(&mut self, now: DateTime<Utc>, balance: f64) {
        let current = PeriodMarks::at(now);
        let Some(prev) = self.marks.replace(current) else {
            self.raise_peak(balance);
            return;
        };
        if current.day != prev.day {
            self.daily_pnl = 0.0;
            self.raise_peak(balance);
        }
        if current.week != prev.week {
            self.weekly_pnl = 0.0;
        }
        if current.month != prev.month {
            self.monthly_pnl = 0.0;
        }
    }

    fn raise_peak(&mut self, balance: f64) {
        if balance.is_finite() && balance > self.peak_balance {
            self.peak_balance = balance;
        }
    }

    /// Remember the money at risk on a freshly opened ticket.
    pub fn register_open(&mut self, ticket: Ticket, risk_amount: f64) {
        self.open_risk.insert(ticket, risk_amount.max(0.0));
    }

    /// Forget a ticket that never became a position (expired or cancelled order).
    pub fn release(&mut self, ticket: Ticket) {
        self.open_risk.remove(&ticket);
    }

    /// Risk still carried by open tickets.
    pub fn open_exposure(&self) -> f64 {
        self.open_risk.values().sum()
    }

    /// Feed a closed trade. Every record moves period P&L; a final close also
    /// updates the loss streak, the scaling factor and the outcome window.
    pub fn record_trade(&mut self, trade: &ClosedTrade) {
        self.daily_pnl += trade.profit;
        self.weekly_pnl += trade.profit;
        self.monthly_pnl += trade.profit;

        if trade.is_partial() {
            return;
        }

        let risk_amount = self.open_risk.remove(&trade.ticket).unwrap_or(0.0);
        let outcome = TradeOutcome::from_trade(trade, risk_amount);
        self.history.push(outcome);

        if outcome.is_win() {
            self.consecutive_losses = 0;
            self.scaling = (self.scaling * SCALING_WIN_MULT).min(SCALING_MAX);
        } else {
            self.consecutive_losses += 1;
            self.scaling = (self.scaling * SCALING_LOSS_MULT).max(SCALING_MIN);
            if self.consecutive_losses >= LOSS_STREAK_BLOCK {
                info!(streak = self.consecutive_losses, "loss streak blocks new trades");
            }
        }
        debug!(
            ticket = %trade.ticket,
            profit = trade.profit,
            scaling = self.scaling,
            streak = self.consecutive_losses,
            "risk state updated"
        );
    }

    pub fn portfolio_metrics(&self, balance: f64) -> RiskMetrics {
        if self.history.len() < 2 {
            return RiskMetrics::default();
        }
        if !(balance.is_finite() && balance > 0.0) {
            warn!(balance, "invalid account balance for metrics");
            return RiskMetrics::default();
        }

        let profits = self.history.profits();
        let win_rate = self.history.win_rate();
        let avg_win = self.history.avg_win();
        let avg_loss = self.history.avg_loss();

        let mut running = balance;
        let mut peak = balance;
        let mut max_dd: f64 = 0.0;
        for p in &profits {
            running += p;
            peak = peak.max(running);
            if peak > 0.0 {
                max_dd = max_dd.max((peak - running) / peak);
            }
        }

        let returns: Vec<f64> = profits.iter().map(|p| p / balance).collect();
        let mean_ret = returns.iter().sum::<f64>() / returns.len() as f64;
        let sd = population_std(&returns);
        let sharpe = if sd > 0.0 { mean_ret / sd } else { 0.0 };

        let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        let sortino = if downside.is_empty() {
            sharpe
        } else {
            let dsd = population_std(&downside);
            if dsd > 0.0 {
                mean_ret / dsd
            } else {
                0.0
            }
        };

        let total_wins: f64 = profits.iter().filter(|p| **p > 0.0).sum();
        let total_losses: f64 = profits.iter().filter(|p| **p <= 0.0).sum::<f64>().abs();
        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else {
            0.0
        };

        RiskMetrics {
            total_exposure: self.history.recent_risk(EXPOSURE_WINDOW),
            max_drawdown: max_dd * 100.0,
            sharpe_ratio: sharpe,
            sortino_ratio: sortino,
            win_rate: win_rate * 100.0,
            avg_win,
            avg_loss,
            profit_factor,
            expectancy: win_rate * avg_win - (1.0 - win_rate) * avg_loss,
            kelly_percentage: self.kelly(win_rate, avg_win, avg_loss) * 100.0,
        }
    }
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}
