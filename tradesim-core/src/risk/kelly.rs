//! Fractional Kelly sizing and the rolling trade-outcome window feeding it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::{KELLY_CAP, TRADE_HISTORY_LEN};
use crate::domain::ClosedTrade;

/// Fractional Kelly stake as a fraction of capital, clamped to `[0, KELLY_CAP]`.
///
/// ```text
/// kelly = (w * avg_win - (1 - w) * avg_loss) / avg_win
/// stake = clamp(kelly * fraction, 0, 0.05)
/// ```
///
/// `avg_loss` is a positive magnitude. Returns 0 when `win_rate` is outside
/// (0, 1) or either average is not a positive finite number.
pub fn calculate_kelly_criterion(win_rate: f64, avg_win: f64, avg_loss: f64, fraction: f64) -> f64 {
    let usable = win_rate > 0.0
        && win_rate < 1.0
        && avg_win.is_finite()
        && avg_win > 0.0
        && avg_loss.is_finite()
        && avg_loss > 0.0;
    if !usable || !fraction.is_finite() {
        return 0.0;
    }
    let loss_rate = 1.0 - win_rate;
    let kelly = (win_rate * avg_win - loss_rate * avg_loss) / avg_win;
    let stake = kelly * fraction;
    if stake.is_nan() {
        return 0.0;
    }
    stake.clamp(0.0, KELLY_CAP)
}

/// One completed trade as seen by the risk sizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub time: DateTime<Utc>,
    pub profit: f64,
    /// Money at risk when the trade was opened, if known.
    pub risk_amount: f64,
}

impl TradeOutcome {
    pub fn from_trade(trade: &ClosedTrade, risk_amount: f64) -> Self {
        Self {
            time: trade.close_time,
            profit: trade.profit,
            risk_amount,
        }
    }

    pub fn is_win(&self) -> bool {
        self.profit > 0.0
    }
}

/// Bounded FIFO of the most recent trade outcomes.
#[derive(Debug, Clone, Default)]
pub struct TradeHistory {
    outcomes: VecDeque<TradeOutcome>,
}

impl TradeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: TradeOutcome) {
        if self.outcomes.len() == TRADE_HISTORY_LEN {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TradeOutcome> {
        self.outcomes.iter()
    }

    pub fn profits(&self) -> Vec<f64> {
        self.outcomes.iter().map(|o| o.profit).collect()
    }

    pub fn win_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let wins = self.outcomes.iter().filter(|o| o.is_win()).count();
        wins as f64 / self.outcomes.len() as f64
    }

    pub fn avg_win(&self) -> f64 {
        mean(self.outcomes.iter().filter(|o| o.is_win()).map(|o| o.profit))
    }

    /// Mean losing profit as a positive magnitude. Break-even trades count as losses.
    pub fn avg_loss(&self) -> f64 {
        mean(self.outcomes.iter().filter(|o| !o.is_win()).map(|o| o.profit)).abs()
    }

    /// Summed risk of the last `n` outcomes.
    pub fn recent_risk(&self, n: usize) -> f64 {
        self.outcomes.iter().rev().take(n).map(|o| o.risk_amount).sum()
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
