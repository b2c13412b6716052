//! ManagedPosition, the position manager's richer view of one ticket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::{Position, Side, Ticket};

/// Fallback initial risk when the fill carries no usable stop and no ATR: 1 % of entry.
pub const FALLBACK_RISK_FRACTION: f64 = 0.01;

#[derive(Debug, Error, PartialEq)]
pub enum ManagedPositionError {
    #[error("position {0}: entry price must be positive and finite, got {1}")]
    InvalidEntry(Ticket, f64),

    #[error("position {0}: volume must be positive and finite, got {1}")]
    InvalidVolume(Ticket, f64),
}

/// Everything known about a position at fill time.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFill {
    pub ticket: Ticket,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub volume: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub open_time: DateTime<Utc>,
    /// ATR reading at fill, if any.
    pub atr: Option<f64>,
}

impl PositionFill {
    pub fn from_position(position: &Position, atr: Option<f64>) -> Self {
        Self {
            ticket: position.ticket,
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.open_price,
            volume: position.volume,
            sl: position.sl,
            tp: position.tp,
            open_time: position.open_time,
            atr,
        }
    }
}

/// How `initial_risk_points` was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskSource {
    StopLoss,
    Atr,
    EntryFraction,
}

/// Per-ticket state owned by the position manager.
///
/// Profit "points" are price units in the position's favour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedPosition {
    pub ticket: Ticket,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub current_price: f64,
    pub volume: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub open_time: DateTime<Utc>,
    pub profit_pct: f64,
    pub highest_price: f64,
    pub lowest_price: f64,
    pub break_even_activated: bool,
    /// Consumed partial-profit thresholds, in the order they fired.
    pub partial_levels_taken: Vec<f64>,
    pub max_profit_reached: f64,
    pub max_loss_reached: f64,
    /// Entry-to-stop distance at open. Fixed for the position's lifetime, always > 0.
    pub initial_risk_points: f64,
    pub risk_source: RiskSource,
    /// MFE high-water mark. Never decreases.
    pub best_profit_points: f64,
    pub best_profit_price: f64,
    pub bars_since_new_best: u32,
    pub atr_at_entry: Option<f64>,
    pub current_atr: Option<f64>,
}

impl ManagedPosition {
    pub fn new(fill: PositionFill) -> Result<Self, ManagedPositionError> {
        let entry = fill.entry_price;
        if !(entry.is_finite() && entry > 0.0) {
            return Err(ManagedPositionError::InvalidEntry(fill.ticket, entry));
        }
        if !(fill.volume.is_finite() && fill.volume > 0.0) {
            return Err(ManagedPositionError::InvalidVolume(fill.ticket, fill.volume));
        }

        let atr = fill.atr.filter(|a| a.is_finite() && *a > 0.0);
        let sl_distance = fill
            .sl
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(|s| (entry - s).abs())
            .filter(|d| *d > 0.0);

        let (initial_risk_points, risk_source) = match (sl_distance, atr) {
            (Some(d), _) => (d, RiskSource::StopLoss),
            (None, Some(a)) => {
                warn!(ticket = %fill.ticket, atr = a, "no usable stop at fill, risk taken from ATR");
                (a, RiskSource::Atr)
            }
            (None, None) => {
                warn!(ticket = %fill.ticket, "no usable stop or ATR at fill, risk taken as 1% of entry");
                (entry * FALLBACK_RISK_FRACTION, RiskSource::EntryFraction)
            }
        };

        Ok(Self {
            ticket: fill.ticket,
            symbol: fill.symbol,
            side: fill.side,
            entry_price: entry,
            current_price: entry,
            volume: fill.volume,
            sl: fill.sl.filter(|s| s.is_finite() && *s > 0.0),
            tp: fill.tp.filter(|t| t.is_finite() && *t > 0.0),
            open_time: fill.open_time,
            profit_pct: 0.0,
            highest_price: entry,
            lowest_price: entry,
            break_even_activated: false,
            partial_levels_taken: Vec::new(),
            max_profit_reached: 0.0,
            max_loss_reached: 0.0,
            initial_risk_points,
            risk_source,
            best_profit_points: 0.0,
            best_profit_price: entry,
            bars_since_new_best: 0,
            atr_at_entry: atr,
            current_atr: atr,
        })
    }

    /// Favourable move from entry at `price`, in price units.
    pub fn profit_points_at(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.side.sign()
    }

    pub fn profit_points(&self) -> f64 {
        self.profit_points_at(self.current_price)
    }

    /// Current profit as a multiple of the initial risk.
    pub fn risk_multiple(&self) -> f64 {
        self.profit_points() / self.initial_risk_points
    }

    pub fn hours_held(&self, now: DateTime<Utc>) -> f64 {
        (now - self.open_time).num_seconds() as f64 / 3600.0
    }

    pub fn has_taken_level(&self, threshold: f64) -> bool {
        self.partial_levels_taken.iter().any(|t| *t == threshold)
    }

    /// Mark the position at `price` and advance the excursion trackers.
    pub fn observe(&mut self, price: f64) {
        self.current_price = price;
        self.highest_price = self.highest_price.max(price);
        self.lowest_price = self.lowest_price.min(price);

        let points = self.profit_points_at(price);
        self.profit_pct = points / self.entry_price * 100.0;
        self.max_profit_reached = self.max_profit_reached.max(self.profit_pct);
        self.max_loss_reached = self.max_loss_reached.min(self.profit_pct);

        if points > self.best_profit_points {
            self.best_profit_points = points;
            self.best_profit_price = price;
            self.bars_since_new_best = 0;
        } else {
            self.bars_since_new_best = self.bars_since_new_best.saturating_add(1);
        }
    }

    /// Record an ATR reading. Unusable readings keep the last good value.
    ///
    /// Returns false when the reading was discarded.
    pub fn observe_atr(&mut self, atr: Option<f64>) -> bool {
        match atr.filter(|a| a.is_finite() && *a > 0.0) {
            Some(a) => {
                self.current_atr = Some(a);
                if self.atr_at_entry.is_none() {
                    self.atr_at_entry = Some(a);
                }
                true
            }
            None => false,
        }
    }

    /// Would `new_sl` tighten the stop by at least `min_step`?
    ///
    /// The level must sit on the protective side of the current price. With no
    /// stop set, any such level qualifies.
    pub fn sl_improves(&self, new_sl: f64, min_step: f64) -> bool {
        if !(new_sl.is_finite() && new_sl > 0.0) {
            return false;
        }
        let protective = match self.side {
            Side::Buy => new_sl < self.current_price,
            Side::Sell => new_sl > self.current_price,
        };
        if !protective {
            return false;
        }
        match (self.side, self.sl) {
            (Side::Buy, Some(sl)) => new_sl > sl && new_sl - sl >= min_step,
            (Side::Sell, Some(sl)) => new_sl < sl && sl - new_sl >= min_step,
            (_, None) => true,
        }
    }
}
