//! Broker-side open position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::Ticket;

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// An open position. Owned by the broker; everyone else sees clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticket: Ticket,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub open_price: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub magic: u64,
    pub comment: String,
    pub open_time: DateTime<Utc>,
    /// Commission already charged to balance at fill.
    pub commission: f64,
    pub swap: f64,
    /// Live profit at the last mark, excluding commission.
    pub profit: f64,
    /// Price used for the last mark.
    pub price_current: f64,
}

impl Position {
    /// Gross profit at `price`, in account currency.
    pub fn gross_profit_at(&self, price: f64, contract_size: f64) -> f64 {
        (price - self.open_price) * self.side.sign() * self.volume * contract_size
    }

    /// Quote side used to mark (and close) this position: bid for buys, ask for sells.
    pub fn mark_price(&self, bid: f64, ask: f64) -> f64 {
        match self.side {
            Side::Buy => bid,
            Side::Sell => ask,
        }
    }

    pub fn sl_hit(&self, high: f64, low: f64) -> bool {
        match (self.side, self.sl) {
            (Side::Buy, Some(sl)) if sl > 0.0 => low <= sl,
            (Side::Sell, Some(sl)) if sl > 0.0 => high >= sl,
            _ => false,
        }
    }

    pub fn tp_hit(&self, high: f64, low: f64) -> bool {
        match (self.side, self.tp) {
            (Side::Buy, Some(tp)) if tp > 0.0 => high >= tp,
            (Side::Sell, Some(tp)) if tp > 0.0 => low <= tp,
            _ => false,
        }
    }
}
