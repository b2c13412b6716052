//! Append-only records of realized P&L.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::Ticket;
use super::position::Side;

/// Why a position (or part of it) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual,
    TimeExit,
    PartialClose,
    EndOfRun,
}

/// A completed round-trip (or partial round-trip) for one ticket.
///
/// `profit` is net of commission and swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub ticket: Ticket,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub open_price: f64,
    pub close_price: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub profit: f64,
    pub commission: f64,
    pub swap: f64,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub duration_secs: i64,
    pub magic: u64,
    pub comment: String,
    pub reason: ExitReason,
}

impl ClosedTrade {
    pub fn is_winner(&self) -> bool {
        self.profit > 0.0
    }

    pub fn is_partial(&self) -> bool {
        self.reason == ExitReason::PartialClose
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_secs as f64 / 3600.0
    }
}
