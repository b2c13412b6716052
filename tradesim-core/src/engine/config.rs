//! Backtest driver configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::QuoteModel;

#[derive(Debug, Error, PartialEq)]
pub enum EngineConfigError {
    #[error("signal_check_interval must be at least 1")]
    ZeroSignalInterval,

    #[error("atr_period must be at least 1")]
    ZeroAtrPeriod,

    #[error("max_concurrent_positions must be at least 1")]
    ZeroConcurrentPositions,

    #[error("max_pending_orders must be at least 1")]
    ZeroPendingOrders,

    #[error("{name} must be a positive ATR multiple, got {value}")]
    AtrMultiple { name: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ask the signal source every N bars.
    pub signal_check_interval: usize,
    /// Tag stamped on every order the driver places.
    pub magic: u64,
    pub comment: String,
    pub atr_period: usize,
    /// Bars of history kept for the signal source.
    pub signal_lookback: usize,
    /// Open positions plus pending orders allowed at once.
    pub max_concurrent_positions: usize,
    /// Resting pending orders allowed at once. Checked for every signal.
    pub max_pending_orders: usize,
    /// A signal whose entry lies within this many ATRs of a resting order's
    /// price is a duplicate.
    pub duplicate_order_atr: f64,
    /// Resting orders are cancelled once the quote drifts this many ATRs
    /// (measured when the order was placed) away from their price.
    pub stale_order_atr: f64,
    /// Close whatever is still open at the last bar.
    pub close_on_finish: bool,
    pub quote_model: QuoteModel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signal_check_interval: 5,
            magic: 234_000,
            comment: "tradesim".into(),
            atr_period: 14,
            signal_lookback: 100,
            max_concurrent_positions: 3,
            max_pending_orders: 2,
            duplicate_order_atr: 0.2,
            stale_order_atr: 3.0,
            close_on_finish: false,
            quote_model: QuoteModel::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if self.signal_check_interval == 0 {
            return Err(EngineConfigError::ZeroSignalInterval);
        }
        if self.atr_period == 0 {
            return Err(EngineConfigError::ZeroAtrPeriod);
        }
        if self.max_concurrent_positions == 0 {
            return Err(EngineConfigError::ZeroConcurrentPositions);
        }
        if self.max_pending_orders == 0 {
            return Err(EngineConfigError::ZeroPendingOrders);
        }
        for (name, value) in [
            ("duplicate_order_atr", self.duplicate_order_atr),
            ("stale_order_atr", self.stale_order_atr),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineConfigError::AtrMultiple { name, value });
            }
        }
        Ok(())
    }
}
