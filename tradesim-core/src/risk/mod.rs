//! Risk sizing: fractional Kelly, volatility adjustment, loss limits and
//! ATR tracking.

pub mod atr;
pub mod config;
pub mod kelly;
pub mod manager;

pub use atr::{atr_stop_distance, true_range, volatility_factor, AtrTracker};
pub use config::RiskConfig;
pub use kelly::{calculate_kelly_criterion, TradeHistory, TradeOutcome};
pub use manager::{
    HaltReason, PositionRisk, RiskManager, RiskMetrics, RiskRejection, SizingRequest,
    DEFAULT_REWARD_RISK,
};
