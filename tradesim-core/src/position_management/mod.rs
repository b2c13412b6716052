//! Position management: per-ticket state machine with partial profits,
//! break-even, pluggable trailing stops and time exits.

pub mod action;
pub mod config;
pub mod managed;
pub mod manager;
pub mod trailing;

pub use action::{PositionAction, StopReason, TrailPhase};
pub use config::{
    AtrMultipliers, BreakEvenConfig, DynamicTrailingConfig, FixedPercentTrailingConfig, MfeLock,
    PartialProfitConfig, PartialProfitLevel, PositionManagerConfig, PositionManagerConfigError,
    TrailingConfig,
};
pub use managed::{ManagedPosition, ManagedPositionError, PositionFill, RiskSource};
pub use manager::{PositionManager, PositionSummary};
pub use trailing::{DynamicAtrTrailing, FixedPercentTrailing, TrailingProposal, TrailingStrategy};
