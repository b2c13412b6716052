//! Backtest driver: bar loop, signal interface and run results.

pub mod config;
pub mod driver;
pub mod result;
pub mod signal;

pub use config::{EngineConfig, EngineConfigError};
pub use driver::{Backtest, EngineError, SignalRejection, StepStatus};
pub use result::{RunResult, SignalCounts};
pub use signal::{
    EntryKind, NullSignal, ScriptedSignals, SignalContext, SignalError, SignalSource, TradeSignal,
};
