//! Simulated broker, slippage sources and the trading-client interface.

pub mod client;
pub mod sim;
pub mod slippage;

pub use client::{BacktestClient, TradingClient};
pub use sim::{BrokerConfig, BrokerError, OrderResult, PendingResolution, SimulatedBroker};
pub use slippage::{FixedSlippage, NoSlippage, SeededSlippage, SlippageModel, SlippageSequence};
