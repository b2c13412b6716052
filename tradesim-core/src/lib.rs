//! tradesim core: bar-replay broker simulation, position management and risk sizing.
//!
//! This crate contains:
//! - Domain types (bars, ticks, symbol specs, orders, positions, closed trades)
//! - Simulated broker with conservative intrabar fills and SL/TP resolution
//! - Trading-client trait the driver and position manager execute through
//! - Position manager: partial profits, break-even, fixed and ATR trailing, time exits
//! - Risk sizer: fractional Kelly, volatility adjustment, loss limits, halts
//! - Backtest driver with a fixed per-bar call order
//! - Run statistics (trade stats, drawdown, Sharpe)

pub mod broker;
pub mod domain;
pub mod engine;
pub mod metrics;
pub mod position_management;
pub mod risk;
pub mod rng;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything a parallel sweep moves across threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Tick>();
        require_sync::<domain::Tick>();
        require_send::<domain::SymbolSpec>();
        require_sync::<domain::SymbolSpec>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::PendingOrder>();
        require_sync::<domain::PendingOrder>();
        require_send::<domain::ClosedTrade>();
        require_sync::<domain::ClosedTrade>();

        // Broker
        require_send::<broker::SimulatedBroker>();
        require_sync::<broker::SimulatedBroker>();
        require_send::<broker::BacktestClient>();
        require_sync::<broker::BacktestClient>();
        require_send::<broker::SeededSlippage>();
        require_sync::<broker::SeededSlippage>();

        // Position management
        require_send::<position_management::PositionManager>();
        require_sync::<position_management::PositionManager>();
        require_send::<position_management::ManagedPosition>();
        require_sync::<position_management::ManagedPosition>();
        require_send::<position_management::DynamicAtrTrailing>();
        require_sync::<position_management::DynamicAtrTrailing>();

        // Risk
        require_send::<risk::RiskManager>();
        require_sync::<risk::RiskManager>();
        require_send::<risk::AtrTracker>();
        require_sync::<risk::AtrTracker>();

        // Engine
        require_send::<engine::Backtest>();
        require_sync::<engine::Backtest>();
        require_send::<engine::RunResult>();
        require_sync::<engine::RunResult>();
        require_send::<engine::EngineConfig>();
        require_sync::<engine::EngineConfig>();

        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();
    }

    /// The driver and position manager only see the broker through this trait.
    #[test]
    fn trading_client_is_object_safe() {
        fn _check(client: &mut dyn broker::TradingClient) -> usize {
            client.positions().len()
        }
    }
}
