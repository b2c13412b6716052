//! Trading client interface.
//!
//! The driver and the position manager talk to a broker only through
//! [`TradingClient`]. [`BacktestClient`] implements it over a
//! [`SimulatedBroker`] plus the current bar's quote; a live adapter would
//! implement the same trait against a real venue.

use chrono::{DateTime, Utc};
use tracing::warn;

use super::sim::{BrokerError, OrderResult, SimulatedBroker};
use crate::domain::{
    AccountInfo, ExitReason, OrderRequest, PendingOrder, Position, SymbolSpec, Ticket, Tick,
};

/// Broker operations available to strategy-side code.
pub trait TradingClient {
    fn symbol_spec(&self) -> &SymbolSpec;

    fn account_info(&self) -> AccountInfo;

    /// Open positions, ticket order.
    fn positions(&self) -> Vec<Position>;

    fn position(&self, ticket: Ticket) -> Option<Position>;

    /// Pending orders, ticket order.
    fn orders(&self) -> Vec<PendingOrder>;

    /// Latest quote, if any bar has been seen.
    fn current_tick(&self) -> Option<&Tick>;

    fn place_order(&mut self, request: &OrderRequest) -> Result<OrderResult, BrokerError>;

    /// Close a whole position. True if it is gone afterwards.
    fn close_position(&mut self, ticket: Ticket, reason: ExitReason) -> bool;

    fn close_position_partial(&mut self, ticket: Ticket, volume: f64) -> bool;

    fn cancel_order(&mut self, ticket: Ticket) -> bool;

    fn modify_position(&mut self, ticket: Ticket, sl: Option<f64>, tp: Option<f64>) -> bool;
}

/// [`TradingClient`] backed by a simulated broker.
#[derive(Debug)]
pub struct BacktestClient {
    broker: SimulatedBroker,
    market: Option<(Tick, DateTime<Utc>)>,
}

impl BacktestClient {
    pub fn new(broker: SimulatedBroker) -> Self {
        Self {
            broker,
            market: None,
        }
    }

    /// Advance the market context. Later calls execute against this quote.
    pub fn set_market(&mut self, tick: Tick, now: DateTime<Utc>) {
        self.market = Some((tick, now));
    }

    pub fn now(&self) -> Option<DateTime<Utc>> {
        self.market.as_ref().map(|(_, now)| *now)
    }

    pub fn broker(&self) -> &SimulatedBroker {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut SimulatedBroker {
        &mut self.broker
    }
}

impl TradingClient for BacktestClient {
    fn symbol_spec(&self) -> &SymbolSpec {
        self.broker.spec()
    }

    fn account_info(&self) -> AccountInfo {
        self.broker.account_info()
    }

    fn positions(&self) -> Vec<Position> {
        self.broker.positions().cloned().collect()
    }

    fn position(&self, ticket: Ticket) -> Option<Position> {
        self.broker.position(ticket).cloned()
    }

    fn orders(&self) -> Vec<PendingOrder> {
        self.broker.orders().cloned().collect()
    }

    fn current_tick(&self) -> Option<&Tick> {
        self.market.as_ref().map(|(tick, _)| tick)
    }

    fn place_order(&mut self, request: &OrderRequest) -> Result<OrderResult, BrokerError> {
        let Some((tick, now)) = self.market.as_ref() else {
            warn!("order placed before any market data");
            return Err(BrokerError::NoMarketData);
        };
        self.broker.place_order(request, tick, *now)
    }

    fn close_position(&mut self, ticket: Ticket, reason: ExitReason) -> bool {
        let Some((tick, now)) = self.market.as_ref() else {
            warn!(%ticket, "close requested before any market data");
            return false;
        };
        self.broker
            .close_position_with_reason(ticket, tick, *now, reason)
    }

    fn close_position_partial(&mut self, ticket: Ticket, volume: f64) -> bool {
        let Some((tick, now)) = self.market.as_ref() else {
            warn!(%ticket, "partial close requested before any market data");
            return false;
        };
        self.broker.close_position_partial(ticket, volume, tick, *now)
    }

    fn cancel_order(&mut self, ticket: Ticket) -> bool {
        self.broker.cancel_order(ticket)
    }

    fn modify_position(&mut self, ticket: Ticket, sl: Option<f64>, tp: Option<f64>) -> bool {
        self.broker.modify_position(ticket, sl, tp)
    }
}
