//! Simulated broker, the authoritative owner of positions, pending orders and the account.
//!
//! Per bar the driver calls [`SimulatedBroker::resolve_pending_orders`] then
//! [`SimulatedBroker::resolve_open_positions`]. Both walk their books in ticket
//! order, so same-bar events resolve deterministically.
//!
//! Accounting:
//! - commission is charged to balance once, at fill
//! - a close credits `gross - swap` to balance
//! - `ClosedTrade::profit` is `gross - commission - swap` (the closed share)
//! - `equity = balance + Σ live profit` after every mutation

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::slippage::SlippageModel;
use crate::domain::{
    AccountInfo, ClosedTrade, ExitReason, OrderRequest, OrderType, PendingOrder, Position, Side,
    SymbolSpec, Ticket, TicketGen, Tick, TradeAction,
};
use crate::metrics::TradeStatistics;

/// Errors from order placement.
#[derive(Debug, Error, PartialEq)]
pub enum BrokerError {
    #[error("action {action:?} cannot carry order type {order_type:?}")]
    InvalidAction {
        action: TradeAction,
        order_type: OrderType,
    },

    #[error("invalid volume {0}")]
    InvalidVolume(f64),

    #[error("pending order needs a positive trigger price, got {0:?}")]
    InvalidPrice(Option<f64>),

    #[error("invalid quote: bid {bid}, ask {ask}")]
    InvalidQuote { bid: f64, ask: f64 },

    #[error("symbol {got} is not traded here (expected {expected})")]
    UnknownSymbol { expected: String, got: String },

    #[error("no market data yet")]
    NoMarketData,
}

/// Broker friction and account settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub initial_balance: f64,
    /// Maximum slippage in points; each fill draws from `[0, slippage_pips * point]`.
    pub slippage_pips: f64,
    /// Charged per lot at fill.
    pub commission_per_lot: f64,
    pub leverage: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            slippage_pips: 2.0,
            commission_per_lot: 0.0,
            leverage: 100,
        }
    }
}

/// Outcome of a successful `place_order`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub ticket: Ticket,
    /// Fill price for deals, trigger price for pending orders.
    pub price: f64,
    pub volume: f64,
    pub filled: bool,
}

/// What happened to the pending book during one bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingResolution {
    pub filled: Vec<Ticket>,
    pub expired: Vec<Ticket>,
}

/// Bar-replay broker.
pub struct SimulatedBroker {
    spec: SymbolSpec,
    config: BrokerConfig,
    slippage: Box<dyn SlippageModel>,
    tickets: TicketGen,
    balance: f64,
    equity: f64,
    positions: BTreeMap<Ticket, Position>,
    orders: BTreeMap<Ticket, PendingOrder>,
    closed: Vec<ClosedTrade>,
}

impl fmt::Debug for SimulatedBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedBroker")
            .field("symbol", &self.spec.symbol)
            .field("slippage", &self.slippage.name())
            .field("balance", &self.balance)
            .field("equity", &self.equity)
            .field("positions", &self.positions.len())
            .field("orders", &self.orders.len())
            .field("closed", &self.closed.len())
            .finish()
    }
}

impl SimulatedBroker {
    pub fn new(spec: SymbolSpec, config: BrokerConfig, slippage: Box<dyn SlippageModel>) -> Self {
        let balance = config.initial_balance;
        Self {
            spec,
            config,
            slippage,
            tickets: TicketGen::new(),
            balance,
            equity: balance,
            positions: BTreeMap::new(),
            orders: BTreeMap::new(),
            closed: Vec::new(),
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn spec(&self) -> &SymbolSpec {
        &self.spec
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn position(&self, ticket: Ticket) -> Option<&Position> {
        self.positions.get(&ticket)
    }

    pub fn order(&self, ticket: Ticket) -> Option<&PendingOrder> {
        self.orders.get(&ticket)
    }

    /// Open positions in ticket order.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Pending orders in ticket order.
    pub fn orders(&self) -> impl Iterator<Item = &PendingOrder> {
        self.orders.values()
    }

    pub fn open_tickets(&self) -> Vec<Ticket> {
        self.positions.keys().copied().collect()
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed
    }

    /// Sum of live profit over open positions.
    pub fn floating_profit(&self) -> f64 {
        self.positions.values().map(|p| p.profit).sum()
    }

    pub fn account_info(&self) -> AccountInfo {
        let leverage = self.config.leverage.max(1) as f64;
        let margin: f64 = self
            .positions
            .values()
            .map(|p| p.open_price * p.volume * self.spec.contract_size / leverage)
            .sum();
        AccountInfo {
            balance: self.balance,
            equity: self.equity,
            margin,
            free_margin: self.equity - margin,
            margin_level: if margin > 0.0 {
                self.equity / margin * 100.0
            } else {
                0.0
            },
            profit: self.floating_profit(),
            leverage: self.config.leverage,
            open_positions: self.positions.len(),
            pending_orders: self.orders.len(),
        }
    }

    pub fn statistics(&self) -> TradeStatistics {
        TradeStatistics::from_trades(&self.closed, self.config.initial_balance)
    }

    // ── Order placement ────────────────────────────────────────────────

    /// Execute a deal or rest a pending order.
    ///
    /// Only structural problems are rejected. Margin and risk checks belong to the caller.
    pub fn place_order(
        &mut self,
        request: &OrderRequest,
        tick: &Tick,
        now: DateTime<Utc>,
    ) -> Result<OrderResult, BrokerError> {
        let result = self.validate_and_place(request, tick, now);
        if let Err(ref e) = result {
            warn!(error = %e, symbol = %request.symbol, "order rejected");
        }
        result
    }

    fn validate_and_place(
        &mut self,
        request: &OrderRequest,
        tick: &Tick,
        now: DateTime<Utc>,
    ) -> Result<OrderResult, BrokerError> {
        if request.symbol != self.spec.symbol {
            return Err(BrokerError::UnknownSymbol {
                expected: self.spec.symbol.clone(),
                got: request.symbol.clone(),
            });
        }
        if !(request.volume.is_finite() && request.volume > 0.0) {
            return Err(BrokerError::InvalidVolume(request.volume));
        }

        match (request.action, request.order_type.pending()) {
            (TradeAction::Deal, None) => self.execute_deal(request, tick, now),
            (TradeAction::Pending, Some(order_type)) => {
                let price = match request.price {
                    Some(p) if p.is_finite() && p > 0.0 => p,
                    other => return Err(BrokerError::InvalidPrice(other)),
                };
                let ticket = self.tickets.next_ticket();
                self.orders.insert(
                    ticket,
                    PendingOrder {
                        ticket,
                        symbol: request.symbol.clone(),
                        order_type,
                        volume: request.volume,
                        price,
                        sl: request.sl,
                        tp: request.tp,
                        magic: request.magic,
                        comment: request.comment.clone(),
                        time_setup: now,
                        expiration: request.expiration,
                    },
                );
                debug!(%ticket, ?order_type, price, volume = request.volume, "pending order placed");
                Ok(OrderResult {
                    ticket,
                    price,
                    volume: request.volume,
                    filled: false,
                })
            }
            (action, _) => Err(BrokerError::InvalidAction {
                action,
                order_type: request.order_type,
            }),
        }
    }

    fn execute_deal(
        &mut self,
        request: &OrderRequest,
        tick: &Tick,
        now: DateTime<Utc>,
    ) -> Result<OrderResult, BrokerError> {
        if !quote_is_valid(tick) {
            return Err(BrokerError::InvalidQuote {
                bid: tick.bid,
                ask: tick.ask,
            });
        }
        let side = request.order_type.side();
        let slip = self.draw_slippage();
        let price = match side {
            Side::Buy => tick.ask + slip,
            Side::Sell => tick.bid - slip,
        };
        let ticket = self.tickets.next_ticket();
        self.open_position(
            ticket,
            side,
            request.volume,
            price,
            request.sl,
            request.tp,
            request.magic,
            request.comment.clone(),
            tick,
            now,
        );
        debug!(%ticket, ?side, price, volume = request.volume, "market order filled");
        Ok(OrderResult {
            ticket,
            price,
            volume: request.volume,
            filled: true,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn open_position(
        &mut self,
        ticket: Ticket,
        side: Side,
        volume: f64,
        price: f64,
        sl: Option<f64>,
        tp: Option<f64>,
        magic: u64,
        comment: String,
        tick: &Tick,
        now: DateTime<Utc>,
    ) {
        let commission = volume * self.config.commission_per_lot;
        self.balance -= commission;

        let mut position = Position {
            ticket,
            symbol: self.spec.symbol.clone(),
            side,
            volume,
            open_price: price,
            sl: sl.filter(|v| v.is_finite() && *v > 0.0),
            tp: tp.filter(|v| v.is_finite() && *v > 0.0),
            magic,
            comment,
            open_time: now,
            commission,
            swap: 0.0,
            profit: 0.0,
            price_current: price,
        };
        self.mark(&mut position, tick);
        self.positions.insert(ticket, position);
        self.refresh_equity();
    }

    // ── Per-bar resolution ─────────────────────────────────────────────

    /// Expire, then fill, resting orders against the bar's extremes.
    pub fn resolve_pending_orders(&mut self, tick: &Tick, now: DateTime<Utc>) -> PendingResolution {
        let mut outcome = PendingResolution::default();
        let tickets: Vec<Ticket> = self.orders.keys().copied().collect();

        for ticket in tickets {
            let Some(order) = self.orders.get(&ticket) else {
                continue;
            };

            if order.is_expired(now) {
                debug!(%ticket, "pending order expired");
                self.orders.remove(&ticket);
                outcome.expired.push(ticket);
                continue;
            }

            if !order.order_type.is_triggered(order.price, tick.high, tick.low) {
                continue;
            }

            let Some(order) = self.orders.remove(&ticket) else {
                continue;
            };
            let side = order.order_type.side();
            let slip = self.draw_slippage();
            let fill_price = match side {
                Side::Buy => order.price + slip,
                Side::Sell => order.price - slip,
            };
            self.open_position(
                ticket,
                side,
                order.volume,
                fill_price,
                order.sl,
                order.tp,
                order.magic,
                order.comment,
                tick,
                now,
            );
            debug!(%ticket, order_type = ?order.order_type, fill_price, "pending order filled");
            outcome.filled.push(ticket);
        }

        outcome
    }

    /// Mark every position, then close those whose SL or TP was crossed.
    ///
    /// When both levels lie inside the bar's range the stop wins.
    /// Returns the trades closed during this call.
    pub fn resolve_open_positions(&mut self, tick: &Tick, now: DateTime<Utc>) -> Vec<ClosedTrade> {
        let mut closed = Vec::new();
        let tickets: Vec<Ticket> = self.positions.keys().copied().collect();

        for ticket in tickets {
            let Some(mut position) = self.positions.remove(&ticket) else {
                continue;
            };
            self.mark(&mut position, tick);

            let sl_hit = position.sl_hit(tick.high, tick.low);
            let tp_hit = position.tp_hit(tick.high, tick.low);

            let exit = match (sl_hit, tp_hit, position.sl, position.tp) {
                (true, _, Some(sl), _) => Some((sl, ExitReason::StopLoss)),
                (false, true, _, Some(tp)) => Some((tp, ExitReason::TakeProfit)),
                _ => None,
            };

            match exit {
                Some((level, reason)) => {
                    debug!(%ticket, level, ?reason, "protective level hit");
                    let volume = position.volume;
                    closed.push(self.settle(position, volume, level, now, reason));
                }
                None => {
                    self.positions.insert(ticket, position);
                }
            }
        }

        self.refresh_equity();
        closed
    }

    // ── Closing ────────────────────────────────────────────────────────

    /// Close a position at the current quote with adverse slippage.
    ///
    /// Returns true if the ticket is already gone.
    pub fn close_position(&mut self, ticket: Ticket, tick: &Tick, now: DateTime<Utc>) -> bool {
        self.close_position_with_reason(ticket, tick, now, ExitReason::Manual)
    }

    pub fn close_position_with_reason(
        &mut self,
        ticket: Ticket,
        tick: &Tick,
        now: DateTime<Utc>,
        reason: ExitReason,
    ) -> bool {
        if !self.positions.contains_key(&ticket) {
            return true;
        }
        if !quote_is_valid(tick) {
            warn!(%ticket, bid = tick.bid, ask = tick.ask, "close skipped, invalid quote");
            return false;
        }
        let Some(position) = self.positions.remove(&ticket) else {
            return true;
        };
        let price = self.exit_price(&position, tick);
        let volume = position.volume;
        self.settle(position, volume, price, now, reason);
        self.refresh_equity();
        true
    }

    /// Close part of a position. The ticket survives with the remaining volume.
    ///
    /// The requested volume is rounded down to `lot_step`. If that leaves less
    /// than the minimum lot open, the whole position is closed and recorded as
    /// a final `Manual` close, not a partial one.
    pub fn close_position_partial(
        &mut self,
        ticket: Ticket,
        volume: f64,
        tick: &Tick,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(current) = self.positions.get(&ticket).map(|p| p.volume) else {
            warn!(%ticket, "partial close of unknown position");
            return false;
        };
        let Some(close_volume) = self.spec.normalize_volume(volume) else {
            warn!(%ticket, volume, "partial close volume below minimum lot");
            return false;
        };
        if !quote_is_valid(tick) {
            warn!(%ticket, bid = tick.bid, ask = tick.ask, "partial close skipped, invalid quote");
            return false;
        }

        let remaining = current - close_volume;
        if remaining < self.spec.min_lot - 1e-9 {
            return self.close_position_with_reason(ticket, tick, now, ExitReason::Manual);
        }

        let Some(position) = self.positions.get(&ticket).cloned() else {
            return false;
        };
        let price = self.exit_price(&position, tick);
        let fraction = close_volume / position.volume;

        self.settle(position.clone(), close_volume, price, now, ExitReason::PartialClose);

        if let Some(p) = self.positions.get_mut(&ticket) {
            p.volume = round_volume(remaining);
            p.commission -= position.commission * fraction;
            p.swap -= position.swap * fraction;
        }
        if let Some(mut p) = self.positions.remove(&ticket) {
            self.mark(&mut p, tick);
            self.positions.insert(ticket, p);
        }
        self.refresh_equity();
        debug!(%ticket, close_volume, remaining, "partial close");
        true
    }

    /// Close everything at the current quote. Returns how many positions were closed.
    pub fn close_all(&mut self, tick: &Tick, now: DateTime<Utc>, reason: ExitReason) -> usize {
        let mut n = 0;
        for ticket in self.open_tickets() {
            if self.close_position_with_reason(ticket, tick, now, reason) {
                n += 1;
            }
        }
        n
    }

    // ── Modification ───────────────────────────────────────────────────

    /// Remove a pending order. Absent tickets count as cancelled.
    pub fn cancel_order(&mut self, ticket: Ticket) -> bool {
        if self.orders.remove(&ticket).is_some() {
            debug!(%ticket, "pending order cancelled");
        }
        true
    }

    /// Update SL and/or TP. `None` leaves a level untouched, `Some(0.0)` clears it.
    pub fn modify_position(&mut self, ticket: Ticket, sl: Option<f64>, tp: Option<f64>) -> bool {
        if !(level_is_valid(sl) && level_is_valid(tp)) {
            warn!(%ticket, ?sl, ?tp, "modify rejected, invalid level");
            return false;
        }
        let Some(position) = self.positions.get_mut(&ticket) else {
            warn!(%ticket, "modify of unknown position");
            return false;
        };
        if let Some(v) = sl {
            position.sl = (v > 0.0).then_some(v);
        }
        if let Some(v) = tp {
            position.tp = (v > 0.0).then_some(v);
        }
        debug!(%ticket, sl = ?position.sl, tp = ?position.tp, "position modified");
        true
    }

    /// Update a pending order's trigger and/or protective levels.
    pub fn modify_order(
        &mut self,
        ticket: Ticket,
        price: Option<f64>,
        sl: Option<f64>,
        tp: Option<f64>,
    ) -> bool {
        let price_ok = price.map_or(true, |p| p.is_finite() && p > 0.0);
        if !(price_ok && level_is_valid(sl) && level_is_valid(tp)) {
            warn!(%ticket, ?price, ?sl, ?tp, "order modify rejected, invalid level");
            return false;
        }
        let Some(order) = self.orders.get_mut(&ticket) else {
            warn!(%ticket, "modify of unknown order");
            return false;
        };
        if let Some(p) = price {
            order.price = p;
        }
        if let Some(v) = sl {
            order.sl = (v > 0.0).then_some(v);
        }
        if let Some(v) = tp {
            order.tp = (v > 0.0).then_some(v);
        }
        true
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn draw_slippage(&mut self) -> f64 {
        let max = self.config.slippage_pips * self.spec.point;
        self.slippage.sample(max).clamp(0.0, max.max(0.0))
    }

    fn exit_price(&mut self, position: &Position, tick: &Tick) -> f64 {
        let slip = self.draw_slippage();
        match position.side {
            Side::Buy => tick.bid - slip,
            Side::Sell => tick.ask + slip,
        }
    }

    fn mark(&self, position: &mut Position, tick: &Tick) {
        let price = position.mark_price(tick.bid, tick.ask);
        position.price_current = price;
        position.profit = position.gross_profit_at(price, self.spec.contract_size) - position.swap;
    }

    /// Realize `volume` of `position` at `price` and record the trade.
    fn settle(
        &mut self,
        position: Position,
        volume: f64,
        price: f64,
        now: DateTime<Utc>,
        reason: ExitReason,
    ) -> ClosedTrade {
        let fraction = if position.volume > 0.0 {
            (volume / position.volume).min(1.0)
        } else {
            1.0
        };
        let gross =
            (price - position.open_price) * position.side.sign() * volume * self.spec.contract_size;
        let commission = position.commission * fraction;
        let swap = position.swap * fraction;
        self.balance += gross - swap;

        let trade = ClosedTrade {
            ticket: position.ticket,
            symbol: position.symbol,
            side: position.side,
            volume,
            open_price: position.open_price,
            close_price: price,
            sl: position.sl,
            tp: position.tp,
            profit: gross - commission - swap,
            commission,
            swap,
            open_time: position.open_time,
            close_time: now,
            duration_secs: (now - position.open_time).num_seconds(),
            magic: position.magic,
            comment: position.comment,
            reason,
        };
        debug!(
            ticket = %trade.ticket,
            price,
            volume,
            profit = trade.profit,
            ?reason,
            "position closed"
        );
        self.closed.push(trade.clone());
        trade
    }

    fn refresh_equity(&mut self) {
        self.equity = self.balance + self.floating_profit();
    }
}

fn quote_is_valid(tick: &Tick) -> bool {
    tick.bid.is_finite() && tick.ask.is_finite() && tick.bid > 0.0 && tick.ask >= tick.bid
}

fn level_is_valid(level: Option<f64>) -> bool {
    level.map_or(true, |v| v.is_finite() && v >= 0.0)
}

fn round_volume(v: f64) -> f64 {
    (v * 1e8).round() / 1e8
}
