//! Backtest driver. Replays bars through the broker, position manager and
//! risk sizer in a fixed order.
//!
//! Per bar:
//! 1. skip broken or out-of-order bars (counted, never fatal)
//! 2. derive the quote, roll risk periods
//! 3. resolve pending orders, cancel resting orders the market has left
//!    behind, then resolve open positions
//! 4. record the equity point
//! 5. update ATR and run the position manager over every open ticket
//! 6. every `signal_check_interval` bars, ask the signal source
//!
//! The run stops early once equity reaches zero.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::{EngineConfig, EngineConfigError};
use super::result::{RunResult, SignalCounts};
use super::signal::{SignalContext, SignalError, SignalSource, TradeSignal};
use crate::broker::{
    BacktestClient, BrokerConfig, BrokerError, SimulatedBroker, SlippageModel, TradingClient,
};
use crate::domain::{
    Bar, ExitReason, OrderRequest, Side, SymbolSpec, SymbolSpecError, Ticket, Tick,
};
use crate::metrics::EquityPoint;
use crate::position_management::{
    PositionFill, PositionManager, PositionManagerConfig, PositionManagerConfigError,
};
use crate::risk::{
    atr_stop_distance, AtrTracker, HaltReason, RiskConfig, RiskManager, RiskRejection,
    SizingRequest,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine config: {0}")]
    Config(#[from] EngineConfigError),

    #[error("invalid symbol spec: {0}")]
    Symbol(#[from] SymbolSpecError),

    #[error("invalid position management config: {0}")]
    Position(#[from] PositionManagerConfigError),
}

/// Why a generated signal did not become an order.
#[derive(Debug, Error)]
pub enum SignalRejection {
    #[error("invalid signal: {0}")]
    Invalid(#[from] SignalError),

    #[error("trading halted: {0}")]
    Halted(HaltReason),

    #[error("maximum pending orders reached: {0}")]
    MaxPending(usize),

    #[error("maximum concurrent positions reached: {0}")]
    MaxPositions(usize),

    #[error("similar pending order {ticket} already rests at {price}")]
    Duplicate { ticket: Ticket, price: f64 },

    #[error("position sizing failed")]
    Sizing,

    #[error("risk check failed: {0}")]
    Risk(#[from] RiskRejection),

    #[error("order rejected: {0}")]
    Broker(#[from] BrokerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Processed,
    Skipped,
    /// The run has stopped; the bar was ignored.
    Stopped,
}

pub struct Backtest {
    config: EngineConfig,
    client: BacktestClient,
    positions: PositionManager,
    risk: RiskManager,
    atr: AtrTracker,
    initial_balance: f64,
    history: VecDeque<Bar>,
    /// Resting orders placed by the driver, with the ATR they were sized against.
    resting: BTreeMap<Ticket, f64>,
    last_time: Option<DateTime<Utc>>,
    equity_curve: Vec<EquityPoint>,
    trades_seen: usize,
    signals: SignalCounts,
    bar_index: usize,
    bars_processed: usize,
    bars_skipped: usize,
    stopped_early: bool,
}

impl Backtest {
    pub fn new(
        config: EngineConfig,
        spec: SymbolSpec,
        broker: BrokerConfig,
        position: PositionManagerConfig,
        risk: RiskConfig,
        slippage: Box<dyn SlippageModel>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        spec.validate()?;
        position.validate()?;
        let initial_balance = broker.initial_balance;
        let atr = AtrTracker::new(config.atr_period);
        Ok(Self {
            client: BacktestClient::new(SimulatedBroker::new(spec, broker, slippage)),
            positions: PositionManager::new(position),
            risk: RiskManager::new(risk),
            atr,
            initial_balance,
            history: VecDeque::with_capacity(config.signal_lookback),
            resting: BTreeMap::new(),
            last_time: None,
            equity_curve: Vec::new(),
            trades_seen: 0,
            signals: SignalCounts::default(),
            bar_index: 0,
            bars_processed: 0,
            bars_skipped: 0,
            stopped_early: false,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn broker(&self) -> &SimulatedBroker {
        self.client.broker()
    }

    pub fn position_manager(&self) -> &PositionManager {
        &self.positions
    }

    pub fn risk_manager(&self) -> &RiskManager {
        &self.risk
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn signal_counts(&self) -> SignalCounts {
        self.signals
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped_early
    }

    /// Replay `bars` in order and return the run summary.
    pub fn run(&mut self, bars: &[Bar], signals: &mut dyn SignalSource) -> RunResult {
        info!(bars = bars.len(), source = signals.name(), "backtest started");
        for bar in bars {
            if self.step(bar, signals) == StepStatus::Stopped {
                break;
            }
        }
        let result = self.finish();
        info!(
            trades = result.trades.len(),
            final_balance = result.final_balance,
            skipped = result.bars_skipped,
            stopped_early = result.stopped_early,
            "backtest finished"
        );
        result
    }

    /// Advance the simulation by one bar.
    pub fn step(&mut self, bar: &Bar, signals: &mut dyn SignalSource) -> StepStatus {
        if self.stopped_early {
            return StepStatus::Stopped;
        }
        let index = self.bar_index;
        self.bar_index += 1;

        if !bar.is_sane() {
            warn!(index, time = %bar.time, "skipping malformed bar");
            self.bars_skipped += 1;
            return StepStatus::Skipped;
        }
        if self.last_time.is_some_and(|t| bar.time <= t) {
            warn!(index, time = %bar.time, "skipping out-of-order bar");
            self.bars_skipped += 1;
            return StepStatus::Skipped;
        }
        self.last_time = Some(bar.time);
        self.remember(bar);

        let now = bar.time;
        let tick = self.config.quote_model.tick(bar);
        self.client.set_market(tick.clone(), now);
        self.risk.roll_periods(now, self.client.broker().balance());

        // broker first: fills, then exits
        let resolution = self.client.broker_mut().resolve_pending_orders(&tick, now);
        for ticket in resolution.expired {
            self.risk.release(ticket);
        }
        self.cancel_stale_orders(&tick);
        self.client.broker_mut().resolve_open_positions(&tick, now);
        self.settle_closed();

        let account = self.client.account_info();
        self.equity_curve.push(EquityPoint {
            time: now,
            balance: account.balance,
            equity: account.equity,
            profit: account.profit,
        });

        let atr = self.atr.update(bar);
        self.manage_positions(&tick, now, atr);

        if index % self.config.signal_check_interval == 0 {
            self.check_signal(signals, &tick, index, atr);
        }

        self.bars_processed += 1;
        let equity = self.client.broker().equity();
        if equity <= 0.0 {
            warn!(equity, time = %now, "equity exhausted, stopping run");
            self.stopped_early = true;
        }
        StepStatus::Processed
    }

    /// Apply end-of-run handling and summarise.
    pub fn finish(&mut self) -> RunResult {
        if self.config.close_on_finish {
            let market = self.client.current_tick().cloned().zip(self.client.now());
            if let Some((tick, now)) = market {
                let closed = self
                    .client
                    .broker_mut()
                    .close_all(&tick, now, ExitReason::EndOfRun);
                if closed > 0 {
                    info!(closed, "closed open positions at end of run");
                }
                self.settle_closed();
            }
        }

        let broker = self.client.broker();
        RunResult::build(
            self.initial_balance,
            broker.balance(),
            broker.equity(),
            self.equity_curve.clone(),
            broker.closed_trades().to_vec(),
            self.signals,
            self.bars_processed,
            self.bars_skipped,
            self.stopped_early,
        )
    }

    fn remember(&mut self, bar: &Bar) {
        if self.config.signal_lookback == 0 {
            return;
        }
        if self.history.len() == self.config.signal_lookback {
            self.history.pop_front();
        }
        self.history.push_back(bar.clone());
    }

    /// Feed trades closed since the last call to the risk manager and stop
    /// managing tickets the broker no longer holds.
    fn settle_closed(&mut self) {
        let trades = self.client.broker().closed_trades();
        for trade in &trades[self.trades_seen..] {
            self.risk.record_trade(trade);
        }
        self.trades_seen = trades.len();
        let open = self.client.broker().open_tickets();
        self.positions.retain_open(&open);
    }

    /// Cancel resting orders whose price the quote has drifted away from by
    /// more than `stale_order_atr` ATRs, and release the risk they reserved.
    fn cancel_stale_orders(&mut self, tick: &Tick) {
        let broker = self.client.broker();
        // filled or expired orders are no longer ours to watch
        self.resting.retain(|ticket, _| broker.order(*ticket).is_some());

        let stale: Vec<(Ticket, f64)> = self
            .resting
            .iter()
            .filter_map(|(&ticket, &atr)| {
                let order = broker.order(ticket)?;
                let band = atr_stop_distance(atr, self.config.stale_order_atr)?;
                let price = match order.order_type.side() {
                    Side::Buy => tick.ask,
                    Side::Sell => tick.bid,
                };
                let distance = (price - order.price).abs();
                (distance > band).then_some((ticket, distance))
            })
            .collect();

        for (ticket, distance) in stale {
            if self.client.cancel_order(ticket) {
                self.resting.remove(&ticket);
                self.risk.release(ticket);
                self.signals.orders_cancelled += 1;
                info!(%ticket, distance, "stale pending order cancelled");
            }
        }
    }

    fn manage_positions(&mut self, tick: &Tick, now: DateTime<Utc>, atr: Option<f64>) {
        let open: Vec<_> = self.client.broker().positions().cloned().collect();
        for position in open {
            let ticket = position.ticket;
            if self.positions.is_tracked(ticket) {
                self.positions.sync_from_broker(&position);
            } else if let Err(err) = self.positions.track(PositionFill::from_position(&position, atr)) {
                warn!(%ticket, %err, "cannot manage position");
                continue;
            }

            // price at which the position would close
            let price = match position.side {
                Side::Buy => tick.bid,
                Side::Sell => tick.ask,
            };
            if let Some(action) = self.positions.update(ticket, price, now, atr) {
                if !self.positions.execute(&action, &mut self.client) {
                    debug!(%ticket, ?action, "position action not applied");
                }
            }
        }
        self.settle_closed();
    }

    fn check_signal(
        &mut self,
        signals: &mut dyn SignalSource,
        tick: &Tick,
        index: usize,
        atr: Option<f64>,
    ) {
        let account = self.client.account_info();
        let ctx = SignalContext {
            bar_index: index,
            bars: self.history.make_contiguous(),
            tick,
            account: &account,
            atr,
        };
        let Some(signal) = signals.analyze(&ctx) else {
            return;
        };
        self.signals.generated += 1;
        debug!(
            side = ?signal.side,
            entry = signal.entry_price,
            sl = signal.sl_price,
            score = signal.score,
            rr = signal.rr_ratio,
            "signal generated"
        );

        match self.execute_signal(&signal, atr) {
            Ok(ticket) => {
                self.signals.executed += 1;
                info!(%ticket, side = ?signal.side, entry = signal.entry_price, "order placed");
            }
            Err(reason) => {
                self.signals.rejected += 1;
                info!(%reason, "signal rejected");
            }
        }
    }

    fn execute_signal(
        &mut self,
        signal: &TradeSignal,
        atr: Option<f64>,
    ) -> Result<Ticket, SignalRejection> {
        signal.validate()?;
        // without a warmed-up ATR the signal's own stop distance sets the scale
        let reference_atr = atr.unwrap_or_else(|| (signal.entry_price - signal.sl_price).abs());

        let balance = self.client.broker().balance();
        if let Some(reason) = self.risk.should_halt_trading(balance) {
            return Err(SignalRejection::Halted(reason));
        }

        let broker = self.client.broker();
        let pending = broker.orders().count();
        if pending >= self.config.max_pending_orders {
            return Err(SignalRejection::MaxPending(pending));
        }
        let open = broker.positions().count() + pending;
        if open >= self.config.max_concurrent_positions {
            return Err(SignalRejection::MaxPositions(open));
        }
        if let Some(band) = atr_stop_distance(reference_atr, self.config.duplicate_order_atr) {
            if let Some(order) = broker
                .orders()
                .find(|o| (o.price - signal.entry_price).abs() < band)
            {
                return Err(SignalRejection::Duplicate {
                    ticket: order.ticket,
                    price: order.price,
                });
            }
        }

        let spec = broker.spec();
        let mut request = SizingRequest::new(
            spec.symbol.clone(),
            signal.entry_price,
            signal.sl_price,
            balance,
        )
        .with_volatility(self.atr.volatility_factor());
        if let Some(tp) = signal.tp_price {
            request = request.with_take_profit(tp);
        }
        let sizing = self
            .risk
            .calculate_position_size(&request)
            .ok_or(SignalRejection::Sizing)?;
        let lots = sizing.lots(spec);
        let risk_amount = lots * spec.contract_size * (signal.entry_price - signal.sl_price).abs();
        self.risk
            .can_take_trade(balance, self.risk.open_exposure(), risk_amount)?;

        let mut order = match signal.pending_type() {
            None => OrderRequest::market(spec.symbol.clone(), signal.side, lots),
            Some(kind) => {
                let mut order =
                    OrderRequest::pending(spec.symbol.clone(), kind, lots, signal.entry_price);
                if let Some(expiration) = signal.expiration {
                    order = order.with_expiration(expiration);
                }
                order
            }
        }
        .with_sl(signal.sl_price)
        .with_magic(self.config.magic)
        .with_comment(
            signal
                .comment
                .clone()
                .unwrap_or_else(|| self.config.comment.clone()),
        );
        if let Some(tp) = signal.tp_price {
            order = order.with_tp(tp);
        }

        let placed = self.client.place_order(&order)?;
        self.risk.register_open(placed.ticket, risk_amount);
        if signal.pending_type().is_some() {
            self.resting.insert(placed.ticket, reference_atr);
        }
        Ok(placed.ticket)
    }
}

impl std::fmt::Debug for Backtest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backtest")
            .field("bar_index", &self.bar_index)
            .field("bars_processed", &self.bars_processed)
            .field("bars_skipped", &self.bars_skipped)
            .field("open_positions", &self.positions.len())
            .field("stopped_early", &self.stopped_early)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::NoSlippage;
    use crate::domain::QuoteModel;
    use crate::engine::signal::{EntryKind, NullSignal, ScriptedSignals};
    use crate::position_management::{PartialProfitConfig, PartialProfitLevel};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(t0() + Duration::hours(i), open, high, low, close, 1.0)
    }

    fn flat_bars(n: i64, price: f64) -> Vec<Bar> {
        (0..n).map(|i| bar(i, price, price + 0.5, price - 0.5, price)).collect()
    }

    fn engine(config: EngineConfig, position: PositionManagerConfig) -> Backtest {
        Backtest::new(
            EngineConfig {
                quote_model: QuoteModel::Flat,
                ..config
            },
            SymbolSpec::default(),
            BrokerConfig::default(),
            position,
            RiskConfig {
                max_single_position_pct: 1000.0,
                ..RiskConfig::default()
            },
            Box::new(NoSlippage),
        )
        .unwrap()
    }

    #[test]
    fn rejects_bad_config() {
        let err = Backtest::new(
            EngineConfig {
                signal_check_interval: 0,
                ..EngineConfig::default()
            },
            SymbolSpec::default(),
            BrokerConfig::default(),
            PositionManagerConfig::default(),
            RiskConfig::default(),
            Box::new(NoSlippage),
        );
        assert!(matches!(err, Err(EngineError::Config(_))));
    }

    #[test]
    fn records_one_equity_point_per_bar() {
        let mut bt = engine(EngineConfig::default(), PositionManagerConfig::passive());
        let r = bt.run(&flat_bars(12, 100.0), &mut NullSignal);
        assert_eq!(r.equity_curve.len(), 12);
        assert_eq!(r.bars_processed, 12);
        assert_eq!(r.final_balance, BrokerConfig::default().initial_balance);
        assert!(r.trades.is_empty());
    }

    #[test]
    fn skips_malformed_and_out_of_order_bars() {
        let mut bars = flat_bars(5, 100.0);
        bars[1].high = f64::NAN;
        bars[3].time = bars[0].time;
        let mut bt = engine(EngineConfig::default(), PositionManagerConfig::passive());
        let r = bt.run(&bars, &mut NullSignal);
        assert_eq!(r.bars_skipped, 2);
        assert_eq!(r.bars_processed, 3);
        assert_eq!(r.equity_curve.len(), 3);
    }

    #[test]
    fn signals_only_on_interval() {
        // scripted signal on bar 3 is never asked for with interval 5
        let signal = TradeSignal::market(Side::Buy, 100.0, 95.0, Some(110.0));
        let mut source = ScriptedSignals::new(vec![(3, signal.clone()), (5, signal)]);
        let mut bt = engine(EngineConfig::default(), PositionManagerConfig::passive());
        let r = bt.run(&flat_bars(8, 100.0), &mut source);
        assert_eq!(r.signals.generated, 1);
        assert_eq!(r.signals.executed, 1);
        assert_eq!(bt.broker().positions().count(), 1);
    }

    #[test]
    fn market_signal_to_take_profit() {
        let mut bars = flat_bars(3, 100.0);
        // bar 3 runs through the target
        bars.push(bar(3, 100.0, 111.0, 99.5, 110.5));
        let config = EngineConfig {
            signal_check_interval: 1,
            ..EngineConfig::default()
        };
        let signal = TradeSignal::market(Side::Buy, 100.0, 95.0, Some(110.0));
        let mut source = ScriptedSignals::new(vec![(0, signal)]);
        let mut bt = engine(config, PositionManagerConfig::passive());
        let r = bt.run(&bars, &mut source);

        assert_eq!(r.trades.len(), 1);
        let trade = &r.trades[0];
        assert_eq!(trade.reason, ExitReason::TakeProfit);
        assert!((trade.close_price - 110.0).abs() < 1e-9);
        // 0.5% of 10k = 50 risk over 5 points = 10 units
        assert!((trade.volume - 10.0).abs() < 1e-9);
        assert!((r.final_balance - (10_000.0 + 100.0)).abs() < 1e-6);
        assert_eq!(bt.risk_manager().history().len(), 1);
        assert!(bt.position_manager().is_empty());
    }

    #[test]
    fn invalid_signal_is_rejected() {
        let config = EngineConfig {
            signal_check_interval: 1,
            ..EngineConfig::default()
        };
        let bad = TradeSignal::market(Side::Buy, 100.0, 101.0, None);
        let mut source = ScriptedSignals::new(vec![(0, bad)]);
        let mut bt = engine(config, PositionManagerConfig::passive());
        let r = bt.run(&flat_bars(2, 100.0), &mut source);
        assert_eq!(r.signals.generated, 1);
        assert_eq!(r.signals.rejected, 1);
        assert_eq!(r.signals.executed, 0);
    }

    #[test]
    fn concurrency_cap_counts_pending_orders() {
        let config = EngineConfig {
            signal_check_interval: 1,
            max_concurrent_positions: 1,
            ..EngineConfig::default()
        };
        let limit = TradeSignal::market(Side::Buy, 90.0, 85.0, None).with_entry(EntryKind::Limit);
        let mut source = ScriptedSignals::new(vec![(0, limit.clone()), (1, limit)]);
        let mut bt = engine(config, PositionManagerConfig::passive());
        let r = bt.run(&flat_bars(3, 100.0), &mut source);
        assert_eq!(r.signals.executed, 1);
        assert_eq!(r.signals.rejected, 1);
        assert_eq!(bt.broker().orders().count(), 1);
    }

    #[test]
    fn full_ladder_close_settles_risk() {
        let position = PositionManagerConfig {
            partial_profit: PartialProfitConfig {
                enabled: true,
                levels: vec![PartialProfitLevel {
                    profit_threshold_pct: 1.0,
                    close_pct: 100.0,
                }],
            },
            ..PositionManagerConfig::passive()
        };
        let config = EngineConfig {
            signal_check_interval: 1,
            ..EngineConfig::default()
        };
        let entry = TradeSignal::market(Side::Buy, 100.0, 95.0, None);
        let again = TradeSignal::market(Side::Buy, 102.0, 97.0, None);
        let mut source = ScriptedSignals::new(vec![(0, entry), (2, again)]);
        let bars = vec![
            bar(0, 100.0, 100.5, 99.5, 100.0),
            bar(1, 100.0, 102.5, 99.8, 102.0),
            bar(2, 102.0, 102.5, 101.5, 102.0),
        ];
        let mut bt = engine(config, position);
        let r = bt.run(&bars, &mut source);

        // the whole 10 units went out through the ladder on bar 1
        let first = &r.trades[0];
        assert_eq!(first.reason, ExitReason::Manual);
        assert!((first.volume - 10.0).abs() < 1e-9);
        assert!((first.profit - 20.0).abs() < 1e-9);

        let risk = bt.risk_manager();
        assert_eq!(risk.history().len(), 1);
        assert_eq!(risk.consecutive_losses(), 0);
        assert!(risk.risk_scaling_factor() > 1.0);
        // only the bar-2 position still holds risk, sized after the win
        let open = bt.broker().positions().next().unwrap();
        assert!(open.volume > 10.0);
        assert!((risk.open_exposure() - open.volume * 5.0).abs() < 1e-9);
        assert_eq!(r.signals.executed, 2);
    }

    #[test]
    fn rejects_invalid_partial_ladder() {
        let position = PositionManagerConfig {
            partial_profit: PartialProfitConfig {
                enabled: true,
                levels: vec![PartialProfitLevel {
                    profit_threshold_pct: 1.0,
                    close_pct: 120.0,
                }],
            },
            ..PositionManagerConfig::passive()
        };
        let err = Backtest::new(
            EngineConfig::default(),
            SymbolSpec::default(),
            BrokerConfig::default(),
            position,
            RiskConfig::default(),
            Box::new(NoSlippage),
        );
        assert!(matches!(err, Err(EngineError::Position(_))));
    }

    fn limit_buy(entry: f64, sl: f64) -> TradeSignal {
        TradeSignal::market(Side::Buy, entry, sl, None).with_entry(EntryKind::Limit)
    }

    #[test]
    fn pending_cap_applies_to_every_signal() {
        let config = EngineConfig {
            signal_check_interval: 1,
            max_concurrent_positions: 5,
            max_pending_orders: 1,
            ..EngineConfig::default()
        };
        let market = TradeSignal::market(Side::Buy, 100.0, 95.0, None);
        let mut source = ScriptedSignals::new(vec![
            (0, limit_buy(90.0, 85.0)),
            (1, limit_buy(80.0, 75.0)),
            (2, market),
        ]);
        let mut bt = engine(config, PositionManagerConfig::passive());
        let r = bt.run(&flat_bars(3, 100.0), &mut source);
        assert_eq!(r.signals.executed, 1);
        assert_eq!(r.signals.rejected, 2);
        assert_eq!(bt.broker().orders().count(), 1);
        assert_eq!(bt.broker().positions().count(), 0);
    }

    #[test]
    fn duplicate_pending_order_rejected() {
        let config = EngineConfig {
            signal_check_interval: 1,
            ..EngineConfig::default()
        };
        // no ATR yet: the 5-point stop sets the scale, duplicates sit within 1.0
        let mut source = ScriptedSignals::new(vec![
            (0, limit_buy(90.0, 85.0)),
            (1, limit_buy(90.5, 85.5)),
            (2, limit_buy(88.0, 83.0)),
        ]);
        let mut bt = engine(config, PositionManagerConfig::passive());
        let r = bt.run(&flat_bars(3, 100.0), &mut source);
        assert_eq!(r.signals.executed, 2);
        assert_eq!(r.signals.rejected, 1);
        let prices: Vec<f64> = bt.broker().orders().map(|o| o.price).collect();
        assert_eq!(prices, vec![90.0, 88.0]);
    }

    #[test]
    fn stale_order_cancelled_and_risk_released() {
        let config = EngineConfig {
            signal_check_interval: 1,
            ..EngineConfig::default()
        };
        // 1-point stop: the order goes stale once price is more than 3 away
        let mut source = ScriptedSignals::new(vec![(0, limit_buy(98.0, 97.0))]);
        let mut bt = engine(config, PositionManagerConfig::passive());

        let mut bars = flat_bars(3, 100.0);
        bars.push(bar(3, 100.0, 102.5, 100.0, 102.0));
        for b in &bars[..3] {
            bt.step(b, &mut source);
        }
        assert_eq!(bt.broker().orders().count(), 1);
        assert!(bt.risk_manager().open_exposure() > 0.0);

        bt.step(&bars[3], &mut source);
        assert_eq!(bt.broker().orders().count(), 0);
        assert_eq!(bt.risk_manager().open_exposure(), 0.0);
        assert_eq!(bt.signal_counts().orders_cancelled, 1);
        assert!(bt.broker().closed_trades().is_empty());
    }

    #[test]
    fn close_on_finish_flattens_book() {
        let config = EngineConfig {
            signal_check_interval: 1,
            close_on_finish: true,
            ..EngineConfig::default()
        };
        let signal = TradeSignal::market(Side::Sell, 100.0, 105.0, None);
        let mut source = ScriptedSignals::new(vec![(0, signal)]);
        let mut bt = engine(config, PositionManagerConfig::passive());
        let r = bt.run(&flat_bars(4, 100.0), &mut source);
        assert_eq!(r.trades.len(), 1);
        assert_eq!(r.trades[0].reason, ExitReason::EndOfRun);
        assert_eq!(bt.broker().positions().count(), 0);
        assert!((r.final_balance - r.final_equity).abs() < 1e-9);
    }

    #[test]
    fn stops_when_equity_is_gone() {
        let config = EngineConfig {
            signal_check_interval: 1,
            ..EngineConfig::default()
        };
        let mut bt = Backtest::new(
            EngineConfig {
                quote_model: QuoteModel::Flat,
                ..config
            },
            SymbolSpec::default(),
            BrokerConfig {
                initial_balance: 100.0,
                ..BrokerConfig::default()
            },
            PositionManagerConfig::passive(),
            RiskConfig {
                base_risk_pct: 100.0,
                max_single_position_pct: 1_000_000.0,
                max_portfolio_exposure: 1_000_000.0,
                ..RiskConfig::default()
            },
            Box::new(NoSlippage),
        )
        .unwrap();

        // risk 100 over 1 point = 100 units; the stop at 99 takes the whole balance
        let signal = TradeSignal::market(Side::Buy, 100.0, 99.0, None);
        let mut source = ScriptedSignals::new(vec![(0, signal)]);
        let mut bars = flat_bars(1, 100.0);
        bars.push(bar(1, 100.0, 100.2, 99.8, 99.9));
        bars.push(bar(2, 99.9, 99.95, 98.0, 98.0));
        bars.push(bar(3, 98.0, 98.5, 97.5, 98.0));
        let r = bt.run(&bars, &mut source);

        assert!(r.stopped_early);
        assert_eq!(r.bars_processed, 3);
        assert!(r.final_equity <= 0.0);
    }
}
