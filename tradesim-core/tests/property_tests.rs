//! Property tests for broker, position manager and sizing invariants.
//!
//! Uses proptest to verify:
//! 1. SL/TP tie-break: a bar spanning both levels always closes at the stop
//! 2. Fill monotonicity: a BuyLimit fills exactly when low <= price, within the slippage band
//! 3. Expiration precedence: an expired order never fills
//! 4. Equity identity: equity == balance + open profit after every resolution
//! 5. Partial-profit idempotence: each threshold fires at most once
//! 6. Kelly bound: the fractional stake stays in [0, 0.05]

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use tradesim_core::broker::{BrokerConfig, NoSlippage, SeededSlippage, SimulatedBroker};
use tradesim_core::domain::{
    Bar, ExitReason, OrderRequest, PendingOrderType, Side, SymbolSpec, Ticket, Tick,
};
use tradesim_core::position_management::{
    PartialProfitConfig, PositionAction, PositionFill, PositionManager, PositionManagerConfig,
};
use tradesim_core::risk::calculate_kelly_criterion;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn flat(time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Tick {
    Tick::flat(&Bar::new(time, open, high, low, close, 1.0))
}

fn broker_with_seed(seed: u64) -> SimulatedBroker {
    SimulatedBroker::new(
        SymbolSpec::default(),
        BrokerConfig::default(),
        Box::new(SeededSlippage::new(seed)),
    )
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (50.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

// ── 1. Tie-break ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn stop_wins_ties(
        entry in arb_price(),
        side in arb_side(),
        sl_frac in 0.005..0.2_f64,
        tp_frac in 0.005..0.2_f64,
        close_frac in 0.0..1.0_f64,
    ) {
        let mut b = SimulatedBroker::new(
            SymbolSpec::default(),
            BrokerConfig::default(),
            Box::new(NoSlippage),
        );
        let (sl, tp) = match side {
            Side::Buy => (entry * (1.0 - sl_frac), entry * (1.0 + tp_frac)),
            Side::Sell => (entry * (1.0 + sl_frac), entry * (1.0 - tp_frac)),
        };
        let open = flat(t0(), entry, entry, entry, entry);
        b.place_order(
            &OrderRequest::market("BTCUSD", side, 1.0).with_sl(sl).with_tp(tp),
            &open,
            t0(),
        ).unwrap();

        let high = sl.max(tp) + 1.0;
        let low = sl.min(tp) - 1.0;
        let close = low + (high - low) * close_frac;
        let now = t0() + Duration::hours(1);
        let closed = b.resolve_open_positions(&flat(now, close, high, low, close), now);

        prop_assert_eq!(closed.len(), 1);
        prop_assert_eq!(closed[0].reason, ExitReason::StopLoss);
        prop_assert!((closed[0].close_price - sl).abs() < 1e-9);
    }
}

// ── 2. Fill monotonicity ─────────────────────────────────────────────

proptest! {
    #[test]
    fn buy_limit_fills_iff_low_reaches_price(
        price in arb_price(),
        offset in -5.0..5.0_f64,
        seed in any::<u64>(),
    ) {
        let mut b = broker_with_seed(seed);
        let setup = flat(t0(), price + 10.0, price + 10.0, price + 10.0, price + 10.0);
        let placed = b.place_order(
            &OrderRequest::pending("BTCUSD", PendingOrderType::BuyLimit, 1.0, price),
            &setup,
            t0(),
        ).unwrap();

        let low = price + offset;
        let now = t0() + Duration::hours(1);
        let bar = flat(now, low + 6.0, low + 12.0, low, low + 6.0);
        let res = b.resolve_pending_orders(&bar, now);

        let max_slip = BrokerConfig::default().slippage_pips * SymbolSpec::default().point;
        if low <= price {
            prop_assert_eq!(res.filled, vec![placed.ticket]);
            let fill = b.position(placed.ticket).unwrap().open_price;
            prop_assert!(fill >= price - 1e-12);
            prop_assert!(fill <= price + max_slip + 1e-12);
        } else {
            prop_assert!(res.filled.is_empty());
            prop_assert_eq!(b.orders().count(), 1);
        }
    }
}

// ── 3. Expiration precedence ─────────────────────────────────────────

proptest! {
    #[test]
    fn expired_orders_never_fill(
        price in arb_price(),
        hours_late in 0i64..48,
        kind in prop_oneof![
            Just(PendingOrderType::BuyLimit),
            Just(PendingOrderType::SellLimit),
            Just(PendingOrderType::BuyStop),
            Just(PendingOrderType::SellStop),
        ],
    ) {
        let mut b = broker_with_seed(1);
        let expiry = t0() + Duration::hours(1);
        b.place_order(
            &OrderRequest::pending("BTCUSD", kind, 1.0, price).with_expiration(expiry),
            &flat(t0(), price, price, price, price),
            t0(),
        ).unwrap();

        // the bar straddles the trigger whichever way it points
        let now = expiry + Duration::hours(hours_late);
        let res = b.resolve_pending_orders(&flat(now, price, price + 5.0, price - 5.0, price), now);

        prop_assert!(res.filled.is_empty());
        prop_assert_eq!(res.expired.len(), 1);
        prop_assert_eq!(b.positions().count(), 0);
    }
}

// ── 4. Equity identity ───────────────────────────────────────────────

proptest! {
    #[test]
    fn equity_is_balance_plus_open_profit(
        seed in any::<u64>(),
        moves in prop::collection::vec((-3.0..3.0_f64, 0.1..2.0_f64, arb_side(), any::<bool>()), 1..30),
    ) {
        let mut b = SimulatedBroker::new(
            SymbolSpec::default(),
            BrokerConfig { commission_per_lot: 2.5, ..BrokerConfig::default() },
            Box::new(SeededSlippage::new(seed)),
        );
        let mut price = 100.0;
        let mut now = t0();

        for (step, width, side, open_new) in moves {
            now += Duration::hours(1);
            let close = (price + step).max(1.0);
            let bar = flat(now, price, price.max(close) + width, (price.min(close) - width).max(0.5), close);
            price = close;

            if open_new {
                let (sl, tp) = match side {
                    Side::Buy => (close - 2.0, close + 2.0),
                    Side::Sell => (close + 2.0, close - 2.0),
                };
                let req = OrderRequest::market("BTCUSD", side, 0.1)
                    .with_sl(sl.max(0.01))
                    .with_tp(tp.max(0.01));
                b.place_order(&req, &bar, now).unwrap();
            }

            b.resolve_pending_orders(&bar, now);
            b.resolve_open_positions(&bar, now);

            let open: f64 = b.positions().map(|p| p.profit).sum();
            prop_assert!((b.equity() - (b.balance() + open)).abs() < 1e-6);
        }
    }
}

// ── 5. Partial-profit idempotence ────────────────────────────────────

proptest! {
    #[test]
    fn each_threshold_fires_once(prices in prop::collection::vec(95.0..110.0_f64, 1..60)) {
        let config = PositionManagerConfig {
            partial_profit: PartialProfitConfig::default(),
            ..PositionManagerConfig::passive()
        };
        let mut pm = PositionManager::new(config);
        pm.track(PositionFill {
            ticket: Ticket(1000),
            symbol: "BTCUSD".into(),
            side: Side::Buy,
            entry_price: 100.0,
            volume: 1.0,
            sl: Some(90.0),
            tp: None,
            open_time: t0(),
            atr: None,
        }).unwrap();

        let mut fired = Vec::new();
        for (i, price) in prices.iter().enumerate() {
            let now = t0() + Duration::minutes(i as i64);
            if let Some(PositionAction::PartialClose { threshold_pct, .. }) =
                pm.update(Ticket(1000), *price, now, None)
            {
                prop_assert!(!fired.contains(&threshold_pct));
                fired.push(threshold_pct);
            }
        }
        prop_assert!(fired.len() <= 3);
    }
}

// ── 6. Kelly bound ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn kelly_stays_bounded(
        win_rate in 0.001..0.999_f64,
        avg_win in 0.01..10_000.0_f64,
        avg_loss in 0.01..10_000.0_f64,
        fraction in 0.0..1.0_f64,
    ) {
        let k = calculate_kelly_criterion(win_rate, avg_win, avg_loss, fraction);
        prop_assert!((0.0..=0.05).contains(&k));
    }

    #[test]
    fn kelly_bounded_for_any_float(
        win_rate in proptest::num::f64::ANY,
        avg_win in proptest::num::f64::ANY,
        avg_loss in proptest::num::f64::ANY,
        fraction in proptest::num::f64::ANY,
    ) {
        let k = calculate_kelly_criterion(win_rate, avg_win, avg_loss, fraction);
        prop_assert!((0.0..=0.05).contains(&k));
    }
}
