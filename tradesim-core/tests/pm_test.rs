//! Position manager scenarios, driven directly and through a backtest client.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tradesim_core::broker::{BacktestClient, BrokerConfig, NoSlippage, SimulatedBroker, TradingClient};
use tradesim_core::domain::{Bar, ExitReason, OrderRequest, Side, SymbolSpec, Ticket, Tick};
use tradesim_core::position_management::{
    BreakEvenConfig, DynamicTrailingConfig, MfeLock, PartialProfitConfig, PositionAction,
    PositionFill, PositionManager, PositionManagerConfig, StopReason, TrailPhase, TrailingConfig,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap()
}

fn fill(side: Side, entry: f64, sl: Option<f64>, atr: Option<f64>) -> PositionFill {
    PositionFill {
        ticket: Ticket(1000),
        symbol: "BTCUSD".into(),
        side,
        entry_price: entry,
        volume: 1.0,
        sl,
        tp: None,
        open_time: t0(),
        atr,
    }
}

fn break_even_only() -> PositionManagerConfig {
    PositionManagerConfig {
        break_even: BreakEvenConfig {
            enabled: true,
            activation_pct: 0.5,
            buffer_pct: 0.1,
        },
        ..PositionManagerConfig::passive()
    }
}

#[test]
fn break_even_fires_once() {
    let mut pm = PositionManager::new(break_even_only());
    pm.track(fill(Side::Buy, 100.0, Some(95.0), None)).unwrap();

    let actions: Vec<_> = [100.0, 100.6, 100.4, 100.8]
        .into_iter()
        .enumerate()
        .filter_map(|(i, price)| pm.update(Ticket(1000), price, t0() + Duration::minutes(i as i64), None))
        .collect();

    assert_eq!(actions.len(), 1);
    match actions[0] {
        PositionAction::ModifyStopLoss { new_sl, reason, .. } => {
            assert!((new_sl - 100.1).abs() < 1e-9);
            assert_eq!(reason, StopReason::BreakEven);
        }
        other => panic!("expected a stop move, got {other:?}"),
    }
    assert!(pm.get(Ticket(1000)).unwrap().break_even_activated);
}

#[test]
fn mfe_lock_bounds_the_trail() {
    let config = PositionManagerConfig {
        trailing: TrailingConfig::DynamicAtr(DynamicTrailingConfig {
            mfe_locks: vec![
                MfeLock {
                    trigger_risk_multiple: 2.5,
                    lock_pct: 40.0,
                },
                MfeLock {
                    trigger_risk_multiple: 4.0,
                    lock_pct: 50.0,
                },
            ],
            ..DynamicTrailingConfig::default()
        }),
        ..PositionManagerConfig::passive()
    };
    let mut pm = PositionManager::new(config);
    let managed = pm.track(fill(Side::Buy, 100.0, Some(90.0), Some(30.0))).unwrap();
    assert!((managed.initial_risk_points - 10.0).abs() < 1e-12);

    let action = pm.update(Ticket(1000), 145.0, t0(), Some(30.0)).unwrap();
    let p = pm.get(Ticket(1000)).unwrap();
    assert!((p.best_profit_points - 45.0).abs() < 1e-12);

    match action {
        PositionAction::ModifyStopLoss { new_sl, reason, .. } => {
            // floor on retained profit is 45 * 50% = 22.5 points
            assert!(new_sl >= 145.0 - 22.5 - 1e-9);
            assert!((new_sl - 122.5).abs() < 1e-9);
            assert_eq!(reason, StopReason::AtrTrailing(TrailPhase::MfeLock));
        }
        other => panic!("expected a stop move, got {other:?}"),
    }
}

#[test]
fn actions_execute_through_the_client() {
    let config = PositionManagerConfig {
        partial_profit: PartialProfitConfig::default(),
        ..break_even_only()
    };
    let mut pm = PositionManager::new(config);
    let mut client = BacktestClient::new(SimulatedBroker::new(
        SymbolSpec::default(),
        BrokerConfig::default(),
        Box::new(NoSlippage),
    ));

    let start = Tick::flat(&Bar::new(t0(), 100.0, 100.0, 100.0, 100.0, 1.0));
    client.set_market(start, t0());
    let placed = client
        .place_order(&OrderRequest::market("BTCUSD", Side::Buy, 1.0).with_sl(95.0))
        .unwrap();
    let position = client.position(placed.ticket).unwrap();
    pm.track(PositionFill::from_position(&position, None)).unwrap();

    // +0.6%: break-even only
    let now = t0() + Duration::hours(1);
    client.set_market(Tick::flat(&Bar::new(now, 100.6, 100.6, 100.6, 100.6, 1.0)), now);
    let be = pm.update(placed.ticket, 100.6, now, None).unwrap();
    assert!(pm.execute(&be, &mut client));
    let sl = client.position(placed.ticket).unwrap().sl.unwrap();
    assert!((sl - 100.1).abs() < 1e-9);
    assert_eq!(pm.get(placed.ticket).unwrap().sl, Some(sl));

    // +1.2%: the first partial level closes 30%
    let now = now + Duration::hours(1);
    client.set_market(Tick::flat(&Bar::new(now, 101.2, 101.2, 101.2, 101.2, 1.0)), now);
    let partial = pm.update(placed.ticket, 101.2, now, None).unwrap();
    assert!(matches!(partial, PositionAction::PartialClose { .. }));
    assert!(pm.execute(&partial, &mut client));
    assert!((client.position(placed.ticket).unwrap().volume - 0.7).abs() < 1e-9);
    assert!((pm.get(placed.ticket).unwrap().volume - 0.7).abs() < 1e-9);

    let trades = client.broker().closed_trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].reason, ExitReason::PartialClose);
    assert!((trades[0].profit - 0.36).abs() < 1e-9);

    // an explicit close removes the ticket from both sides
    let close = PositionAction::ClosePosition {
        ticket: placed.ticket,
        reason: ExitReason::Manual,
    };
    assert!(pm.execute(&close, &mut client));
    assert!(client.position(placed.ticket).is_none());
    assert!(!pm.is_tracked(placed.ticket));
}
