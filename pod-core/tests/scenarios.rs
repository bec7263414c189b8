//! End-to-end acceptance scenarios: costs, leverage scaling, drawdown
//! breaker, feed exhaustion

use pod_core::core::{DateRange, InstrumentId, OrderOrigin, OrderStatus, PodId, Side};
use pod_core::data::{FeedRecordKind, InMemoryFeed};
use pod_core::engine::{RunStatus, Simulator};
use pod_core::events::EventKind;
use pod_core::pod::{OrderRequest, PodRegistry};
use pod_core::risk::{AlertKind, PodStatus, RiskLimit, RiskPolicy, RiskViolation, Severity, ViolationOutcome};
use pod_core::testing::{bar, closes, sim_config, spec, spec_with_limit, ScriptedPod};
use pod_core::SimConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn aapl() -> InstrumentId {
    InstrumentId::from("AAPL")
}

fn frictionless(initial: Decimal, max_leverage: Decimal) -> SimConfig {
    let mut config = sim_config(initial, max_leverage);
    config.global.transaction_cost = Decimal::ZERO;
    config.global.slippage = Decimal::ZERO;
    config
}

#[test]
fn test_scenario_a_single_buy_costs() -> anyhow::Result<()> {
    let config = sim_config(dec!(100_000), dec!(1));
    let registry = PodRegistry::new().with(
        spec("alpha", dec!(100_000)),
        Box::new(ScriptedPod::new("alpha").at(1, OrderRequest::market(aapl(), Side::Buy, dec!(100)))),
    )?;
    let mut feed = InMemoryFeed::from_bars(vec![bar("AAPL", 1, dec!(50), dec!(10_000))]);

    let result = pod_core::run(config, registry, &mut feed, &[aapl()], DateRange::unbounded())?;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.trade_log.len(), 1);
    let fill = &result.trade_log[0];
    assert_eq!(fill.price, dec!(50.025));
    assert_eq!(fill.transaction_cost, dec!(5.0025));
    assert_eq!(fill.quantity, dec!(100));

    // 100 * 50.025 + 5.0025
    assert_eq!(result.ledger.cash, dec!(100_000) - dec!(5007.5025));
    assert_eq!(result.ledger.equity, dec!(99_992.4975));
    assert_eq!(result.orders[0].status, OrderStatus::Filled);
    Ok(())
}

fn leverage_run(policy: RiskPolicy) -> anyhow::Result<pod_core::RunResult> {
    let mut config = frictionless(dec!(100_000), dec!(2));
    config.global.risk_policy = policy;
    // Pod limit looser than the portfolio's, so the global check binds
    let registry = PodRegistry::new().with(
        spec_with_limit("alpha", dec!(100_000), RiskLimit::new(dec!(3), 5, dec!(0.2))),
        Box::new(
            ScriptedPod::new("alpha")
                .at(1, OrderRequest::market(aapl(), Side::Buy, dec!(1800)))
                .at(2, OrderRequest::market(aapl(), Side::Buy, dec!(500))),
        ),
    )?;
    let mut feed = InMemoryFeed::from_bars(closes(
        "AAPL",
        1,
        1,
        &[dec!(100), dec!(100), dec!(100)],
        dec!(1_000_000),
    ));
    Ok(pod_core::run(config, registry, &mut feed, &[aapl()], DateRange::unbounded())?)
}

#[test]
fn test_scenario_b_order_scaled_to_leverage_limit() -> anyhow::Result<()> {
    let result = leverage_run(RiskPolicy::Scale)?;

    // 1.8x before, 2.3x requested
    let second = &result.orders[1];
    assert_eq!(second.requested_quantity, dec!(500));
    assert_eq!(second.quantity, dec!(200));
    assert_eq!(second.status, OrderStatus::Filled);

    assert_eq!(result.risk_violations.len(), 1);
    let record = &result.risk_violations[0];
    assert_eq!(record.outcome, ViolationOutcome::Scaled);
    assert_eq!(record.approved, dec!(200));
    assert!(matches!(record.violation, RiskViolation::GlobalLeverage { .. }));

    assert_eq!(result.ledger.leverage, dec!(2));
    assert_eq!(result.stats.orders_scaled, 1);
    assert!(result
        .risk_alerts
        .iter()
        .any(|a| a.kind == AlertKind::OrderScaled && a.severity == Severity::Info));
    Ok(())
}

#[test]
fn test_scenario_b_reject_policy_refuses_instead() -> anyhow::Result<()> {
    let result = leverage_run(RiskPolicy::Reject)?;

    let second = &result.orders[1];
    assert_eq!(second.status, OrderStatus::Rejected);
    assert_eq!(second.filled_quantity, Decimal::ZERO);
    assert_eq!(result.risk_violations[0].outcome, ViolationOutcome::Rejected);
    assert_eq!(result.ledger.leverage, dec!(1.8));
    assert_eq!(result.stats.orders_rejected, 1);
    Ok(())
}

#[test]
fn test_scenario_c_drawdown_liquidates_and_suspends() -> anyhow::Result<()> {
    let config = frictionless(dec!(100_000), dec!(1));
    let alpha = PodId::from("alpha");
    let beta = PodId::from("beta");
    let registry = PodRegistry::new()
        .with(
            spec("alpha", dec!(50_000)),
            Box::new(
                ScriptedPod::new("alpha")
                    .at(1, OrderRequest::market(aapl(), Side::Buy, dec!(500)))
                    .at(3, OrderRequest::market(aapl(), Side::Buy, dec!(10))),
            ),
        )?
        .with(
            spec("beta", dec!(50_000)),
            Box::new(ScriptedPod::new("beta").at(3, OrderRequest::market(aapl(), Side::Buy, dec!(10)))),
        )?;
    // 25% drop: alpha's equity 50_000 -> 37_500, portfolio only -12.5%
    let mut feed = InMemoryFeed::from_bars(closes(
        "AAPL",
        1,
        1,
        &[dec!(100), dec!(75), dec!(75)],
        dec!(100_000),
    ));

    let result = pod_core::run(config, registry, &mut feed, &[aapl()], DateRange::unbounded())?;
    assert_eq!(result.status, RunStatus::PartialSuccess);

    let liquidation = result
        .orders
        .iter()
        .find(|o| o.origin == OrderOrigin::Liquidation)
        .ok_or_else(|| anyhow::anyhow!("no liquidation order"))?;
    assert_eq!(liquidation.pod, alpha);
    assert_eq!(liquidation.side, Side::Sell);
    assert_eq!(liquidation.quantity, dec!(500));
    assert_eq!(liquidation.created_at, 2);
    assert_eq!(liquidation.status, OrderStatus::Filled);
    assert!(result
        .trade_log
        .iter()
        .any(|f| f.order_id == liquidation.id && f.timestamp == 2 && f.price == dec!(75)));

    match &result.pod(&alpha).map(|p| p.status.clone()) {
        Some(PodStatus::Suspended { at, .. }) => assert_eq!(*at, 2),
        other => panic!("alpha should be suspended, got {:?}", other),
    }
    assert!(result.pod(&beta).map_or(false, |p| p.is_healthy()));

    // Nothing from alpha after the trip; beta keeps trading
    assert!(!result.orders.iter().any(|o| o.pod == alpha && o.created_at > 2));
    assert!(result
        .orders
        .iter()
        .any(|o| o.pod == beta && o.created_at == 3 && o.status == OrderStatus::Filled));

    assert!(result.risk_alerts.iter().any(|a| {
        a.pod.as_ref() == Some(&alpha)
            && a.severity == Severity::Critical
            && matches!(a.kind, AlertKind::CircuitBreaker { .. })
    }));
    let position = result.ledger.position(&alpha, &aapl()).map_or(Decimal::ZERO, |p| p.quantity);
    assert_eq!(position, Decimal::ZERO);
    assert_eq!(result.ledger.pod(&alpha).map(|p| p.cash), Some(dec!(37_500)));
    Ok(())
}

#[test]
fn test_scenario_d_exhausted_feed_is_dropped() -> anyhow::Result<()> {
    let config = sim_config(dec!(100_000), dec!(1));
    let spy = InstrumentId::from("SPY");
    let registry = PodRegistry::new().with(
        spec("alpha", dec!(100_000)),
        Box::new(ScriptedPod::new("alpha").at(1, OrderRequest::market(spy.clone(), Side::Buy, dec!(10)))),
    )?;

    let ten: Vec<Decimal> = (1..=10).map(|i| Decimal::from(100 + i)).collect();
    let mut bars = closes("AAPL", 1, 1, &ten, dec!(10_000));
    bars.extend(closes("MSFT", 1, 1, &ten, dec!(10_000)));
    bars.extend(closes("SPY", 1, 1, &[dec!(400), dec!(401), dec!(402), dec!(403)], dec!(10_000)));
    let mut feed = InMemoryFeed::from_bars(bars);
    let instruments = [aapl(), InstrumentId::from("MSFT"), spy.clone()];

    let mut sim = Simulator::new(config, registry)?;
    let market_data = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&market_data);
    sim.subscribe(EventKind::MarketData, move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    let result = sim.run(&mut feed, &instruments, DateRange::unbounded())?;

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.stats.ticks, 10);
    // SPY bars stop after t=4, nothing is forward-filled for it
    assert_eq!(market_data.load(Ordering::Relaxed), 10 + 10 + 4);
    // Only end-of-series records: SPY at t=4, the others at the end
    assert!(result
        .feed_records
        .iter()
        .all(|r| r.kind == FeedRecordKind::Exhausted));
    let spy_end: Vec<_> = result
        .feed_records
        .iter()
        .filter(|r| r.instrument == spy)
        .map(|r| r.timestamp)
        .collect();
    assert_eq!(spy_end, vec![4]);
    assert_eq!(result.feed_records.len(), 3);

    // SPY stays marked at its last close
    assert_eq!(result.ledger.marks.get(&spy), Some(&dec!(403)));
    Ok(())
}
