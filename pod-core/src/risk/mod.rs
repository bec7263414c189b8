//! Risk Management
//!
//! Gatekeeper for every pod order and the only place where cross-pod
//! aggregate state (global leverage, global drawdown) is evaluated.
//!
//! ## Validation Layers
//!
//! ```text
//! Pod intent → Sizing → PRE-TRADE ─────────────▶ Execution Simulator
//!                       ✓ Capital      ✓ Leverage
//!                       ✓ Positions    ✓ Concentration
//!
//! Tick boundary → mark_to_market → MONITOR ────▶ forced orders
//!                                  ✓ Global drawdown breaker
//!                                  ✓ Pod drawdown breakers
//!                                  ✓ Pod / global deleverage
//! ```
//!
//! A tripped breaker is terminal for the run: the pod's [`RiskLimit`] is
//! replaced by its halted form, its positions are liquidated, and every
//! later order is rejected.

pub mod circuit_breaker;
pub mod pre_trade;
pub mod types;

pub use circuit_breaker::{BreakerState, DrawdownBreaker};
pub use pre_trade::{Breach, OrderCheck, PreTradeValidator};
pub use types::{
    AlertKind, ExposureMetrics, GlobalLimits, PodStatus, RiskAlert, RiskDecision, RiskLimit,
    RiskPolicy, RiskViolation, Severity, ViolationOutcome, ViolationRecord,
};

use crate::core::{round_up_to_lot, InstrumentId, Order, OrderOrigin, PodId, Side, Timestamp};
use crate::execution::CostModel;
use crate::ledger::{leverage_ratio, PortfolioLedger, Position};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Synthetic order the monitor wants executed this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedOrder {
    pub pod: PodId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub quantity: Decimal,
    pub origin: OrderOrigin,
}

/// Everything one monitor pass decided
#[derive(Debug, Clone, Default)]
pub struct MonitorReport {
    pub alerts: Vec<RiskAlert>,
    /// Pods suspended by this pass
    pub suspended: Vec<PodId>,
    pub forced: Vec<ForcedOrder>,
}

impl MonitorReport {
    pub fn is_quiet(&self) -> bool {
        self.alerts.is_empty() && self.forced.is_empty()
    }

    fn force(&mut self, order: ForcedOrder) {
        let existing = self
            .forced
            .iter_mut()
            .find(|o| o.pod == order.pod && o.instrument == order.instrument);
        match existing {
            Some(o) => o.quantity += order.quantity,
            None => self.forced.push(order),
        }
    }

    fn planned(&self, pod: &PodId, instrument: &InstrumentId) -> Decimal {
        self.forced
            .iter()
            .find(|o| &o.pod == pod && &o.instrument == instrument)
            .map_or(Decimal::ZERO, |o| o.quantity)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskStats {
    pub approved: u64,
    pub scaled: u64,
    pub rejected: u64,
    pub circuit_breaks: u64,
    pub deleverages: u64,
}

/// Portion `needed / base` of gross exposure to close
#[derive(Debug, Clone, Copy)]
struct Cut {
    needed: Decimal,
    base: Decimal,
}

impl Cut {
    fn everything() -> Self {
        Self {
            needed: Decimal::ONE,
            base: Decimal::ONE,
        }
    }

    fn of(&self, held: Decimal) -> Decimal {
        if self.needed >= self.base {
            held
        } else if self.needed <= Decimal::ZERO || self.base <= Decimal::ZERO {
            Decimal::ZERO
        } else {
            held * self.needed / self.base
        }
    }
}

struct PodRisk {
    pod: PodId,
    limit: Arc<RiskLimit>,
    breaker: DrawdownBreaker,
    status: PodStatus,
}

impl PodRisk {
    fn suspend(&mut self, at: Timestamp, drawdown: Decimal, reason: String) {
        self.limit = Arc::new(self.limit.halted());
        self.breaker.trip(at, drawdown);
        self.status = PodStatus::Suspended { at, reason };
    }
}

pub struct RiskManager {
    policy: RiskPolicy,
    global: GlobalLimits,
    cost: CostModel,
    lot_size: Decimal,
    pods: Vec<PodRisk>,
    global_breaker: DrawdownBreaker,
    stats: RiskStats,
}

impl RiskManager {
    /// `pods` holds each pod's limits and starting capital, in registration order
    pub fn new(
        policy: RiskPolicy,
        global: GlobalLimits,
        cost: CostModel,
        lot_size: Decimal,
        pods: Vec<(PodId, RiskLimit, Decimal)>,
        initial_equity: Decimal,
    ) -> Self {
        info!(
            ?policy,
            max_leverage = %global.max_leverage,
            max_drawdown = %global.max_drawdown,
            pods = pods.len(),
            "Initialized RiskManager"
        );
        let pods = pods
            .into_iter()
            .map(|(pod, limit, capital)| PodRisk {
                pod,
                breaker: DrawdownBreaker::new(limit.max_drawdown, capital),
                limit: Arc::new(limit),
                status: PodStatus::Active,
            })
            .collect();
        Self {
            policy,
            global_breaker: DrawdownBreaker::new(global.max_drawdown, initial_equity),
            global,
            cost,
            lot_size,
            pods,
            stats: RiskStats::default(),
        }
    }

    pub fn policy(&self) -> RiskPolicy {
        self.policy
    }

    pub fn global_limits(&self) -> &GlobalLimits {
        &self.global
    }

    pub fn stats(&self) -> RiskStats {
        self.stats
    }

    fn find(&self, pod: &PodId) -> Option<&PodRisk> {
        self.pods.iter().find(|p| &p.pod == pod)
    }

    pub fn is_active(&self, pod: &PodId) -> bool {
        self.find(pod).map_or(false, |p| p.status.is_active())
    }

    pub fn status(&self, pod: &PodId) -> Option<&PodStatus> {
        self.find(pod).map(|p| &p.status)
    }

    /// Every pod's status in registration order
    pub fn statuses(&self) -> Vec<(PodId, PodStatus)> {
        self.pods
            .iter()
            .map(|p| (p.pod.clone(), p.status.clone()))
            .collect()
    }

    /// Current limit record for `pod`
    pub fn limit(&self, pod: &PodId) -> Option<Arc<RiskLimit>> {
        self.find(pod).map(|p| Arc::clone(&p.limit))
    }

    pub fn global_breaker(&self) -> &DrawdownBreaker {
        &self.global_breaker
    }

    // ========================================================================
    // Pre-trade
    // ========================================================================

    /// Run the pre-trade checks for one pod order
    #[allow(clippy::too_many_arguments)]
    pub fn check_order(
        &mut self,
        ledger: &PortfolioLedger,
        pod: &PodId,
        instrument: &InstrumentId,
        side: Side,
        quantity: Decimal,
        mid: Decimal,
        working_instruments: &BTreeSet<InstrumentId>,
    ) -> RiskDecision {
        let decision = match self.find(pod) {
            Some(state) if state.status.is_active() => {
                let validator = PreTradeValidator::new(
                    ledger,
                    &state.limit,
                    &self.global,
                    &self.cost,
                    self.lot_size,
                );
                validator.validate(
                    &OrderCheck {
                        pod,
                        instrument,
                        side,
                        quantity,
                        mid,
                        working_instruments,
                    },
                    self.policy,
                )
            }
            _ => RiskDecision::Reject(RiskViolation::PodSuspended { pod: pod.clone() }),
        };

        match &decision {
            RiskDecision::Approve { .. } => self.stats.approved += 1,
            RiskDecision::Scale { quantity, violation } => {
                self.stats.scaled += 1;
                warn!(%pod, %instrument, %quantity, %violation, "Order scaled");
            }
            RiskDecision::Reject(violation) => {
                self.stats.rejected += 1;
                warn!(%pod, %instrument, %violation, "Order rejected");
            }
        }
        decision
    }

    // ========================================================================
    // Post-trade monitor
    // ========================================================================

    /// Evaluate drawdown and leverage on the freshly marked ledger
    ///
    /// Runs once per tick after every fill of the tick and the
    /// mark-to-market. Order of evaluation: global breaker, pod breakers,
    /// pod deleverage, global deleverage.
    pub fn monitor(&mut self, ledger: &PortfolioLedger, at: Timestamp) -> MonitorReport {
        let mut report = MonitorReport::default();

        let equity = ledger.equity();
        if let Some(drawdown) = self.global_breaker.update(equity, at) {
            self.trip_global(ledger, at, drawdown, &mut report);
            return report;
        }

        for state in self.pods.iter_mut().filter(|p| p.status.is_active()) {
            let pod_equity = ledger.pod_equity(&state.pod);
            let Some(drawdown) = state.breaker.update(pod_equity, at) else {
                continue;
            };
            let threshold = state.limit.max_drawdown;
            let message = format!(
                "pod {} drawdown {} exceeds {}; liquidating and suspending",
                state.pod,
                drawdown.round_dp(4),
                threshold
            );
            error!(pod = %state.pod, %drawdown, %threshold, ts = at, "Circuit breaker tripped");
            state.suspend(at, drawdown, message.clone());
            self.stats.circuit_breaks += 1;

            report.suspended.push(state.pod.clone());
            report.alerts.push(RiskAlert {
                timestamp: at,
                severity: Severity::Critical,
                pod: Some(state.pod.clone()),
                kind: AlertKind::CircuitBreaker {
                    drawdown,
                    threshold,
                },
                message,
            });
            for position in ledger.open_positions(&state.pod) {
                report.force(liquidation(position, OrderOrigin::Liquidation));
            }
        }

        self.deleverage_pods(ledger, at, &mut report);
        self.deleverage_global(ledger, at, &mut report);
        report
    }

    fn trip_global(
        &mut self,
        ledger: &PortfolioLedger,
        at: Timestamp,
        drawdown: Decimal,
        report: &mut MonitorReport,
    ) {
        let threshold = self.global.max_drawdown;
        let message = format!(
            "portfolio drawdown {} exceeds {}; liquidating all pods",
            drawdown.round_dp(4),
            threshold
        );
        error!(%drawdown, %threshold, ts = at, "Global circuit breaker tripped");
        self.stats.circuit_breaks += 1;

        for state in self.pods.iter_mut().filter(|p| p.status.is_active()) {
            state.suspend(at, drawdown, message.clone());
            report.suspended.push(state.pod.clone());
        }
        report.alerts.push(RiskAlert {
            timestamp: at,
            severity: Severity::Critical,
            pod: None,
            kind: AlertKind::GlobalCircuitBreaker {
                drawdown,
                threshold,
            },
            message,
        });
        for position in ledger.all_positions().filter(|p| !p.is_flat()) {
            report.force(liquidation(position, OrderOrigin::Liquidation));
        }
    }

    /// Equity lost per unit of notional closed
    fn close_drag(&self) -> Decimal {
        let slip = self.cost.slippage_rate;
        slip + (Decimal::ONE + slip) * self.cost.transaction_cost_rate
    }

    /// Share of `gross` to close so leverage returns under `limit`
    ///
    /// ```text
    /// d = slippage + (1 + slippage) * fee_rate
    /// x = (G - L*E) / (1 - L*d)
    /// ```
    fn cut(&self, gross: Decimal, equity: Decimal, limit: Decimal) -> Cut {
        let denominator = Decimal::ONE - limit * self.close_drag();
        if equity <= Decimal::ZERO || denominator <= Decimal::ZERO {
            return Cut::everything();
        }
        Cut {
            needed: (gross - limit * equity) / denominator,
            base: gross,
        }
    }

    fn deleverage_pods(
        &mut self,
        ledger: &PortfolioLedger,
        at: Timestamp,
        report: &mut MonitorReport,
    ) {
        for state in self.pods.iter().filter(|p| p.status.is_active()) {
            let gross = ledger.pod_gross_exposure(&state.pod);
            let equity = ledger.pod_equity(&state.pod);
            let leverage = leverage_ratio(gross, equity);
            let limit = state.limit.max_leverage;
            if leverage <= limit {
                continue;
            }

            let cut = self.cut(gross, equity, limit);
            let mut planned = false;
            for position in ledger.open_positions(&state.pod) {
                if let Some(order) = self.reduce(position, cut, Decimal::ZERO) {
                    report.force(order);
                    planned = true;
                }
            }
            if !planned {
                continue;
            }

            info!(pod = %state.pod, %leverage, %limit, "Deleveraging pod");
            self.stats.deleverages += 1;
            report.alerts.push(RiskAlert {
                timestamp: at,
                severity: Severity::Warning,
                pod: Some(state.pod.clone()),
                kind: AlertKind::Deleverage { leverage, limit },
                message: format!(
                    "pod {} leverage {} exceeds {}; reducing positions",
                    state.pod,
                    leverage.round_dp(4),
                    limit
                ),
            });
        }
    }

    fn deleverage_global(
        &mut self,
        ledger: &PortfolioLedger,
        at: Timestamp,
        report: &mut MonitorReport,
    ) {
        let drag = self.close_drag();
        let mut gross = ledger.gross_exposure();
        let mut equity = ledger.equity();
        for order in &report.forced {
            let mark = ledger.mark(&order.instrument).unwrap_or_default();
            gross -= order.quantity * mark;
            equity -= order.quantity * mark * drag;
        }
        let gross = gross.max(Decimal::ZERO);
        let leverage = leverage_ratio(gross, equity);
        let limit = self.global.max_leverage;
        if leverage <= limit {
            return;
        }

        // Spread the cut over what active pods still hold
        let active: Vec<&PodId> = self
            .pods
            .iter()
            .filter(|p| p.status.is_active())
            .map(|p| &p.pod)
            .collect();
        let remaining: Vec<(&Position, Decimal)> = ledger
            .all_positions()
            .filter(|p| !p.is_flat() && active.contains(&&p.pod))
            .map(|p| (p, report.planned(&p.pod, &p.instrument)))
            .collect();
        let active_gross: Decimal = remaining
            .iter()
            .map(|(p, planned)| {
                (p.quantity.abs() - *planned) * ledger.mark(&p.instrument).unwrap_or(p.avg_cost)
            })
            .sum();
        if active_gross <= Decimal::ZERO {
            return;
        }

        let total = self.cut(gross, equity, limit);
        let cut = if total.needed >= total.base || total.needed >= active_gross {
            Cut::everything()
        } else {
            Cut {
                needed: total.needed,
                base: active_gross,
            }
        };

        let mut planned_any = false;
        for (position, planned) in remaining {
            if let Some(order) = self.reduce(position, cut, planned) {
                report.force(order);
                planned_any = true;
            }
        }
        if !planned_any {
            return;
        }

        info!(%leverage, %limit, "Deleveraging portfolio");
        self.stats.deleverages += 1;
        report.alerts.push(RiskAlert {
            timestamp: at,
            severity: Severity::Warning,
            pod: None,
            kind: AlertKind::Deleverage { leverage, limit },
            message: format!(
                "global leverage {} exceeds {}; reducing active pods",
                leverage.round_dp(4),
                limit
            ),
        });
    }

    /// Closing order for `cut` of what is left of `position`
    fn reduce(&self, position: &Position, cut: Cut, planned: Decimal) -> Option<ForcedOrder> {
        let held = position.quantity.abs() - planned;
        if held <= Decimal::ZERO {
            return None;
        }
        let quantity = round_up_to_lot(cut.of(held), self.lot_size).min(held);
        if quantity <= Decimal::ZERO {
            return None;
        }
        Some(ForcedOrder {
            pod: position.pod.clone(),
            instrument: position.instrument.clone(),
            side: closing_side(position),
            quantity,
            origin: OrderOrigin::Deleverage,
        })
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Exposure breakdown for one pod, or the whole portfolio with `None`
    pub fn exposure(&self, ledger: &PortfolioLedger, pod: Option<&PodId>) -> ExposureMetrics {
        let mut metrics = ExposureMetrics::default();
        let mut largest = Decimal::ZERO;
        let positions = ledger
            .all_positions()
            .filter(|p| !p.is_flat() && pod.map_or(true, |id| &p.pod == id));
        for position in positions {
            let mark = ledger.mark(&position.instrument).unwrap_or(position.avg_cost);
            let value = position.market_value(mark);
            if value > Decimal::ZERO {
                metrics.long_exposure += value;
            } else {
                metrics.short_exposure += -value;
            }
            largest = largest.max(value.abs());
        }
        metrics.gross_exposure = metrics.long_exposure + metrics.short_exposure;
        metrics.net_exposure = metrics.long_exposure - metrics.short_exposure;

        let equity = match pod {
            Some(id) => ledger.pod_equity(id),
            None => ledger.equity(),
        };
        metrics.leverage = leverage_ratio(metrics.gross_exposure, equity);
        if equity > Decimal::ZERO {
            metrics.largest_position_weight = largest / equity;
        }
        metrics
    }
}

fn closing_side(position: &Position) -> Side {
    if position.is_long() {
        Side::Sell
    } else {
        Side::Buy
    }
}

fn liquidation(position: &Position, origin: OrderOrigin) -> ForcedOrder {
    ForcedOrder {
        pod: position.pod.clone(),
        instrument: position.instrument.clone(),
        side: closing_side(position),
        quantity: position.quantity.abs(),
        origin,
    }
}

/// Alert raised when a pre-trade check scales or rejects `order`
pub fn decision_alert(at: Timestamp, order: &Order, decision: &RiskDecision) -> Option<RiskAlert> {
    let (severity, kind, violation) = match decision {
        RiskDecision::Approve { .. } => return None,
        RiskDecision::Scale { violation, .. } => (Severity::Info, AlertKind::OrderScaled, violation),
        RiskDecision::Reject(violation) => (Severity::Warning, AlertKind::OrderRejected, violation),
    };
    let message = match decision {
        RiskDecision::Scale { quantity, .. } => format!(
            "{} {} {} scaled {} -> {}: {}",
            order.id, order.side, order.instrument, order.requested_quantity, quantity, violation
        ),
        _ => format!(
            "{} {} {} x{} rejected: {}",
            order.id, order.side, order.instrument, order.requested_quantity, violation
        ),
    };
    Some(RiskAlert {
        timestamp: at,
        severity,
        pod: Some(order.pod.clone()),
        kind,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FillId, OrderId};
    use crate::execution::Fill;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn alpha() -> PodId {
        PodId::from("alpha")
    }

    fn beta() -> PodId {
        PodId::from("beta")
    }

    fn aapl() -> InstrumentId {
        InstrumentId::from("AAPL")
    }

    fn buy(pod: PodId, qty: Decimal, price: Decimal) -> Fill {
        Fill {
            id: FillId(1),
            order_id: OrderId(1),
            pod,
            instrument: aapl(),
            side: Side::Buy,
            origin: OrderOrigin::Pod,
            quantity: qty,
            price,
            mid_price: price,
            transaction_cost: Decimal::ZERO,
            slippage: Decimal::ZERO,
            timestamp: 1,
        }
    }

    fn mark(ledger: &mut PortfolioLedger, price: Decimal, ts: Timestamp) {
        let marks: BTreeMap<_, _> = [(aapl(), price)].into_iter().collect();
        ledger.mark_to_market(&marks, ts);
    }

    fn manager(pod_dd: Decimal, global: GlobalLimits, pods: &[(PodId, Decimal)]) -> RiskManager {
        let total = pods.iter().map(|(_, c)| *c).sum();
        RiskManager::new(
            RiskPolicy::Scale,
            global,
            CostModel::frictionless(),
            dec!(1),
            pods.iter()
                .map(|(p, c)| (p.clone(), RiskLimit::new(dec!(2), 10, pod_dd), *c))
                .collect(),
            total,
        )
    }

    fn limits(max_leverage: Decimal, max_drawdown: Decimal) -> GlobalLimits {
        GlobalLimits {
            max_leverage,
            max_drawdown,
            max_concentration: None,
        }
    }

    #[test]
    fn test_pod_breaker_liquidates_and_suspends() {
        let mut ledger = PortfolioLedger::new(dec!(100_000), dec!(2), &[(alpha(), dec!(100_000))]);
        ledger.apply_fill(&buy(alpha(), dec!(1000), dec!(100))).unwrap();
        let mut risk = manager(dec!(0.2), limits(dec!(3), dec!(0.5)), &[(alpha(), dec!(100_000))]);

        mark(&mut ledger, dec!(100), 1);
        assert!(risk.monitor(&ledger, 1).is_quiet());

        // 25% off the peak
        mark(&mut ledger, dec!(75), 2);
        let report = risk.monitor(&ledger, 2);
        assert_eq!(report.suspended, vec![alpha()]);
        assert_eq!(
            report.forced,
            vec![ForcedOrder {
                pod: alpha(),
                instrument: aapl(),
                side: Side::Sell,
                quantity: dec!(1000),
                origin: OrderOrigin::Liquidation,
            }]
        );
        assert_eq!(report.alerts[0].severity, Severity::Critical);
        assert_eq!(
            report.alerts[0].kind,
            AlertKind::CircuitBreaker {
                drawdown: dec!(0.25),
                threshold: dec!(0.2)
            }
        );

        assert!(!risk.is_active(&alpha()));
        assert!(risk.limit(&alpha()).unwrap().trading_halted);
        assert_eq!(risk.stats().circuit_breaks, 1);

        let decision = risk.check_order(
            &ledger,
            &alpha(),
            &aapl(),
            Side::Buy,
            dec!(1),
            dec!(75),
            &BTreeSet::new(),
        );
        assert_eq!(
            decision,
            RiskDecision::Reject(RiskViolation::PodSuspended { pod: alpha() })
        );

        // Suspended pods are not evaluated again
        mark(&mut ledger, dec!(50), 3);
        assert!(risk.monitor(&ledger, 3).is_quiet());
    }

    #[test]
    fn test_global_breaker_stops_every_pod() {
        let mut ledger = PortfolioLedger::new(
            dec!(100_000),
            dec!(2),
            &[(alpha(), dec!(50_000)), (beta(), dec!(50_000))],
        );
        ledger.apply_fill(&buy(alpha(), dec!(500), dec!(100))).unwrap();
        let mut risk = manager(
            dec!(0.5),
            limits(dec!(3), dec!(0.1)),
            &[(alpha(), dec!(50_000)), (beta(), dec!(50_000))],
        );

        // alpha down 30% (under its own 50%), portfolio down 15%
        mark(&mut ledger, dec!(70), 1);
        let report = risk.monitor(&ledger, 1);
        assert_eq!(report.suspended, vec![alpha(), beta()]);
        assert!(matches!(
            report.alerts[0].kind,
            AlertKind::GlobalCircuitBreaker { .. }
        ));
        assert_eq!(report.forced.len(), 1);
        assert_eq!(report.forced[0].quantity, dec!(500));
        assert!(!risk.is_active(&beta()));
    }

    #[test]
    fn test_pod_deleverage_after_adverse_move() {
        let mut ledger = PortfolioLedger::new(dec!(100_000), dec!(2), &[(alpha(), dec!(100_000))]);
        ledger.apply_fill(&buy(alpha(), dec!(1800), dec!(100))).unwrap();
        let mut risk = manager(dec!(0.5), limits(dec!(3), dec!(0.5)), &[(alpha(), dec!(100_000))]);

        // gross 153_000 on equity 73_000: 2.096x against a 2x limit
        mark(&mut ledger, dec!(85), 1);
        let report = risk.monitor(&ledger, 1);
        assert!(report.suspended.is_empty());
        assert_eq!(report.forced.len(), 1);
        let order = &report.forced[0];
        assert_eq!(order.origin, OrderOrigin::Deleverage);
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.quantity, dec!(83));

        let leverage = (dec!(1800) - order.quantity) * dec!(85) / dec!(73_000);
        assert!(leverage <= dec!(2));
        assert_eq!(report.alerts[0].severity, Severity::Warning);
        assert_eq!(risk.stats().deleverages, 1);
    }

    #[test]
    fn test_global_deleverage_spreads_over_pods() {
        let mut ledger = PortfolioLedger::new(
            dec!(100_000),
            dec!(2),
            &[(alpha(), dec!(50_000)), (beta(), dec!(50_000))],
        );
        ledger.apply_fill(&buy(alpha(), dec!(900), dec!(100))).unwrap();
        ledger.apply_fill(&buy(beta(), dec!(900), dec!(100))).unwrap();
        let mut risk = manager(
            dec!(0.9),
            limits(dec!(1.5), dec!(0.9)),
            &[(alpha(), dec!(50_000)), (beta(), dec!(50_000))],
        );

        // 1.8x globally, under each pod's 2x
        mark(&mut ledger, dec!(100), 1);
        let report = risk.monitor(&ledger, 1);
        assert_eq!(report.forced.len(), 2);
        assert!(report
            .forced
            .iter()
            .all(|o| o.origin == OrderOrigin::Deleverage && o.quantity == dec!(150)));
        assert!(report.alerts[0].pod.is_none());
    }

    #[test]
    fn test_exposure_metrics() {
        let mut ledger = PortfolioLedger::new(dec!(100_000), dec!(2), &[(alpha(), dec!(100_000))]);
        ledger.apply_fill(&buy(alpha(), dec!(500), dec!(100))).unwrap();
        mark(&mut ledger, dec!(100), 1);
        let risk = manager(dec!(0.2), limits(dec!(2), dec!(0.2)), &[(alpha(), dec!(100_000))]);

        let metrics = risk.exposure(&ledger, Some(&alpha()));
        assert_eq!(metrics.long_exposure, dec!(50_000));
        assert_eq!(metrics.short_exposure, Decimal::ZERO);
        assert_eq!(metrics.net_exposure, dec!(50_000));
        assert_eq!(metrics.leverage, dec!(0.5));
        assert_eq!(metrics.largest_position_weight, dec!(0.5));
        assert_eq!(risk.exposure(&ledger, None), metrics);
    }

    #[test]
    fn test_decision_alert() {
        let order = Order::new(
            OrderId(3),
            alpha(),
            aapl(),
            Side::Buy,
            dec!(500),
            crate::core::OrderType::Market,
            OrderOrigin::Pod,
            1,
        );
        let approve = RiskDecision::Approve { quantity: dec!(500) };
        assert!(decision_alert(1, &order, &approve).is_none());

        let scale = RiskDecision::Scale {
            quantity: dec!(200),
            violation: RiskViolation::GlobalLeverage {
                projected: dec!(2.3),
                max: dec!(2),
            },
        };
        let alert = decision_alert(1, &order, &scale).unwrap();
        assert_eq!(alert.kind, AlertKind::OrderScaled);
        assert!(alert.message.contains("500 -> 200"));
    }
}
