//! Run driver
//!
//! ## Tick Pipeline
//!
//! ```text
//!  FeedSynchronizer::next_tick ──▶ [bars @ t]
//!        │
//!        ├─ for each bar: publish MarketData, drain bus
//!        │     ├─ record history, update mark
//!        │     ├─ resting orders: risk re-check → try_fill → ledger
//!        │     └─ pods: signals (registration order) → sizing
//!        │              → pre-trade check → submit → try_fill → ledger
//!        │
//!        └─ publish Tick, drain bus
//!              ├─ mark_to_market
//!              ├─ risk monitor → cancel suspended pods' orders
//!              │               → forced liquidation / deleverage fills
//!              └─ publish LedgerSnapshot
//! ```
//!
//! Every ledger write happens on the driver thread, one after another. Only
//! the pods' signal stage may fan out to worker threads, and its results
//! are merged back into registration order before anything is sized.

use super::cancel::CancellationToken;
use super::result::{PodReport, RunResult, RunStats, RunStatus};
use crate::config::SimConfig;
use crate::core::{
    ConfigError, DateRange, InstrumentId, Order, OrderId, OrderOrigin, OrderType,
    PodExecutionError, PodId, PodStage, SimError, Timestamp,
};
use crate::data::{Bar, DataFeed, FeedSynchronizer};
use crate::events::{Event, EventBus, EventKind, EventPayload};
use crate::execution::ExecutionSimulator;
use crate::ledger::{PortfolioLedger, SnapshotHandle};
use crate::pod::{
    MarketHistory, MarketView, OrderRequest, PodAllocation, PodOrchestrator, PodRegistry,
    TradeIntent,
};
use crate::risk::{
    decision_alert, AlertKind, ForcedOrder, PodStatus, RiskAlert, RiskDecision, RiskManager,
    RiskViolation, Severity, ViolationOutcome, ViolationRecord,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub struct Simulator {
    config: SimConfig,
    bus: EventBus,
    history: MarketHistory,
    orchestrator: PodOrchestrator,
    risk: RiskManager,
    execution: ExecutionSimulator,
    ledger: PortfolioLedger,
    snapshots: SnapshotHandle,
    cancel: CancellationToken,
    alerts: Vec<RiskAlert>,
    violations: Vec<ViolationRecord>,
    next_order_id: u64,
    ticks: u64,
    rejected: u64,
    scaled: u64,
}

impl Simulator {
    /// Wire every component for one run
    ///
    /// Capital comes from the registry's pod specs; whatever they leave of
    /// `initial_capital` stays in reserve.
    pub fn new(config: SimConfig, registry: PodRegistry) -> Result<Self, SimError> {
        config.validate()?;
        if registry.is_empty() {
            return Err(ConfigError::invalid("strategies", "no pods registered").into());
        }
        let committed = registry.total_capital();
        if committed > config.global.initial_capital {
            return Err(ConfigError::invalid(
                "strategies.*.allocation",
                format!(
                    "pods hold {} but initial capital is {}",
                    committed, config.global.initial_capital
                ),
            )
            .into());
        }

        let allocations: Vec<(PodId, Decimal)> =
            registry.specs().map(|s| (s.id.clone(), s.capital)).collect();
        let pod_limits = registry
            .specs()
            .map(|s| (s.id.clone(), s.limit.clone(), s.capital))
            .collect();

        let g = &config.global;
        let ledger = PortfolioLedger::new(g.initial_capital, g.max_leverage, &allocations);
        let risk = RiskManager::new(
            g.risk_policy,
            config.global_limits(),
            config.cost_model(),
            g.lot_size,
            pod_limits,
            g.initial_capital,
        );
        let execution = ExecutionSimulator::new(config.execution_config());
        let history = MarketHistory::new(g.history_window);
        let orchestrator = PodOrchestrator::new(registry, g.parallel_signals);

        Ok(Self {
            config,
            bus: EventBus::new(),
            history,
            orchestrator,
            risk,
            execution,
            ledger,
            snapshots: SnapshotHandle::new(),
            cancel: CancellationToken::new(),
            alerts: Vec::new(),
            violations: Vec::new(),
            next_order_id: 1,
            ticks: 0,
            rejected: 0,
            scaled: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Observe events of one kind as they are dispatched
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.bus.subscribe(kind, handler);
    }

    pub fn subscribe_all<F>(&mut self, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.bus.subscribe_all(handler);
    }

    /// Token that stops the run at the next tick boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Handle to the ledger snapshot published at every tick boundary
    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshots.clone()
    }

    /// Replay `instruments` over `range` to the end of the data
    pub fn run(
        mut self,
        feed: &mut dyn DataFeed,
        instruments: &[InstrumentId],
        range: DateRange,
    ) -> Result<RunResult, SimError> {
        let mut sync =
            FeedSynchronizer::open(feed, instruments, range, &self.config.sync_config())?;
        info!(
            pods = self.orchestrator.len(),
            instruments = instruments.len(),
            start = range.start,
            end = range.end,
            "Starting simulation"
        );

        let mut cancelled = false;
        loop {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let Some(bars) = sync.next_tick()? else {
                break;
            };
            self.process_tick(bars)?;
        }

        let end = self.bus.now();
        let reason = if cancelled { "run cancelled" } else { "end of run" };
        self.execution.cancel_all(reason, end)?;
        self.ledger.reconcile()?;

        Ok(self.finish(sync, cancelled))
    }

    fn process_tick(&mut self, bars: Vec<Bar>) -> Result<(), SimError> {
        let Some(ts) = bars.first().map(|b| b.timestamp) else {
            return Ok(());
        };
        for bar in bars {
            self.bus.publish(ts, EventPayload::MarketData(bar))?;
            self.drain()?;
        }
        self.bus.publish(ts, EventPayload::Tick)?;
        self.drain()?;
        self.ticks += 1;
        Ok(())
    }

    fn drain(&mut self) -> Result<(), SimError> {
        while let Some(event) = self.bus.advance() {
            match event.payload {
                EventPayload::MarketData(bar) => self.on_market_data(&bar)?,
                EventPayload::Tick => self.on_tick(event.timestamp)?,
                _ => {}
            }
        }
        Ok(())
    }

    // ========================================================================
    // Market data
    // ========================================================================

    fn on_market_data(&mut self, bar: &Bar) -> Result<(), SimError> {
        self.history.record(bar);
        self.ledger.update_mark(&bar.instrument, bar.mid_price());
        self.work_resting(bar)?;
        self.run_pods(bar)
    }

    /// Re-check and try to fill orders left working by earlier bars
    fn work_resting(&mut self, bar: &Bar) -> Result<(), SimError> {
        for id in self.execution.working_ids_for(&bar.instrument) {
            let Some(order) = self.execution.order(id).cloned() else {
                continue;
            };
            if order.origin == OrderOrigin::Pod {
                if self.orchestrator.is_excluded(&order.pod) {
                    self.execution.cancel(id, "pod excluded", bar.timestamp)?;
                    continue;
                }
                if !self.recheck(&order, bar)? {
                    continue;
                }
            }
            self.execute(id, bar)?;
        }
        Ok(())
    }

    /// Returns whether the order is still working
    fn recheck(&mut self, order: &Order, bar: &Bar) -> Result<bool, SimError> {
        let ts = bar.timestamp;
        let remaining = order.remaining_quantity();
        let working = self.execution.working_instruments(&order.pod);
        let decision = self.risk.check_order(
            &self.ledger,
            &order.pod,
            &order.instrument,
            order.side,
            remaining,
            bar.mid_price(),
            &working,
        );
        match decision {
            RiskDecision::Approve { .. } => Ok(true),
            RiskDecision::Scale { quantity, violation } => {
                self.execution.shrink(order.id, quantity, ts);
                self.record_violation(
                    ts,
                    order,
                    remaining,
                    quantity,
                    ViolationOutcome::Scaled,
                    violation,
                );
                Ok(true)
            }
            RiskDecision::Reject(violation) => {
                self.execution.cancel(order.id, &violation.to_string(), ts)?;
                self.record_violation(
                    ts,
                    order,
                    remaining,
                    Decimal::ZERO,
                    ViolationOutcome::Cancelled,
                    violation,
                );
                Ok(false)
            }
        }
    }

    fn run_pods(&mut self, bar: &Bar) -> Result<(), SimError> {
        let ts = bar.timestamp;
        let view = MarketView::new(bar, &self.history);
        let risk = &self.risk;
        let round = self
            .orchestrator
            .generate_signals(&view, |pod| risk.is_active(pod));

        for failure in round.failures {
            self.pod_failed(failure)?;
        }
        for (pod, intents) in round.intents {
            for intent in intents {
                self.bus.publish(
                    ts,
                    EventPayload::Signal {
                        pod: pod.clone(),
                        intent: intent.clone(),
                    },
                )?;
                if !self.size_and_place(&pod, &intent, bar)? {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Returns `false` once the pod has been excluded
    fn size_and_place(
        &mut self,
        pod: &PodId,
        intent: &TradeIntent,
        bar: &Bar,
    ) -> Result<bool, SimError> {
        let ts = bar.timestamp;
        let Some(limit) = self.risk.limit(pod) else {
            return Ok(false);
        };
        let allocation =
            PodAllocation::from_ledger(&self.ledger, pod, &limit, self.config.global.lot_size);

        let request = match self.orchestrator.size_order(pod, intent, &allocation, ts) {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(true),
            Err(err) => {
                self.pod_failed(err)?;
                return Ok(false);
            }
        };

        let Some(mid) = self.ledger.mark(&request.instrument) else {
            let message = format!("no price for {}", request.instrument);
            if let Some(err) = self.orchestrator.fail(pod, PodStage::Sizing, ts, message) {
                self.pod_failed(err)?;
            }
            return Ok(false);
        };
        self.place(pod, request, mid, bar)?;
        Ok(true)
    }

    fn place(
        &mut self,
        pod: &PodId,
        request: OrderRequest,
        mid: Decimal,
        bar: &Bar,
    ) -> Result<(), SimError> {
        let ts = bar.timestamp;
        let mut order = Order::new(
            self.next_id(),
            pod.clone(),
            request.instrument.clone(),
            request.side,
            request.quantity,
            request.order_type,
            OrderOrigin::Pod,
            ts,
        );
        let working = self.execution.working_instruments(pod);
        let decision = self.risk.check_order(
            &self.ledger,
            pod,
            &request.instrument,
            request.side,
            request.quantity,
            mid,
            &working,
        );
        if let Some(alert) = decision_alert(ts, &order, &decision) {
            self.raise(alert)?;
        }

        let quantity = match decision {
            RiskDecision::Approve { quantity } => quantity,
            RiskDecision::Scale { quantity, violation } => {
                self.scaled += 1;
                self.record_violation(
                    ts,
                    &order,
                    request.quantity,
                    quantity,
                    ViolationOutcome::Scaled,
                    violation,
                );
                quantity
            }
            RiskDecision::Reject(violation) => {
                self.rejected += 1;
                order.reject(violation.to_string(), ts)?;
                self.record_violation(
                    ts,
                    &order,
                    request.quantity,
                    Decimal::ZERO,
                    ViolationOutcome::Rejected,
                    violation,
                );
                self.execution.retire_rejected(order);
                return Ok(());
            }
        };

        order.approve(quantity, ts)?;
        let id = self.submit(order, ts)?;
        if request.instrument == bar.instrument {
            self.execute(id, bar)?;
        }
        Ok(())
    }

    // ========================================================================
    // Tick boundary
    // ========================================================================

    fn on_tick(&mut self, ts: Timestamp) -> Result<(), SimError> {
        let closes = self.history.latest_closes();
        self.ledger.mark_to_market(&closes, ts);

        let report = self.risk.monitor(&self.ledger, ts);
        for pod in &report.suspended {
            let cancelled = self
                .execution
                .cancel_pod(pod, "pod suspended by risk manager", ts)?;
            if cancelled > 0 {
                debug!(%pod, cancelled, "Cancelled suspended pod's working orders");
            }
        }
        for alert in report.alerts {
            self.raise(alert)?;
        }
        for forced in report.forced {
            self.force(forced, ts)?;
        }

        self.snapshots.publish(self.ledger.snapshot(ts));
        debug!(
            ts,
            equity = %self.ledger.equity(),
            leverage = %self.ledger.leverage(),
            working = self.execution.working_count(),
            "tick complete"
        );
        Ok(())
    }

    /// Execute a risk-originated order in full at the current mark
    fn force(&mut self, forced: ForcedOrder, ts: Timestamp) -> Result<(), SimError> {
        let Some(mid) = self.ledger.mark(&forced.instrument) else {
            warn!(pod = %forced.pod, instrument = %forced.instrument, "No mark for forced order");
            return Ok(());
        };
        let mut order = Order::new(
            self.next_id(),
            forced.pod,
            forced.instrument.clone(),
            forced.side,
            forced.quantity,
            OrderType::Market,
            forced.origin,
            ts,
        );
        order.approve(forced.quantity, ts)?;
        let id = self.submit(order, ts)?;
        // Forced orders ignore volume, so a synthetic bar at the mark is enough
        let bar = Bar::flat(ts, forced.instrument, mid, Decimal::ZERO);
        self.execute(id, &bar)
    }

    // ========================================================================
    // Shared steps
    // ========================================================================

    fn next_id(&mut self) -> OrderId {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        id
    }

    fn submit(&mut self, order: Order, ts: Timestamp) -> Result<OrderId, SimError> {
        let id = self.execution.submit(order, ts)?;
        if let Some(order) = self.execution.order(id) {
            self.bus
                .publish(ts, EventPayload::OrderSubmitted(order.clone()))?;
        }
        Ok(id)
    }

    fn execute(&mut self, id: OrderId, bar: &Bar) -> Result<(), SimError> {
        if let Some(fill) = self.execution.try_fill(id, bar)? {
            self.ledger.apply_fill(&fill)?;
            self.bus.publish(fill.timestamp, EventPayload::Fill(fill))?;
        }
        Ok(())
    }

    fn raise(&mut self, alert: RiskAlert) -> Result<(), SimError> {
        self.bus
            .publish(alert.timestamp, EventPayload::RiskAlert(alert.clone()))?;
        self.alerts.push(alert);
        Ok(())
    }

    fn pod_failed(&mut self, err: PodExecutionError) -> Result<(), SimError> {
        let cancelled = self
            .execution
            .cancel_pod(&err.pod, "pod excluded", err.timestamp)?;
        if cancelled > 0 {
            debug!(pod = %err.pod, cancelled, "Cancelled excluded pod's working orders");
        }
        self.raise(RiskAlert {
            timestamp: err.timestamp,
            severity: Severity::Critical,
            pod: Some(err.pod.clone()),
            kind: AlertKind::PodExcluded,
            message: err.to_string(),
        })
    }

    fn record_violation(
        &mut self,
        ts: Timestamp,
        order: &Order,
        requested: Decimal,
        approved: Decimal,
        outcome: ViolationOutcome,
        violation: RiskViolation,
    ) {
        self.violations.push(ViolationRecord {
            timestamp: ts,
            order_id: order.id,
            pod: order.pod.clone(),
            instrument: order.instrument.clone(),
            requested,
            approved,
            outcome,
            violation,
        });
    }

    fn finish(self, sync: FeedSynchronizer, cancelled: bool) -> RunResult {
        let end = self.bus.now();
        let feed_policies = sync.policies().clone();
        let feed_records = sync.into_records();

        let activity: BTreeMap<PodId, _> = self.orchestrator.activity().into_iter().collect();
        let pods: Vec<PodReport> = self
            .orchestrator
            .specs()
            .map(|spec| PodReport {
                pod: spec.id.clone(),
                category: spec.category,
                allocated_capital: spec.capital,
                status: self
                    .risk
                    .status(&spec.id)
                    .cloned()
                    .unwrap_or(PodStatus::Active),
                excluded: self.orchestrator.is_excluded(&spec.id),
                activity: activity.get(&spec.id).cloned().unwrap_or_default(),
                exposure: self.risk.exposure(&self.ledger, Some(&spec.id)),
            })
            .collect();

        let status = if cancelled {
            RunStatus::Cancelled
        } else if pods.iter().all(PodReport::is_healthy) {
            RunStatus::Success
        } else {
            RunStatus::PartialSuccess
        };

        let execution = self.execution.stats();
        let stats = RunStats {
            ticks: self.ticks,
            events_dispatched: self.bus.dispatched(),
            orders_submitted: execution.orders_submitted,
            orders_filled: execution.orders_filled,
            orders_rejected: self.rejected,
            orders_scaled: self.scaled,
            orders_cancelled: execution.orders_cancelled,
            fills: execution.fills,
            partial_fills: execution.partial_fills,
            risk: self.risk.stats(),
        };

        let ledger = self.ledger.snapshot(end);
        let exposure = self.risk.exposure(&self.ledger, None);
        let pod_errors = self.orchestrator.errors().to_vec();
        let initial_capital = self.ledger.initial_capital();
        let orders = self.execution.into_orders();
        let (equity_curve, trade_log) = self.ledger.into_parts();

        info!(
            ?status,
            ticks = stats.ticks,
            fills = stats.fills,
            rejected = stats.orders_rejected,
            equity = %ledger.equity,
            "Simulation finished"
        );

        RunResult {
            status,
            cancel_reason: if cancelled { self.cancel.reason() } else { None },
            initial_capital,
            ledger,
            equity_curve,
            trade_log,
            orders,
            risk_alerts: self.alerts,
            risk_violations: self.violations,
            pod_errors,
            feed_records,
            feed_policies,
            pods,
            exposure,
            stats,
        }
    }
}

/// Build a simulator and replay `instruments` over `range`
pub fn run(
    config: SimConfig,
    registry: PodRegistry,
    feed: &mut dyn DataFeed,
    instruments: &[InstrumentId],
    range: DateRange,
) -> Result<RunResult, SimError> {
    Simulator::new(config, registry)?.run(feed, instruments, range)
}
