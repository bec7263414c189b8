//! Portfolio Ledger
//!
//! Sole owner of cash and position state.
//!
//! ```text
//!                 ┌────────────────────────────────────────┐
//!  Fill ────────▶ │ apply_fill: pod cash, Position, sample │
//!                 ├────────────────────────────────────────┤
//!  marks ───────▶ │ mark_to_market: revalue, sample        │
//!                 ├────────────────────────────────────────┤
//!  queries ◀───── │ equity / exposure / leverage / snapshot│
//!                 └────────────────────────────────────────┘
//! ```
//!
//! Global cash is the unallocated reserve plus every pod's cash, and
//! `equity = cash + Σ quantity * mark` holds after every mutation.

pub mod position;
pub mod snapshot;

pub use position::Position;
pub use snapshot::{LedgerSnapshot, PodSnapshot, PositionSnapshot, SnapshotHandle};

use crate::core::{FillId, InstrumentId, LedgerInvariantViolation, PodId, Timestamp};
use crate::execution::Fill;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Slack allowed on the cash bound check
const CASH_BOUND_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

/// Gross exposure over equity; `Decimal::MAX` when exposed with no equity
pub fn leverage_ratio(gross: Decimal, equity: Decimal) -> Decimal {
    if gross.is_zero() {
        Decimal::ZERO
    } else if equity <= Decimal::ZERO {
        Decimal::MAX
    } else {
        gross / equity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SampleCause {
    Fill(FillId),
    MarkToMarket,
}

/// One point of the equity curve
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EquitySample {
    pub timestamp: Timestamp,
    pub cause: SampleCause,
    pub cash: Decimal,
    pub equity: Decimal,
    pub gross_exposure: Decimal,
    pub pod_equity: BTreeMap<PodId, Decimal>,
}

pub struct PortfolioLedger {
    initial_capital: Decimal,
    max_leverage: Decimal,
    reserve_cash: Decimal,
    pod_capital: BTreeMap<PodId, Decimal>,
    pod_cash: BTreeMap<PodId, Decimal>,
    pod_costs: BTreeMap<PodId, Decimal>,
    positions: BTreeMap<(PodId, InstrumentId), Position>,
    marks: BTreeMap<InstrumentId, Decimal>,
    trade_log: Vec<Fill>,
    equity_curve: Vec<EquitySample>,
    now: Timestamp,
}

impl PortfolioLedger {
    /// Create a ledger with `allocations` carved out of `initial_capital`
    ///
    /// Capital not allocated to any pod stays as reserve cash.
    pub fn new(
        initial_capital: Decimal,
        max_leverage: Decimal,
        allocations: &[(PodId, Decimal)],
    ) -> Self {
        let allocated: Decimal = allocations.iter().map(|(_, c)| *c).sum();
        let pod_capital: BTreeMap<PodId, Decimal> = allocations.iter().cloned().collect();
        info!(
            %initial_capital,
            %max_leverage,
            pods = pod_capital.len(),
            reserve = %(initial_capital - allocated),
            "Initialized PortfolioLedger"
        );
        Self {
            initial_capital,
            max_leverage,
            reserve_cash: initial_capital - allocated,
            pod_cash: pod_capital.clone(),
            pod_costs: pod_capital.keys().map(|p| (p.clone(), Decimal::ZERO)).collect(),
            pod_capital,
            positions: BTreeMap::new(),
            marks: BTreeMap::new(),
            trade_log: Vec::new(),
            equity_curve: Vec::new(),
            now: 0,
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Apply one fill: pod cash, position, trade log and an equity sample
    ///
    /// An exposure-increasing fill that leaves cash below
    /// `-(equity * (max_leverage - 1))` means a bad order got past risk
    /// checks and is reported as a fatal invariant violation.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<(), LedgerInvariantViolation> {
        self.now = self.now.max(fill.timestamp);
        if !self.pod_cash.contains_key(&fill.pod) {
            return Err(self.violation(format!("fill {} for unknown pod {}", fill.id, fill.pod)));
        }

        self.marks
            .entry(fill.instrument.clone())
            .or_insert(fill.mid_price);
        let gross_before = self.gross_exposure();

        let key = (fill.pod.clone(), fill.instrument.clone());
        let position = self
            .positions
            .entry(key)
            .or_insert_with(|| Position::new(fill.pod.clone(), fill.instrument.clone()));
        let realized = position.apply(fill.signed_quantity(), fill.price);

        if let Some(cash) = self.pod_cash.get_mut(&fill.pod) {
            *cash += fill.cash_delta();
        }
        if let Some(costs) = self.pod_costs.get_mut(&fill.pod) {
            *costs += fill.transaction_cost;
        }
        self.trade_log.push(fill.clone());

        debug!(
            fill = %fill.id,
            pod = %fill.pod,
            instrument = %fill.instrument,
            qty = %fill.signed_quantity(),
            price = %fill.price,
            %realized,
            "applied fill"
        );

        if self.gross_exposure() > gross_before {
            let cash = self.cash();
            let equity = self.equity();
            let floor = -(equity * (self.max_leverage - Decimal::ONE));
            if equity <= Decimal::ZERO || cash < floor - CASH_BOUND_TOLERANCE {
                return Err(self.violation(format!(
                    "cash {} below leverage bound {} after fill {} (equity {})",
                    cash, floor, fill.id, equity
                )));
            }
        }

        self.push_sample(fill.timestamp, SampleCause::Fill(fill.id));
        Ok(())
    }

    /// Update the mark for one instrument without sampling
    pub(crate) fn update_mark(&mut self, instrument: &InstrumentId, price: Decimal) {
        self.marks.insert(instrument.clone(), price);
    }

    /// Revalue open positions at `prices` and append a mark-to-market sample
    ///
    /// Repeating the call with the same prices and timestamp leaves the
    /// ledger unchanged: a mark sample for the same timestamp is replaced,
    /// not duplicated.
    pub fn mark_to_market(
        &mut self,
        prices: &BTreeMap<InstrumentId, Decimal>,
        timestamp: Timestamp,
    ) -> &EquitySample {
        for (instrument, price) in prices {
            self.marks.insert(instrument.clone(), *price);
        }
        self.now = self.now.max(timestamp);

        let replace = matches!(
            self.equity_curve.last(),
            Some(last) if last.timestamp == timestamp && last.cause == SampleCause::MarkToMarket
        );
        if replace {
            self.equity_curve.pop();
        }
        self.push_sample(timestamp, SampleCause::MarkToMarket)
    }

    fn push_sample(&mut self, timestamp: Timestamp, cause: SampleCause) -> &EquitySample {
        let sample = EquitySample {
            timestamp,
            cause,
            cash: self.cash(),
            equity: self.equity(),
            gross_exposure: self.gross_exposure(),
            pod_equity: self
                .pod_cash
                .keys()
                .map(|pod| (pod.clone(), self.pod_equity(pod)))
                .collect(),
        };
        self.equity_curve.push(sample);
        &self.equity_curve[self.equity_curve.len() - 1]
    }

    fn violation(&self, reason: String) -> LedgerInvariantViolation {
        error!(ts = self.now, %reason, "Ledger invariant violated");
        LedgerInvariantViolation {
            timestamp: self.now,
            reason,
            snapshot: Box::new(self.snapshot(self.now)),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    pub fn max_leverage(&self) -> Decimal {
        self.max_leverage
    }

    /// Global cash: reserve plus every pod's cash
    pub fn cash(&self) -> Decimal {
        self.reserve_cash + self.pod_cash.values().copied().sum::<Decimal>()
    }

    pub fn reserve_cash(&self) -> Decimal {
        self.reserve_cash
    }

    pub fn mark(&self, instrument: &InstrumentId) -> Option<Decimal> {
        self.marks.get(instrument).copied()
    }

    pub fn marks(&self) -> &BTreeMap<InstrumentId, Decimal> {
        &self.marks
    }

    fn mark_or_cost(&self, position: &Position) -> Decimal {
        self.mark(&position.instrument).unwrap_or(position.avg_cost)
    }

    pub fn equity(&self) -> Decimal {
        self.cash()
            + self
                .positions
                .values()
                .map(|p| p.market_value(self.mark_or_cost(p)))
                .sum::<Decimal>()
    }

    pub fn gross_exposure(&self) -> Decimal {
        self.positions
            .values()
            .map(|p| p.notional(self.mark_or_cost(p)))
            .sum()
    }

    pub fn leverage(&self) -> Decimal {
        leverage_ratio(self.gross_exposure(), self.equity())
    }

    pub fn pods(&self) -> impl Iterator<Item = &PodId> {
        self.pod_cash.keys()
    }

    pub fn has_pod(&self, pod: &PodId) -> bool {
        self.pod_cash.contains_key(pod)
    }

    pub fn pod_capital(&self, pod: &PodId) -> Decimal {
        self.pod_capital.get(pod).copied().unwrap_or_default()
    }

    pub fn pod_cash(&self, pod: &PodId) -> Decimal {
        self.pod_cash.get(pod).copied().unwrap_or_default()
    }

    pub fn pod_equity(&self, pod: &PodId) -> Decimal {
        self.pod_cash(pod)
            + self
                .positions_for(pod)
                .map(|p| p.market_value(self.mark_or_cost(p)))
                .sum::<Decimal>()
    }

    pub fn pod_gross_exposure(&self, pod: &PodId) -> Decimal {
        self.positions_for(pod)
            .map(|p| p.notional(self.mark_or_cost(p)))
            .sum()
    }

    pub fn pod_leverage(&self, pod: &PodId) -> Decimal {
        leverage_ratio(self.pod_gross_exposure(pod), self.pod_equity(pod))
    }

    pub fn position(&self, pod: &PodId, instrument: &InstrumentId) -> Option<&Position> {
        self.positions.get(&(pod.clone(), instrument.clone()))
    }

    /// Signed quantity held by `pod` in `instrument` (zero when absent)
    pub fn position_quantity(&self, pod: &PodId, instrument: &InstrumentId) -> Decimal {
        self.position(pod, instrument)
            .map_or(Decimal::ZERO, |p| p.quantity)
    }

    /// Every position record of `pod`, flat ones included
    pub fn positions_for<'a>(&'a self, pod: &'a PodId) -> impl Iterator<Item = &'a Position> + 'a {
        self.positions.values().filter(move |p| &p.pod == pod)
    }

    /// Non-flat positions of `pod`
    pub fn open_positions<'a>(&'a self, pod: &'a PodId) -> impl Iterator<Item = &'a Position> + 'a {
        self.positions_for(pod).filter(|p| !p.is_flat())
    }

    pub fn open_position_count(&self, pod: &PodId) -> usize {
        self.open_positions(pod).count()
    }

    /// Aggregate notional in `instrument` across all pods
    pub fn instrument_notional(&self, instrument: &InstrumentId) -> Decimal {
        let mark = self.mark(instrument);
        self.positions
            .values()
            .filter(|p| &p.instrument == instrument)
            .map(|p| p.notional(mark.unwrap_or(p.avg_cost)))
            .sum()
    }

    pub fn all_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn trade_log(&self) -> &[Fill] {
        &self.trade_log
    }

    pub fn equity_curve(&self) -> &[EquitySample] {
        &self.equity_curve
    }

    pub fn into_parts(self) -> (Vec<EquitySample>, Vec<Fill>) {
        (self.equity_curve, self.trade_log)
    }

    pub fn snapshot(&self, timestamp: Timestamp) -> LedgerSnapshot {
        let positions: Vec<PositionSnapshot> = self
            .positions
            .values()
            .map(|p| {
                let mark = self.mark_or_cost(p);
                PositionSnapshot {
                    pod: p.pod.clone(),
                    instrument: p.instrument.clone(),
                    quantity: p.quantity,
                    avg_cost: p.avg_cost,
                    mark_price: mark,
                    market_value: p.market_value(mark),
                    unrealized_pnl: p.unrealized_pnl(mark),
                    realized_pnl: p.realized_pnl,
                }
            })
            .collect();

        let pods = self
            .pod_cash
            .keys()
            .map(|pod| {
                let gross = self.pod_gross_exposure(pod);
                let equity = self.pod_equity(pod);
                PodSnapshot {
                    pod: pod.clone(),
                    allocated_capital: self.pod_capital(pod),
                    cash: self.pod_cash(pod),
                    equity,
                    gross_exposure: gross,
                    net_exposure: self
                        .positions_for(pod)
                        .map(|p| p.market_value(self.mark_or_cost(p)))
                        .sum(),
                    leverage: leverage_ratio(gross, equity),
                    open_positions: self.open_position_count(pod),
                    realized_pnl: self.positions_for(pod).map(|p| p.realized_pnl).sum(),
                    transaction_costs: self.pod_costs.get(pod).copied().unwrap_or_default(),
                }
            })
            .collect();

        LedgerSnapshot {
            timestamp,
            cash: self.cash(),
            reserve_cash: self.reserve_cash,
            equity: self.equity(),
            gross_exposure: self.gross_exposure(),
            leverage: self.leverage(),
            pods,
            positions,
            marks: self.marks.clone(),
        }
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Rebuild cash and positions from the trade log and compare
    ///
    /// Every position quantity must equal the running sum of its signed
    /// fills and every pod's cash its capital plus the fills' cash deltas.
    pub fn reconcile(&self) -> Result<(), LedgerInvariantViolation> {
        let mut quantities: BTreeMap<(PodId, InstrumentId), Decimal> = BTreeMap::new();
        let mut cash = self.pod_capital.clone();

        for fill in &self.trade_log {
            *quantities
                .entry((fill.pod.clone(), fill.instrument.clone()))
                .or_default() += fill.signed_quantity();
            *cash.entry(fill.pod.clone()).or_default() += fill.cash_delta();
        }

        for (key, position) in &self.positions {
            let expected = quantities.get(key).copied().unwrap_or_default();
            if position.quantity != expected {
                return Err(self.violation(format!(
                    "position {}/{} is {} but fills sum to {}",
                    key.0, key.1, position.quantity, expected
                )));
            }
        }
        if let Some(((pod, instrument), qty)) = quantities
            .iter()
            .find(|(key, qty)| !qty.is_zero() && !self.positions.contains_key(*key))
        {
            return Err(self.violation(format!(
                "fills for {}/{} sum to {} but no position exists",
                pod, instrument, qty
            )));
        }
        for (pod, expected) in &cash {
            let actual = self.pod_cash(pod);
            if actual != *expected {
                return Err(self.violation(format!(
                    "pod {} cash is {} but fills imply {}",
                    pod, actual, expected
                )));
            }
        }
        let capital: Decimal = self.pod_capital.values().copied().sum();
        if self.reserve_cash != self.initial_capital - capital {
            return Err(self.violation(format!(
                "reserve cash {} does not match unallocated capital {}",
                self.reserve_cash,
                self.initial_capital - capital
            )));
        }
        Ok(())
    }
}
