//! Pods: isolated strategy units
//!
//! A pod is two stages behind one narrow interface:
//!
//! ```text
//!   MarketView ──▶ generate_signal ──▶ [TradeIntent]
//!                                           │
//!   PodAllocation ─────────────────▶ size_order ──▶ OrderRequest
//! ```
//!
//! The signal stage sees market history and pod-local state only. The
//! sizing stage additionally sees the pod's own slice of the ledger. Pods
//! never touch the ledger, the risk manager or each other.

pub mod history;
pub mod orchestrator;
pub mod registry;

pub use history::{MarketHistory, MarketView};
pub use orchestrator::{PodActivity, PodOrchestrator, SignalRound};
pub use registry::{PodRegistry, PodSpec};

use crate::core::{InstrumentId, OrderType, PodId, Side};
use crate::ledger::PortfolioLedger;
use crate::risk::RiskLimit;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Desired position change produced by a signal stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Long,
    Short,
    /// Close whatever is held
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeIntent {
    pub instrument: InstrumentId,
    pub direction: Direction,
    /// Conviction in [0, 1]; sizing scales the target position by it
    pub strength: Decimal,
    /// Price the signal was computed against
    pub reference_price: Decimal,
}

impl TradeIntent {
    pub fn new(instrument: InstrumentId, direction: Direction, reference_price: Decimal) -> Self {
        Self {
            instrument,
            direction,
            strength: Decimal::ONE,
            reference_price,
        }
    }

    pub fn long(instrument: InstrumentId, reference_price: Decimal) -> Self {
        Self::new(instrument, Direction::Long, reference_price)
    }

    pub fn short(instrument: InstrumentId, reference_price: Decimal) -> Self {
        Self::new(instrument, Direction::Short, reference_price)
    }

    pub fn exit(instrument: InstrumentId, reference_price: Decimal) -> Self {
        Self::new(instrument, Direction::Exit, reference_price)
    }

    pub fn with_strength(mut self, strength: Decimal) -> Self {
        self.strength = strength.clamp(Decimal::ZERO, Decimal::ONE);
        self
    }
}

/// Sized order produced by a pod's execution stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRequest {
    pub instrument: InstrumentId,
    pub side: Side,
    pub quantity: Decimal,
    pub order_type: OrderType,
}

impl OrderRequest {
    pub fn market(instrument: InstrumentId, side: Side, quantity: Decimal) -> Self {
        Self {
            instrument,
            side,
            quantity,
            order_type: OrderType::Market,
        }
    }

    pub fn limit(instrument: InstrumentId, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            instrument,
            side,
            quantity,
            order_type: OrderType::Limit { price },
        }
    }
}

/// The pod's own slice of the ledger, as seen by its sizing stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodAllocation {
    pub pod: PodId,
    pub allocated_capital: Decimal,
    pub cash: Decimal,
    pub equity: Decimal,
    /// `equity * max_leverage - gross_exposure`, floored at zero
    pub buying_power: Decimal,
    pub max_leverage: Decimal,
    /// Signed quantity per instrument, open positions only
    pub positions: BTreeMap<InstrumentId, Decimal>,
    pub lot_size: Decimal,
}

impl PodAllocation {
    pub fn from_ledger(
        ledger: &PortfolioLedger,
        pod: &PodId,
        limit: &RiskLimit,
        lot_size: Decimal,
    ) -> Self {
        let equity = ledger.pod_equity(pod);
        let buying_power =
            (equity * limit.max_leverage - ledger.pod_gross_exposure(pod)).max(Decimal::ZERO);
        Self {
            pod: pod.clone(),
            allocated_capital: ledger.pod_capital(pod),
            cash: ledger.pod_cash(pod),
            equity,
            buying_power,
            max_leverage: limit.max_leverage,
            positions: ledger
                .open_positions(pod)
                .map(|p| (p.instrument.clone(), p.quantity))
                .collect(),
            lot_size,
        }
    }

    /// Signed quantity held in `instrument`
    pub fn position(&self, instrument: &InstrumentId) -> Decimal {
        self.positions.get(instrument).copied().unwrap_or_default()
    }
}

/// Pluggable strategy logic
///
/// Both stages return `anyhow::Result`; an `Err` or a panic from either
/// excludes the pod for the rest of the run without touching other pods.
pub trait Pod: Send {
    /// Trade intents for the bar in `view`
    fn generate_signal(&mut self, view: &MarketView<'_>) -> anyhow::Result<Vec<TradeIntent>>;

    /// Turn one intent into an order, or `None` when nothing needs trading
    fn size_order(
        &mut self,
        intent: &TradeIntent,
        allocation: &PodAllocation,
    ) -> anyhow::Result<Option<OrderRequest>>;

    /// Strategy type name for logging
    fn name(&self) -> &str;

    /// Clear pod-local state before a run
    fn reset(&mut self) {}
}
