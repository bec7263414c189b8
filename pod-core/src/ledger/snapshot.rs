//! Immutable ledger views and the tick-boundary snapshot handle
//!
//! The ledger has a single writer. Readers (reporting, monitoring threads)
//! never touch it directly: at each tick boundary the run driver publishes
//! a [`LedgerSnapshot`] through a [`SnapshotHandle`], and readers clone the
//! latest `Arc`.

use crate::core::{InstrumentId, PodId, Timestamp};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionSnapshot {
    pub pod: PodId,
    pub instrument: InstrumentId,
    pub quantity: Decimal,
    pub avg_cost: Decimal,
    pub mark_price: Decimal,
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodSnapshot {
    pub pod: PodId,
    pub allocated_capital: Decimal,
    pub cash: Decimal,
    pub equity: Decimal,
    pub gross_exposure: Decimal,
    pub net_exposure: Decimal,
    pub leverage: Decimal,
    pub open_positions: usize,
    pub realized_pnl: Decimal,
    pub transaction_costs: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub timestamp: Timestamp,
    /// Global cash: reserve plus every pod's cash
    pub cash: Decimal,
    pub reserve_cash: Decimal,
    pub equity: Decimal,
    pub gross_exposure: Decimal,
    pub leverage: Decimal,
    pub pods: Vec<PodSnapshot>,
    pub positions: Vec<PositionSnapshot>,
    pub marks: BTreeMap<InstrumentId, Decimal>,
}

impl LedgerSnapshot {
    pub fn pod(&self, pod: &PodId) -> Option<&PodSnapshot> {
        self.pods.iter().find(|p| &p.pod == pod)
    }

    pub fn position(&self, pod: &PodId, instrument: &InstrumentId) -> Option<&PositionSnapshot> {
        self.positions
            .iter()
            .find(|p| &p.pod == pod && &p.instrument == instrument)
    }

    /// Sum of every position's market value
    pub fn market_value(&self) -> Decimal {
        self.positions.iter().map(|p| p.market_value).sum()
    }
}

/// Shared handle to the latest tick-boundary snapshot
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<Option<Arc<LedgerSnapshot>>>>,
}

impl Default for SnapshotHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
        }
    }

    pub fn publish(&self, snapshot: LedgerSnapshot) {
        *self.inner.write() = Some(Arc::new(snapshot));
    }

    /// Latest published snapshot, `None` before the first tick completes
    pub fn latest(&self) -> Option<Arc<LedgerSnapshot>> {
        self.inner.read().clone()
    }
}
