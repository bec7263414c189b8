use crate::core::{InstrumentId, Order, PodExecutionError, PodId, StrategyCategory};
use crate::data::{FeedRecord, MissingBarPolicy};
use crate::execution::Fill;
use crate::ledger::{EquitySample, LedgerSnapshot};
use crate::metrics::PerformanceReport;
use crate::pod::PodActivity;
use crate::risk::{ExposureMetrics, PodStatus, RiskAlert, RiskStats, ViolationRecord};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Every tick processed, every pod still active
    Success,
    /// Every tick processed, but a pod was suspended or excluded
    PartialSuccess,
    /// Stopped between ticks by the cancellation token
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub ticks: u64,
    pub events_dispatched: u64,
    pub orders_submitted: u64,
    pub orders_filled: u64,
    pub orders_rejected: u64,
    pub orders_scaled: u64,
    pub orders_cancelled: u64,
    pub fills: u64,
    pub partial_fills: u64,
    pub risk: RiskStats,
}

/// End-of-run state of one pod
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodReport {
    pub pod: PodId,
    pub category: StrategyCategory,
    pub allocated_capital: Decimal,
    pub status: PodStatus,
    /// Excluded after a `PodExecutionError`
    pub excluded: bool,
    pub activity: PodActivity,
    pub exposure: ExposureMetrics,
}

impl PodReport {
    pub fn is_healthy(&self) -> bool {
        self.status.is_active() && !self.excluded
    }
}

/// Everything a run hands to the reporting collaborator
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub cancel_reason: Option<String>,
    pub initial_capital: Decimal,
    /// Final ledger state
    pub ledger: LedgerSnapshot,
    pub equity_curve: Vec<EquitySample>,
    /// Every fill, in execution order
    pub trade_log: Vec<Fill>,
    /// Every order created, in id order, each in a terminal state
    pub orders: Vec<Order>,
    pub risk_alerts: Vec<RiskAlert>,
    pub risk_violations: Vec<ViolationRecord>,
    pub pod_errors: Vec<PodExecutionError>,
    pub feed_records: Vec<FeedRecord>,
    /// Missing-bar policy applied per instrument
    pub feed_policies: BTreeMap<InstrumentId, MissingBarPolicy>,
    /// Registration order
    pub pods: Vec<PodReport>,
    pub exposure: ExposureMetrics,
    pub stats: RunStats,
}

impl RunResult {
    pub fn pod(&self, pod: &PodId) -> Option<&PodReport> {
        self.pods.iter().find(|p| &p.pod == pod)
    }

    pub fn final_equity(&self) -> Decimal {
        self.ledger.equity
    }

    pub fn performance(&self) -> PerformanceReport {
        let capital: Vec<(PodId, Decimal)> = self
            .pods
            .iter()
            .map(|p| (p.pod.clone(), p.allocated_capital))
            .collect();
        PerformanceReport::from_curve(&self.equity_curve, self.initial_capital, &capital)
    }

    /// Deterministic JSON of the equity curve and trade log
    ///
    /// Two replays of the same input produce the same string.
    pub fn replay_fingerprint(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&(&self.equity_curve, &self.trade_log))
    }
}
