//! Error taxonomy
//!
//! Fatal errors abort the run and surface as [`SimError`]:
//! - [`ConfigError`]: invalid or missing configuration, raised before the first tick
//! - [`DataFeedError`]: missing, malformed or stale source data
//! - [`LedgerInvariantViolation`]: accounting inconsistency (a defect, never a data problem)
//!
//! Recoverable errors are accumulated into the run result instead:
//! - [`PodExecutionError`]: a pod's signal or sizing stage failed; the pod is excluded
//! - [`RiskViolation`](crate::risk::RiskViolation): an order failed a pre-trade check

use super::order_fsm::OrderStateError;
use super::types::{InstrumentId, PodId, Timestamp};
use crate::events::ClockError;
use crate::ledger::LedgerSnapshot;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Invalid or missing configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("missing required key `{0}`")]
    MissingKey(String),

    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("unknown strategy type `{strategy_type}` for strategy `{name}`")]
    UnknownStrategyType { name: String, strategy_type: String },

    #[error("pod `{0}` registered twice")]
    DuplicatePod(PodId),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Missing, malformed or stale source data
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum DataFeedError {
    #[error("no feed produced a bar within {window}s of t={last} (next bar at t={next:?})")]
    Stale {
        last: Timestamp,
        next: Option<Timestamp>,
        window: u64,
    },

    #[error("malformed bar for {instrument} at t={timestamp}: {reason}")]
    Malformed {
        instrument: InstrumentId,
        timestamp: Timestamp,
        reason: String,
    },

    #[error("out-of-order bar for {instrument}: t={next} does not follow t={previous}")]
    OutOfOrder {
        instrument: InstrumentId,
        previous: Timestamp,
        next: Timestamp,
    },

    #[error("feed for {instrument} failed: {reason}")]
    Source {
        instrument: InstrumentId,
        reason: String,
    },

    #[error("no data for any requested instrument")]
    NoData,
}

impl DataFeedError {
    /// Instrument the error is confined to, if any
    pub fn instrument(&self) -> Option<&InstrumentId> {
        match self {
            DataFeedError::Malformed { instrument, .. }
            | DataFeedError::OutOfOrder { instrument, .. }
            | DataFeedError::Source { instrument, .. } => Some(instrument),
            DataFeedError::Stale { .. } | DataFeedError::NoData => None,
        }
    }
}

/// Pod pipeline stage that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PodStage {
    Signal,
    Sizing,
}

impl fmt::Display for PodStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodStage::Signal => write!(f, "signal"),
            PodStage::Sizing => write!(f, "sizing"),
        }
    }
}

/// A pod's signal or sizing stage returned an error or panicked
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("pod `{pod}` failed in {stage} stage at t={timestamp}: {message}")]
pub struct PodExecutionError {
    pub pod: PodId,
    pub stage: PodStage,
    pub timestamp: Timestamp,
    pub message: String,
}

/// Cash/position accounting inconsistency
///
/// Carries the full ledger state at the moment of failure.
#[derive(Debug, Clone, Error)]
#[error("ledger invariant violated at t={timestamp}: {reason}")]
pub struct LedgerInvariantViolation {
    pub timestamp: Timestamp,
    pub reason: String,
    pub snapshot: Box<LedgerSnapshot>,
}

/// Fatal run error
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    DataFeed(#[from] DataFeedError),

    #[error(transparent)]
    LedgerInvariant(#[from] LedgerInvariantViolation),

    #[error("event clock: {0}")]
    Clock(#[from] ClockError),

    #[error("order lifecycle: {0}")]
    OrderState(#[from] OrderStateError),
}

impl SimError {
    /// Process exit status for the CLI collaborator
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::Config(_) => 2,
            SimError::DataFeed(_) => 3,
            SimError::LedgerInvariant(_) => 4,
            SimError::Clock(_) | SimError::OrderState(_) => 5,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SimError::Config(_) => "ConfigError",
            SimError::DataFeed(_) => "DataFeedError",
            SimError::LedgerInvariant(_) => "LedgerInvariantViolation",
            SimError::Clock(_) => "ClockError",
            SimError::OrderState(_) => "OrderStateError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_nonzero_and_distinct() {
        let config: SimError = ConfigError::MissingKey("global".into()).into();
        let feed: SimError = DataFeedError::NoData.into();
        assert_eq!(config.exit_code(), 2);
        assert_eq!(feed.exit_code(), 3);
        assert_eq!(config.kind(), "ConfigError");
    }

    #[test]
    fn test_feed_error_instrument_scope() {
        let err = DataFeedError::Malformed {
            instrument: InstrumentId::from("AAPL"),
            timestamp: 5,
            reason: "close <= 0".into(),
        };
        assert_eq!(err.instrument().map(|i| i.as_str()), Some("AAPL"));
        assert!(DataFeedError::NoData.instrument().is_none());
        assert!(err.to_string().contains("AAPL"));
    }

    #[test]
    fn test_pod_error_display() {
        let err = PodExecutionError {
            pod: PodId::from("momentum"),
            stage: PodStage::Sizing,
            timestamp: 100,
            message: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "pod `momentum` failed in sizing stage at t=100: boom"
        );
    }
}
