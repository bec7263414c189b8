use crate::core::{InstrumentId, OrderId, PodId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Per-pod risk constraints
///
/// Immutable for the run. The circuit breaker swaps a pod's record for
/// [`RiskLimit::halted`] rather than editing it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskLimit {
    pub max_leverage: Decimal,
    pub max_positions: usize,
    /// Largest allowed notional for a single position
    pub max_position_notional: Option<Decimal>,
    /// Drawdown from peak equity (fraction) that trips the breaker
    pub max_drawdown: Decimal,
    pub trading_halted: bool,
}

impl RiskLimit {
    pub fn new(max_leverage: Decimal, max_positions: usize, max_drawdown: Decimal) -> Self {
        Self {
            max_leverage,
            max_positions,
            max_position_notional: None,
            max_drawdown,
            trading_halted: false,
        }
    }

    pub fn with_max_position_notional(mut self, notional: Decimal) -> Self {
        self.max_position_notional = Some(notional);
        self
    }

    /// Replacement record after the circuit breaker trips
    pub fn halted(&self) -> Self {
        Self {
            max_leverage: Decimal::ZERO,
            max_positions: 0,
            max_position_notional: Some(Decimal::ZERO),
            max_drawdown: self.max_drawdown,
            trading_halted: true,
        }
    }
}

/// Portfolio-wide constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalLimits {
    pub max_leverage: Decimal,
    pub max_drawdown: Decimal,
    /// Max aggregate notional of one instrument as a fraction of equity
    pub max_concentration: Option<Decimal>,
}

/// What to do with an order that fails a pre-trade check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskPolicy {
    Reject,
    /// Shrink to the largest quantity that passes every check
    #[default]
    Scale,
}

/// Pre-trade check that failed
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum RiskViolation {
    #[error("pod {pod} is suspended")]
    PodSuspended { pod: PodId },

    #[error("pod {pod} needs {required} of buying power, has {available}")]
    InsufficientCapital {
        pod: PodId,
        required: Decimal,
        available: Decimal,
    },

    #[error("pod {pod} already holds {open} positions (max {max})")]
    MaxPositions { pod: PodId, open: usize, max: usize },

    #[error("pod {pod} leverage would reach {projected} (max {max})")]
    PodLeverage {
        pod: PodId,
        projected: Decimal,
        max: Decimal,
    },

    #[error("global leverage would reach {projected} (max {max})")]
    GlobalLeverage { projected: Decimal, max: Decimal },

    #[error("pod {pod} position in {instrument} would reach {projected} notional (max {max})")]
    PositionNotional {
        pod: PodId,
        instrument: InstrumentId,
        projected: Decimal,
        max: Decimal,
    },

    #[error("aggregate {instrument} notional would reach {projected} (max {max})")]
    Concentration {
        instrument: InstrumentId,
        projected: Decimal,
        max: Decimal,
    },
}

/// Outcome of a pre-trade check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskDecision {
    Approve { quantity: Decimal },
    Scale {
        quantity: Decimal,
        violation: RiskViolation,
    },
    Reject(RiskViolation),
}

impl RiskDecision {
    /// Quantity allowed through, zero when rejected
    pub fn approved_quantity(&self) -> Decimal {
        match self {
            RiskDecision::Approve { quantity } | RiskDecision::Scale { quantity, .. } => *quantity,
            RiskDecision::Reject(_) => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationOutcome {
    Rejected,
    Scaled,
    /// Resting remainder cancelled on re-check
    Cancelled,
}

/// A recorded risk intervention on one order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationRecord {
    pub timestamp: Timestamp,
    pub order_id: OrderId,
    pub pod: PodId,
    pub instrument: InstrumentId,
    pub requested: Decimal,
    pub approved: Decimal,
    pub outcome: ViolationOutcome,
    pub violation: RiskViolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AlertKind {
    OrderScaled,
    OrderRejected,
    /// A pod's drawdown crossed its threshold
    CircuitBreaker { drawdown: Decimal, threshold: Decimal },
    /// Portfolio drawdown crossed the global threshold
    GlobalCircuitBreaker { drawdown: Decimal, threshold: Decimal },
    /// Marking pushed leverage over its limit
    Deleverage { leverage: Decimal, limit: Decimal },
    PodExcluded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAlert {
    pub timestamp: Timestamp,
    pub severity: Severity,
    pub pod: Option<PodId>,
    pub kind: AlertKind,
    pub message: String,
}

impl fmt::Display for RiskAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] t={} {}", self.severity, self.timestamp, self.message)
    }
}

/// Whether a pod may still trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PodStatus {
    Active,
    Suspended { at: Timestamp, reason: String },
}

impl PodStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, PodStatus::Active)
    }
}

/// Exposure breakdown for a pod or the whole portfolio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ExposureMetrics {
    pub gross_exposure: Decimal,
    pub net_exposure: Decimal,
    pub long_exposure: Decimal,
    pub short_exposure: Decimal,
    pub leverage: Decimal,
    /// Largest single position notional as a fraction of equity
    pub largest_position_weight: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_halted_limit_replaces_record() {
        let limit = RiskLimit::new(dec!(2), 5, dec!(0.2)).with_max_position_notional(dec!(1000));
        let halted = limit.halted();
        assert!(halted.trading_halted);
        assert_eq!(halted.max_positions, 0);
        assert_eq!(halted.max_drawdown, dec!(0.2));
        // Original record untouched
        assert!(!limit.trading_halted);
        assert_eq!(limit.max_position_notional, Some(dec!(1000)));
    }

    #[test]
    fn test_decision_quantity() {
        let violation = RiskViolation::GlobalLeverage {
            projected: dec!(2.3),
            max: dec!(2),
        };
        assert_eq!(RiskDecision::Reject(violation.clone()).approved_quantity(), dec!(0));
        assert_eq!(
            RiskDecision::Scale {
                quantity: dec!(7),
                violation
            }
            .approved_quantity(),
            dec!(7)
        );
    }

    #[test]
    fn test_violation_display() {
        let v = RiskViolation::MaxPositions {
            pod: PodId::from("ma"),
            open: 5,
            max: 5,
        };
        assert_eq!(v.to_string(), "pod ma already holds 5 positions (max 5)");
        assert!(Severity::Critical > Severity::Warning);
    }

    #[test]
    fn test_default_policy_is_scale() {
        assert_eq!(RiskPolicy::default(), RiskPolicy::Scale);
    }
}
