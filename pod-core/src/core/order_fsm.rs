//! Order State Machine
//!
//! Every order walks the same lifecycle. Transitions are checked at runtime
//! and an illegal transition is reported as [`OrderStateError`], which the
//! run driver treats as fatal.
//!
//! # State Diagram
//!
//! ```text
//!        ┌─────────┐
//!        │   New   │──────────────────────┐
//!        └────┬────┘                      │
//!             ▼                           │
//!     ┌──────────────┐                    │
//!     │ RiskApproved │                    │
//!     └──────┬───────┘                    │
//!            ▼                            ▼
//!     ┌───────────┐               ┌────────────┐
//!     │ Submitted │──────────────▶│  Rejected  │
//!     └─────┬─────┘               └────────────┘
//!   ┌───────┼──────────────┐        (terminal)
//!   ▼       ▼              ▼
//! ┌──────┐ ┌───────────────┐ ┌───────────┐
//! │Filled│◀│PartiallyFilled│▶│ Cancelled │
//! └──────┘ └───────────────┘ └───────────┘
//! (terminal)  (loops on       (terminal)
//!              more fills)
//! ```
//!
//! A submitted order may also go straight to `Cancelled`.

use super::types::{InstrumentId, OrderId, OrderOrigin, OrderType, PodId, Side, Timestamp};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OrderStatus {
    New,
    RiskApproved,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// Whether the order is resting at the simulator and can still fill
    #[inline]
    pub fn is_working(self) -> bool {
        matches!(self, OrderStatus::Submitted | OrderStatus::PartiallyFilled)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (New, RiskApproved)
                | (New, Rejected)
                | (RiskApproved, Submitted)
                | (Submitted, PartiallyFilled)
                | (Submitted, Filled)
                | (Submitted, Cancelled)
                | (Submitted, Rejected)
                | (PartiallyFilled, PartiallyFilled)
                | (PartiallyFilled, Filled)
                | (PartiallyFilled, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Reasons a fill cannot be applied to an order
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FillError {
    #[error("fill quantity must be positive")]
    ZeroQuantity,

    #[error("fill price must be positive")]
    ZeroPrice,

    #[error("fill of {fill_qty} exceeds remaining {remaining_qty} (order quantity {total_qty})")]
    ExceedsRemaining {
        fill_qty: Decimal,
        remaining_qty: Decimal,
        total_qty: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderStateError {
    #[error("order {order}: illegal transition {from} -> {to}")]
    InvalidTransition {
        order: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("order {order} in state {status}: {source}")]
    InvalidFill {
        order: OrderId,
        status: OrderStatus,
        #[source]
        source: FillError,
    },
}

// ============================================================================
// Order
// ============================================================================

/// An order and its lifecycle state
///
/// Created by a pod's sizing stage (or by the risk manager for forced
/// liquidations); mutated only by the risk manager and the execution
/// simulator; retired once terminal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub pod: PodId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub order_type: OrderType,
    pub origin: OrderOrigin,
    /// Quantity the pod asked for
    pub requested_quantity: Decimal,
    /// Quantity approved by risk (may be scaled below the request)
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Decimal,
    pub status: OrderStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Why the order was rejected or cancelled
    pub reason: Option<String>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OrderId,
        pod: PodId,
        instrument: InstrumentId,
        side: Side,
        quantity: Decimal,
        order_type: OrderType,
        origin: OrderOrigin,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            pod,
            instrument,
            side,
            order_type,
            origin,
            requested_quantity: quantity,
            quantity,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            status: OrderStatus::New,
            created_at,
            updated_at: created_at,
            reason: None,
        }
    }

    #[inline]
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    #[inline]
    pub fn is_fully_filled(&self) -> bool {
        self.filled_quantity >= self.quantity
    }

    /// Signed quantity still to execute (+ buys, - sells)
    #[inline]
    pub fn signed_remaining(&self) -> Decimal {
        self.side.sign() * self.remaining_quantity()
    }

    fn transition(&mut self, next: OrderStatus, at: Timestamp) -> Result<(), OrderStateError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderStateError::InvalidTransition {
                order: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    /// New -> RiskApproved, possibly with a scaled-down quantity
    pub fn approve(&mut self, quantity: Decimal, at: Timestamp) -> Result<(), OrderStateError> {
        self.transition(OrderStatus::RiskApproved, at)?;
        self.quantity = quantity;
        Ok(())
    }

    /// New or Submitted -> Rejected
    pub fn reject(&mut self, reason: impl Into<String>, at: Timestamp) -> Result<(), OrderStateError> {
        self.transition(OrderStatus::Rejected, at)?;
        self.reason = Some(reason.into());
        Ok(())
    }

    /// RiskApproved -> Submitted
    pub fn submit(&mut self, at: Timestamp) -> Result<(), OrderStateError> {
        self.transition(OrderStatus::Submitted, at)
    }

    /// Submitted or PartiallyFilled -> Cancelled
    pub fn cancel(&mut self, reason: impl Into<String>, at: Timestamp) -> Result<(), OrderStateError> {
        self.transition(OrderStatus::Cancelled, at)?;
        self.reason = Some(reason.into());
        Ok(())
    }

    /// Shrink the unfilled part of a working order (risk rescaling)
    pub fn shrink_remaining(&mut self, new_remaining: Decimal, at: Timestamp) {
        if new_remaining < self.remaining_quantity() {
            self.quantity = self.filled_quantity + new_remaining.max(Decimal::ZERO);
            self.updated_at = at;
        }
    }

    /// Record an execution, moving to PartiallyFilled or Filled
    pub fn apply_fill(
        &mut self,
        qty: Decimal,
        price: Decimal,
        at: Timestamp,
    ) -> Result<(), OrderStateError> {
        let invalid = |source| OrderStateError::InvalidFill {
            order: self.id,
            status: self.status,
            source,
        };
        if qty <= Decimal::ZERO {
            return Err(invalid(FillError::ZeroQuantity));
        }
        if price <= Decimal::ZERO {
            return Err(invalid(FillError::ZeroPrice));
        }
        let remaining = self.remaining_quantity();
        if qty > remaining {
            return Err(invalid(FillError::ExceedsRemaining {
                fill_qty: qty,
                remaining_qty: remaining,
                total_qty: self.quantity,
            }));
        }

        let next = if qty == remaining {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.transition(next, at)?;

        // Volume-weighted average over all executions
        let filled_before = self.filled_quantity;
        self.filled_quantity += qty;
        self.avg_fill_price =
            (self.avg_fill_price * filled_before + price * qty) / self.filled_quantity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_order(qty: Decimal) -> Order {
        Order::new(
            OrderId(1),
            PodId::from("pod"),
            InstrumentId::from("AAPL"),
            Side::Buy,
            qty,
            OrderType::Market,
            OrderOrigin::Pod,
            0,
        )
    }

    fn submitted(qty: Decimal) -> Order {
        let mut order = new_order(qty);
        order.approve(qty, 0).unwrap();
        order.submit(0).unwrap();
        order
    }

    #[test]
    fn test_happy_path_full_fill() {
        let mut order = submitted(dec!(100));
        order.apply_fill(dec!(100), dec!(50.025), 1).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.avg_fill_price, dec!(50.025));
        assert!(order.is_fully_filled());
    }

    #[test]
    fn test_partial_fills_accumulate_vwap() {
        let mut order = submitted(dec!(100));
        order.apply_fill(dec!(40), dec!(10), 1).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        order.apply_fill(dec!(20), dec!(13), 2).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining_quantity(), dec!(40));
        // (40*10 + 20*13) / 60 = 11
        assert_eq!(order.avg_fill_price, dec!(11));
        order.apply_fill(dec!(40), dec!(11), 3).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn test_overfill_rejected() {
        let mut order = submitted(dec!(10));
        let err = order.apply_fill(dec!(11), dec!(1), 1).unwrap_err();
        assert!(matches!(
            err,
            OrderStateError::InvalidFill {
                source: FillError::ExceedsRemaining { .. },
                ..
            }
        ));
        assert_eq!(order.status, OrderStatus::Submitted);
    }

    #[test]
    fn test_zero_fill_rejected() {
        let mut order = submitted(dec!(10));
        assert!(order.apply_fill(Decimal::ZERO, dec!(1), 1).is_err());
        assert!(order.apply_fill(dec!(1), Decimal::ZERO, 1).is_err());
    }

    #[test]
    fn test_fill_requires_submission() {
        let mut order = new_order(dec!(10));
        let err = order.apply_fill(dec!(10), dec!(1), 1).unwrap_err();
        assert!(matches!(err, OrderStateError::InvalidTransition { .. }));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut order = new_order(dec!(10));
        order.reject("leverage", 0).unwrap();
        assert!(order.status.is_terminal());
        assert!(order.submit(1).is_err());
        assert!(order.cancel("late", 1).is_err());

        let mut order = submitted(dec!(10));
        order.apply_fill(dec!(4), dec!(1), 1).unwrap();
        order.cancel("end of run", 2).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.apply_fill(dec!(1), dec!(1), 3).is_err());
    }

    #[test]
    fn test_scaled_approval_and_shrink() {
        let mut order = new_order(dec!(100));
        order.approve(dec!(60), 0).unwrap();
        assert_eq!(order.requested_quantity, dec!(100));
        assert_eq!(order.quantity, dec!(60));
        order.submit(0).unwrap();
        order.apply_fill(dec!(10), dec!(1), 1).unwrap();
        order.shrink_remaining(dec!(20), 2);
        assert_eq!(order.remaining_quantity(), dec!(20));
        // Growing is never allowed
        order.shrink_remaining(dec!(500), 3);
        assert_eq!(order.remaining_quantity(), dec!(20));
    }
}
