//! Deterministic execution cost model
//!
//! ```text
//! fill_price       = mid * (1 + side_sign * slippage_rate)
//! notional         = quantity * fill_price
//! transaction_cost = notional * transaction_cost_rate
//! ```

use crate::core::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostModel {
    pub slippage_rate: Decimal,
    pub transaction_cost_rate: Decimal,
}

/// Cost breakdown of a hypothetical or actual execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillEstimate {
    pub price: Decimal,
    pub notional: Decimal,
    pub transaction_cost: Decimal,
    pub slippage: Decimal,
}

impl FillEstimate {
    /// Cash change for the given side
    pub fn cash_delta(&self, side: Side) -> Decimal {
        -(side.sign() * self.notional) - self.transaction_cost
    }
}

impl CostModel {
    pub fn new(slippage_rate: Decimal, transaction_cost_rate: Decimal) -> Self {
        Self {
            slippage_rate,
            transaction_cost_rate,
        }
    }

    /// No slippage, no fees
    pub fn frictionless() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }

    #[inline]
    pub fn fill_price(&self, mid: Decimal, side: Side) -> Decimal {
        mid * (Decimal::ONE + side.sign() * self.slippage_rate)
    }

    #[inline]
    pub fn transaction_cost(&self, notional: Decimal) -> Decimal {
        notional * self.transaction_cost_rate
    }

    pub fn estimate(&self, side: Side, quantity: Decimal, mid: Decimal) -> FillEstimate {
        let price = self.fill_price(mid, side);
        let notional = quantity * price;
        FillEstimate {
            price,
            notional,
            transaction_cost: self.transaction_cost(notional),
            slippage: quantity * (price - mid).abs(),
        }
    }

    /// Equity lost per unit traded at `mid`: slippage plus fee
    ///
    /// Positions are marked at mid, so buying or selling one unit costs
    /// `|fill - mid| + fill * fee_rate` of equity immediately.
    pub fn equity_drag_per_unit(&self, mid: Decimal, side: Side) -> Decimal {
        let price = self.fill_price(mid, side);
        (price - mid).abs() + price * self.transaction_cost_rate
    }
}
