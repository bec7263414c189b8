use crate::core::{FillId, InstrumentId, OrderId, OrderOrigin, PodId, Side, Timestamp};
use rust_decimal::Decimal;
use serde::Serialize;

/// Immutable record of one execution against an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fill {
    pub id: FillId,
    pub order_id: OrderId,
    pub pod: PodId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub origin: OrderOrigin,
    pub quantity: Decimal,
    /// Execution price after slippage
    pub price: Decimal,
    /// Reference (mid) price the slippage was applied to
    pub mid_price: Decimal,
    pub transaction_cost: Decimal,
    /// Total slippage paid: quantity * |price - mid_price|
    pub slippage: Decimal,
    pub timestamp: Timestamp,
}

impl Fill {
    /// Price * quantity
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    /// Position change (positive for buys, negative for sells)
    pub fn signed_quantity(&self) -> Decimal {
        self.side.sign() * self.quantity
    }

    /// Cash change including the transaction cost
    pub fn cash_delta(&self) -> Decimal {
        -(self.side.sign() * self.notional()) - self.transaction_cost
    }
}
