use crate::core::{InstrumentId, PodId};
use rust_decimal::Decimal;
use serde::Serialize;

/// One pod's holding in one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub pod: PodId,
    pub instrument: InstrumentId,
    /// Positive = long, negative = short
    pub quantity: Decimal,
    /// Average entry price of the open quantity
    pub avg_cost: Decimal,
    /// PnL locked in by reducing or closing trades (fees excluded)
    pub realized_pnl: Decimal,
    pub trade_count: u64,
}

impl Position {
    pub fn new(pod: PodId, instrument: InstrumentId) -> Self {
        Self {
            pod,
            instrument,
            quantity: Decimal::ZERO,
            avg_cost: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            trade_count: 0,
        }
    }

    /// Apply a signed execution and return the PnL it realized
    ///
    /// Adding to a position blends the average cost. Reducing keeps it.
    /// Crossing through zero realizes the closed part and opens the
    /// remainder at `price`.
    pub fn apply(&mut self, delta: Decimal, price: Decimal) -> Decimal {
        self.trade_count += 1;
        if delta.is_zero() {
            return Decimal::ZERO;
        }

        let same_direction = self.quantity.is_zero()
            || (self.quantity > Decimal::ZERO) == (delta > Decimal::ZERO);
        if same_direction {
            let held = self.quantity.abs();
            let added = delta.abs();
            self.avg_cost = (held * self.avg_cost + added * price) / (held + added);
            self.quantity += delta;
            return Decimal::ZERO;
        }

        let closed = delta.abs().min(self.quantity.abs());
        let direction = if self.quantity > Decimal::ZERO {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        };
        let realized = closed * (price - self.avg_cost) * direction;
        self.realized_pnl += realized;

        let before = self.quantity;
        self.quantity += delta;
        if self.quantity.is_zero() {
            self.avg_cost = Decimal::ZERO;
        } else if (before > Decimal::ZERO) != (self.quantity > Decimal::ZERO) {
            self.avg_cost = price;
        }
        realized
    }

    #[inline]
    pub fn market_value(&self, mark: Decimal) -> Decimal {
        self.quantity * mark
    }

    #[inline]
    pub fn notional(&self, mark: Decimal) -> Decimal {
        (self.quantity * mark).abs()
    }

    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        (mark - self.avg_cost) * self.quantity
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }
}
