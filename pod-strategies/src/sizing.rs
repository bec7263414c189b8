//! Target-position sizing shared by every pod
//!
//! An intent is turned into the order that moves the pod's position in
//! the instrument to a target:
//!
//! ```text
//! target_notional = min(equity * position_size * strength, equity * max_leverage)
//! target_qty      = round_to_lot(target_notional / reference_price) * direction
//! order           = target_qty - current_qty
//! ```
//!
//! A position already on the intended side is left alone; the sizer only
//! opens, flips or closes.

use anyhow::bail;
use pod_core::core::{round_to_lot, Side};
use pod_core::pod::{Direction, OrderRequest, PodAllocation, TradeIntent};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSizer {
    /// Target notional as a fraction of pod equity
    pub position_size: Decimal,
}

impl TargetSizer {
    pub fn new(position_size: Decimal) -> Self {
        Self { position_size }
    }

    /// Signed target quantity for `intent`
    pub fn target(&self, intent: &TradeIntent, allocation: &PodAllocation) -> anyhow::Result<Decimal> {
        if intent.reference_price <= Decimal::ZERO {
            bail!(
                "non-positive reference price {} for {}",
                intent.reference_price,
                intent.instrument
            );
        }
        let sign = match intent.direction {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
            Direction::Exit => return Ok(Decimal::ZERO),
        };

        let equity = allocation.equity.max(Decimal::ZERO);
        let notional = (equity * self.position_size * intent.strength)
            .min(equity * allocation.max_leverage);
        let quantity = round_to_lot(notional / intent.reference_price, allocation.lot_size);
        Ok(quantity * sign)
    }

    pub fn size(
        &self,
        intent: &TradeIntent,
        allocation: &PodAllocation,
    ) -> anyhow::Result<Option<OrderRequest>> {
        let current = allocation.position(&intent.instrument);
        let already_there = match intent.direction {
            Direction::Long => current > Decimal::ZERO,
            Direction::Short => current < Decimal::ZERO,
            Direction::Exit => current.is_zero(),
        };
        if already_there {
            return Ok(None);
        }

        let delta = self.target(intent, allocation)? - current;
        Ok(Side::for_delta(delta)
            .map(|side| OrderRequest::market(intent.instrument.clone(), side, delta.abs())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pod_core::core::{InstrumentId, PodId};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn allocation(equity: Decimal, position: Decimal) -> PodAllocation {
        let mut positions = BTreeMap::new();
        if !position.is_zero() {
            positions.insert(InstrumentId::from("AAPL"), position);
        }
        PodAllocation {
            pod: PodId::from("alpha"),
            allocated_capital: equity,
            cash: equity,
            equity,
            buying_power: equity * dec!(2),
            max_leverage: dec!(2),
            positions,
            lot_size: dec!(1),
        }
    }

    fn aapl() -> InstrumentId {
        InstrumentId::from("AAPL")
    }

    #[test]
    fn test_opens_long_rounded_to_lot() {
        let sizer = TargetSizer::new(dec!(0.1));
        let intent = TradeIntent::long(aapl(), dec!(30));
        let order = sizer.size(&intent, &allocation(dec!(100_000), Decimal::ZERO)).unwrap();
        // 10_000 / 30 = 333.33
        assert_eq!(order, Some(OrderRequest::market(aapl(), Side::Buy, dec!(333))));
    }

    #[test]
    fn test_flip_short_to_long() {
        let sizer = TargetSizer::new(dec!(0.1));
        let intent = TradeIntent::long(aapl(), dec!(100));
        let order = sizer.size(&intent, &allocation(dec!(100_000), dec!(-40))).unwrap();
        assert_eq!(order, Some(OrderRequest::market(aapl(), Side::Buy, dec!(140))));
    }

    #[test]
    fn test_holds_when_already_positioned() {
        let sizer = TargetSizer::new(dec!(0.1));
        let intent = TradeIntent::long(aapl(), dec!(100));
        assert_eq!(sizer.size(&intent, &allocation(dec!(100_000), dec!(5))).unwrap(), None);
        let exit = TradeIntent::exit(aapl(), dec!(100));
        assert_eq!(sizer.size(&exit, &allocation(dec!(100_000), Decimal::ZERO)).unwrap(), None);
    }

    #[test]
    fn test_exit_closes_position() {
        let sizer = TargetSizer::new(dec!(0.1));
        let exit = TradeIntent::exit(aapl(), dec!(100));
        let order = sizer.size(&exit, &allocation(dec!(100_000), dec!(-25))).unwrap();
        assert_eq!(order, Some(OrderRequest::market(aapl(), Side::Buy, dec!(25))));
    }

    #[test]
    fn test_strength_and_leverage_bound() {
        let sizer = TargetSizer::new(dec!(5));
        let intent = TradeIntent::short(aapl(), dec!(10)).with_strength(dec!(0.5));
        // 2.5x equity requested, capped at 2x
        let target = sizer.target(&intent, &allocation(dec!(1000), Decimal::ZERO)).unwrap();
        assert_eq!(target, dec!(-200));
    }

    #[test]
    fn test_bad_reference_price_is_error() {
        let sizer = TargetSizer::new(dec!(0.1));
        let intent = TradeIntent::long(aapl(), Decimal::ZERO);
        assert!(sizer.size(&intent, &allocation(dec!(1000), Decimal::ZERO)).is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: targets are whole lots within the leverage cap
            #[test]
            fn prop_target_within_leverage(
                equity in 1_000i64..10_000_000,
                size_bps in 1i64..50_000,
                strength_pct in 0i64..=100,
                price_cents in 1i64..1_000_000,
                long in any::<bool>(),
            ) {
                let equity = Decimal::from(equity);
                let price = Decimal::new(price_cents, 2);
                let sizer = TargetSizer::new(Decimal::new(size_bps, 4));
                let intent = if long {
                    TradeIntent::long(aapl(), price)
                } else {
                    TradeIntent::short(aapl(), price)
                }
                .with_strength(Decimal::new(strength_pct, 2));

                let alloc = allocation(equity, Decimal::ZERO);
                let target = sizer
                    .target(&intent, &alloc)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(target.fract(), Decimal::ZERO);
                prop_assert!(target.abs() * price <= equity * alloc.max_leverage);
                prop_assert!(
                    if long { target >= Decimal::ZERO } else { target <= Decimal::ZERO },
                    "target sign does not match intent direction"
                );
            }
        }
    }
}
