//! Pre-Trade Validation
//!
//! Every pod order passes through here before it reaches the execution
//! simulator.
//!
//! ## Checks Performed
//!
//! 1. **Capital** - Can the pod's buying power pay for the exposure added?
//! 2. **Position Count** - Would a new instrument exceed `max_positions`?
//! 3. **Leverage** - Pod and global leverage after the hypothetical fill
//! 4. **Concentration** - Per-position notional and aggregate instrument
//!    notional against global equity
//!
//! Each check yields the largest quantity that still passes. Under
//! [`RiskPolicy::Reject`] the first failing check rejects the order. Under
//! [`RiskPolicy::Scale`] the order shrinks to the smallest of those caps,
//! rounded down to the lot size.
//!
//! ## Notation
//!
//! ```text
//! x  = current signed position      q = order quantity
//! r  = part of q that reduces |x|   e = q - r (part that adds exposure)
//! P  = mid price                    k = equity lost per unit (slippage + fee)
//! ```
//!
//! The reducing part `r` never fails a check.

use super::types::{GlobalLimits, RiskDecision, RiskLimit, RiskPolicy, RiskViolation};
use crate::core::{round_to_lot, InstrumentId, PodId, Side};
use crate::execution::CostModel;
use crate::ledger::PortfolioLedger;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tracing::debug;

/// The order under validation
#[derive(Debug, Clone, Copy)]
pub struct OrderCheck<'a> {
    pub pod: &'a PodId,
    pub instrument: &'a InstrumentId,
    pub side: Side,
    pub quantity: Decimal,
    pub mid: Decimal,
    /// Instruments the pod already has working orders in
    pub working_instruments: &'a BTreeSet<InstrumentId>,
}

/// A failed check and the largest quantity it would allow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breach {
    pub max_quantity: Decimal,
    pub violation: RiskViolation,
}

/// Split of an order into its reducing and exposure-adding parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Split {
    position: Decimal,
    reducing: Decimal,
    adding: Decimal,
}

/// Pre-trade validator bound to one ledger state
pub struct PreTradeValidator<'a> {
    ledger: &'a PortfolioLedger,
    limit: &'a RiskLimit,
    global: &'a GlobalLimits,
    cost: &'a CostModel,
    lot_size: Decimal,
}

impl<'a> PreTradeValidator<'a> {
    pub fn new(
        ledger: &'a PortfolioLedger,
        limit: &'a RiskLimit,
        global: &'a GlobalLimits,
        cost: &'a CostModel,
        lot_size: Decimal,
    ) -> Self {
        Self {
            ledger,
            limit,
            global,
            cost,
            lot_size,
        }
    }

    /// Validate an order and apply `policy` to any breaches
    pub fn validate(&self, order: &OrderCheck<'_>, policy: RiskPolicy) -> RiskDecision {
        if self.limit.trading_halted {
            return RiskDecision::Reject(RiskViolation::PodSuspended {
                pod: order.pod.clone(),
            });
        }

        let breaches = self.breaches(order);
        if breaches.is_empty() {
            return RiskDecision::Approve {
                quantity: order.quantity,
            };
        }

        match policy {
            RiskPolicy::Reject => {
                let first = breaches.into_iter().next();
                match first {
                    Some(b) => RiskDecision::Reject(b.violation),
                    None => RiskDecision::Approve {
                        quantity: order.quantity,
                    },
                }
            }
            RiskPolicy::Scale => {
                // Tightest cap wins, earliest check on ties
                let mut binding: Option<Breach> = None;
                for breach in breaches {
                    let tighter = binding
                        .as_ref()
                        .map_or(true, |b| breach.max_quantity < b.max_quantity);
                    if tighter {
                        binding = Some(breach);
                    }
                }
                let Some(binding) = binding else {
                    return RiskDecision::Approve {
                        quantity: order.quantity,
                    };
                };

                let quantity = round_to_lot(
                    binding.max_quantity.min(order.quantity).max(Decimal::ZERO),
                    self.lot_size,
                );
                debug!(
                    pod = %order.pod,
                    instrument = %order.instrument,
                    requested = %order.quantity,
                    allowed = %quantity,
                    violation = %binding.violation,
                    "Pre-trade check: scaling order"
                );
                if quantity <= Decimal::ZERO {
                    RiskDecision::Reject(binding.violation)
                } else {
                    RiskDecision::Scale {
                        quantity,
                        violation: binding.violation,
                    }
                }
            }
        }
    }

    /// Every failing check, in check order
    pub fn breaches(&self, order: &OrderCheck<'_>) -> Vec<Breach> {
        let split = self.split(order);
        [
            self.check_capital(order, split),
            self.check_position_count(order, split),
            self.check_pod_leverage(order, split),
            self.check_global_leverage(order, split),
            self.check_position_notional(order, split),
            self.check_concentration(order, split),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn split(&self, order: &OrderCheck<'_>) -> Split {
        let position = self.ledger.position_quantity(order.pod, order.instrument);
        let reducing = if order.side.sign() * position < Decimal::ZERO {
            order.quantity.min(position.abs())
        } else {
            Decimal::ZERO
        };
        Split {
            position,
            reducing,
            adding: order.quantity - reducing,
        }
    }

    fn drag(&self, order: &OrderCheck<'_>) -> Decimal {
        self.cost.equity_drag_per_unit(order.mid, order.side)
    }

    /// (a) capital sufficiency against pod buying power
    fn check_capital(&self, order: &OrderCheck<'_>, split: Split) -> Option<Breach> {
        if split.adding <= Decimal::ZERO {
            return None;
        }
        let price = self.cost.fill_price(order.mid, order.side);
        let unit_cost = price + self.cost.transaction_cost(price);
        let required = split.adding * unit_cost;

        let equity = self.ledger.pod_equity(order.pod);
        if equity <= Decimal::ZERO {
            return Some(Breach {
                max_quantity: split.reducing,
                violation: RiskViolation::InsufficientCapital {
                    pod: order.pod.clone(),
                    required,
                    available: Decimal::ZERO,
                },
            });
        }

        let buying_power = equity * self.limit.max_leverage
            - self.ledger.pod_gross_exposure(order.pod)
            + split.reducing * order.mid;
        if required <= buying_power {
            return None;
        }
        let affordable = if unit_cost > Decimal::ZERO {
            (buying_power / unit_cost).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        Some(Breach {
            max_quantity: split.reducing + affordable,
            violation: RiskViolation::InsufficientCapital {
                pod: order.pod.clone(),
                required,
                available: buying_power.max(Decimal::ZERO),
            },
        })
    }

    /// (b) opening a new instrument must stay within `max_positions`
    fn check_position_count(&self, order: &OrderCheck<'_>, split: Split) -> Option<Breach> {
        let opening =
            split.position.is_zero() && !order.working_instruments.contains(order.instrument);
        if !opening {
            return None;
        }
        let pending = order
            .working_instruments
            .iter()
            .filter(|i| self.ledger.position_quantity(order.pod, i).is_zero())
            .count();
        let open = self.ledger.open_position_count(order.pod) + pending;
        if open < self.limit.max_positions {
            return None;
        }
        Some(Breach {
            max_quantity: Decimal::ZERO,
            violation: RiskViolation::MaxPositions {
                pod: order.pod.clone(),
                open,
                max: self.limit.max_positions,
            },
        })
    }

    /// (c) pod leverage after the hypothetical fill
    fn check_pod_leverage(&self, order: &OrderCheck<'_>, split: Split) -> Option<Breach> {
        let (projected, max_quantity) = self.leverage_cap(
            order,
            split,
            self.ledger.pod_gross_exposure(order.pod),
            self.ledger.pod_equity(order.pod),
            self.limit.max_leverage,
        )?;
        Some(Breach {
            max_quantity,
            violation: RiskViolation::PodLeverage {
                pod: order.pod.clone(),
                projected,
                max: self.limit.max_leverage,
            },
        })
    }

    /// (c) global leverage after the hypothetical fill
    fn check_global_leverage(&self, order: &OrderCheck<'_>, split: Split) -> Option<Breach> {
        let (projected, max_quantity) = self.leverage_cap(
            order,
            split,
            self.ledger.gross_exposure(),
            self.ledger.equity(),
            self.global.max_leverage,
        )?;
        Some(Breach {
            max_quantity,
            violation: RiskViolation::GlobalLeverage {
                projected,
                max: self.global.max_leverage,
            },
        })
    }

    /// Projected leverage and quantity cap when `limit` would be exceeded
    ///
    /// ```text
    /// E_r = E - r*k          G_r = G - r*P
    /// projected = (G_r + e*P) / (E_r - e*k)
    /// cap       = r + (limit*E_r - G_r) / (P + limit*k)
    /// ```
    fn leverage_cap(
        &self,
        order: &OrderCheck<'_>,
        split: Split,
        gross: Decimal,
        equity: Decimal,
        limit: Decimal,
    ) -> Option<(Decimal, Decimal)> {
        if split.adding <= Decimal::ZERO {
            return None;
        }
        let k = self.drag(order);
        let equity_r = equity - split.reducing * k;
        let gross_r = (gross - split.reducing * order.mid).max(Decimal::ZERO);
        let equity_after = equity_r - split.adding * k;
        let projected = if equity_after <= Decimal::ZERO {
            Decimal::MAX
        } else {
            (gross_r + split.adding * order.mid) / equity_after
        };
        if projected <= limit {
            return None;
        }
        let denominator = order.mid + limit * k;
        let headroom = if denominator > Decimal::ZERO {
            ((limit * equity_r - gross_r) / denominator).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        Some((projected, split.reducing + headroom))
    }

    /// (d) the pod's position notional against `max_position_notional`
    fn check_position_notional(&self, order: &OrderCheck<'_>, split: Split) -> Option<Breach> {
        let max = self.limit.max_position_notional?;
        if split.adding <= Decimal::ZERO || order.mid <= Decimal::ZERO {
            return None;
        }
        let base = split.position.abs() - split.reducing;
        let projected = (base + split.adding) * order.mid;
        if projected <= max {
            return None;
        }
        Some(Breach {
            max_quantity: split.reducing + (max / order.mid - base).max(Decimal::ZERO),
            violation: RiskViolation::PositionNotional {
                pod: order.pod.clone(),
                instrument: order.instrument.clone(),
                projected,
                max,
            },
        })
    }

    /// (d) aggregate instrument notional against global equity
    fn check_concentration(&self, order: &OrderCheck<'_>, split: Split) -> Option<Breach> {
        let fraction = self.global.max_concentration?;
        if split.adding <= Decimal::ZERO {
            return None;
        }
        let k = self.drag(order);
        let equity_r = self.ledger.equity() - split.reducing * k;
        let aggregate_r = (self.ledger.instrument_notional(order.instrument)
            - split.reducing * order.mid)
            .max(Decimal::ZERO);

        let projected = aggregate_r + split.adding * order.mid;
        let max = fraction * (equity_r - split.adding * k);
        if projected <= max {
            return None;
        }
        let denominator = order.mid + fraction * k;
        let headroom = if denominator > Decimal::ZERO {
            ((fraction * equity_r - aggregate_r) / denominator).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        Some(Breach {
            max_quantity: split.reducing + headroom,
            violation: RiskViolation::Concentration {
                instrument: order.instrument.clone(),
                projected,
                max: max.max(Decimal::ZERO),
            },
        })
    }
}
