//! Execution Simulator
//!
//! Holds working orders and turns them into fills against bar liquidity.
//!
//! - Liquidity per bar is `volume * max_participation_rate`, shared by all
//!   orders on that instrument in order-id order
//! - Orders larger than the available liquidity fill partially and keep
//!   working on later bars
//! - Forced (risk-originated) orders ignore the participation cap and fill
//!   completely at the last known price
//! - `cancel_all` at the end of a run marks every remainder `Cancelled`

use super::cost::CostModel;
use super::types::Fill;
use crate::core::{
    round_to_lot, FillId, InstrumentId, Order, OrderId, OrderStateError, OrderStatus, PodId,
    Timestamp,
};
use crate::data::Bar;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Fill model parameters
#[derive(Debug, Clone, Copy)]
pub struct ExecutionConfig {
    pub cost: CostModel,
    /// Fraction of a bar's volume one instrument's orders may consume
    pub max_participation_rate: Decimal,
    /// Fill quantities are whole multiples of this
    pub lot_size: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            cost: CostModel::new(Decimal::new(5, 4), Decimal::new(1, 3)),
            max_participation_rate: Decimal::new(1, 1),
            lot_size: Decimal::ONE,
        }
    }
}

impl ExecutionConfig {
    /// Unlimited liquidity and no costs, for unit tests
    pub fn instant() -> Self {
        Self {
            cost: CostModel::frictionless(),
            max_participation_rate: Decimal::ONE,
            lot_size: Decimal::ONE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub orders_submitted: u64,
    pub orders_filled: u64,
    pub orders_cancelled: u64,
    pub fills: u64,
    pub partial_fills: u64,
}

pub struct ExecutionSimulator {
    config: ExecutionConfig,
    working: BTreeMap<OrderId, Order>,
    retired: Vec<Order>,
    /// Quantity already taken from each instrument's current bar
    consumed: BTreeMap<InstrumentId, (Timestamp, Decimal)>,
    next_fill_id: u64,
    stats: ExecutionStats,
}

impl ExecutionSimulator {
    pub fn new(config: ExecutionConfig) -> Self {
        info!(
            slippage = %config.cost.slippage_rate,
            transaction_cost = %config.cost.transaction_cost_rate,
            participation = %config.max_participation_rate,
            lot = %config.lot_size,
            "Initialized ExecutionSimulator"
        );
        Self {
            config,
            working: BTreeMap::new(),
            retired: Vec::new(),
            consumed: BTreeMap::new(),
            next_fill_id: 1,
            stats: ExecutionStats::default(),
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.config.cost
    }

    /// Accept a risk-approved order
    pub fn submit(&mut self, mut order: Order, at: Timestamp) -> Result<OrderId, OrderStateError> {
        order.submit(at)?;
        let id = order.id;
        debug!(order = %id, pod = %order.pod, side = %order.side, qty = %order.quantity, "submitted");
        self.working.insert(id, order);
        self.stats.orders_submitted += 1;
        Ok(id)
    }

    /// Store an order that never reached the simulator (risk rejection)
    pub fn retire_rejected(&mut self, order: Order) {
        debug_assert_eq!(order.status, OrderStatus::Rejected);
        self.retired.push(order);
    }

    /// Try to execute one working order against `bar`
    ///
    /// Returns `None` when the order does not trade on this bar: no
    /// liquidity left, a limit not reached, or a different instrument.
    pub fn try_fill(&mut self, id: OrderId, bar: &Bar) -> Result<Option<Fill>, OrderStateError> {
        let Some(order) = self.working.get(&id) else {
            return Ok(None);
        };
        if order.instrument != bar.instrument {
            return Ok(None);
        }

        let forced = order.origin.is_forced();
        let remaining = order.remaining_quantity();
        let quantity = if forced {
            remaining
        } else {
            let taken = match self.consumed.get(&bar.instrument) {
                Some((ts, qty)) if *ts == bar.timestamp => *qty,
                _ => Decimal::ZERO,
            };
            let available = (bar.volume * self.config.max_participation_rate - taken).max(Decimal::ZERO);
            round_to_lot(remaining.min(available), self.config.lot_size)
        };
        if quantity <= Decimal::ZERO {
            return Ok(None);
        }

        let estimate = self.config.cost.estimate(order.side, quantity, bar.mid_price());
        if !order.order_type.accepts(order.side, estimate.price) {
            return Ok(None);
        }

        let Some(order) = self.working.get_mut(&id) else {
            return Ok(None);
        };
        order.apply_fill(quantity, estimate.price, bar.timestamp)?;

        let fill = Fill {
            id: FillId(self.next_fill_id),
            order_id: id,
            pod: order.pod.clone(),
            instrument: order.instrument.clone(),
            side: order.side,
            origin: order.origin,
            quantity,
            price: estimate.price,
            mid_price: bar.mid_price(),
            transaction_cost: estimate.transaction_cost,
            slippage: estimate.slippage,
            timestamp: bar.timestamp,
        };
        self.next_fill_id += 1;
        self.stats.fills += 1;

        if !forced {
            let entry = self
                .consumed
                .entry(bar.instrument.clone())
                .or_insert((bar.timestamp, Decimal::ZERO));
            if entry.0 != bar.timestamp {
                *entry = (bar.timestamp, Decimal::ZERO);
            }
            entry.1 += quantity;
        }

        if order.status == OrderStatus::Filled {
            self.stats.orders_filled += 1;
            if let Some(done) = self.working.remove(&id) {
                self.retired.push(done);
            }
        } else {
            self.stats.partial_fills += 1;
        }

        debug!(fill = %fill.id, order = %id, qty = %quantity, price = %fill.price, "fill");
        Ok(Some(fill))
    }

    /// Reduce a working order's unfilled quantity
    pub fn shrink(&mut self, id: OrderId, remaining: Decimal, at: Timestamp) {
        if let Some(order) = self.working.get_mut(&id) {
            order.shrink_remaining(remaining, at);
        }
    }

    pub fn cancel(&mut self, id: OrderId, reason: &str, at: Timestamp) -> Result<bool, OrderStateError> {
        let Some(mut order) = self.working.remove(&id) else {
            return Ok(false);
        };
        order.cancel(reason, at)?;
        self.stats.orders_cancelled += 1;
        debug!(order = %id, reason, "cancelled");
        self.retired.push(order);
        Ok(true)
    }

    /// Cancel every working order of `pod`
    pub fn cancel_pod(&mut self, pod: &PodId, reason: &str, at: Timestamp) -> Result<usize, OrderStateError> {
        let ids: Vec<OrderId> = self
            .working
            .values()
            .filter(|o| &o.pod == pod)
            .map(|o| o.id)
            .collect();
        for id in &ids {
            self.cancel(*id, reason, at)?;
        }
        Ok(ids.len())
    }

    /// Cancel everything still working (end of run)
    pub fn cancel_all(&mut self, reason: &str, at: Timestamp) -> Result<usize, OrderStateError> {
        let ids: Vec<OrderId> = self.working.keys().copied().collect();
        for id in &ids {
            self.cancel(*id, reason, at)?;
        }
        if !ids.is_empty() {
            info!(count = ids.len(), reason, "Cancelled working orders");
        }
        Ok(ids.len())
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.working.get(&id)
    }

    /// Working order ids for an instrument, oldest first
    pub fn working_ids_for(&self, instrument: &InstrumentId) -> Vec<OrderId> {
        self.working
            .values()
            .filter(|o| &o.instrument == instrument)
            .map(|o| o.id)
            .collect()
    }

    /// Instruments `pod` has working orders in
    pub fn working_instruments(&self, pod: &PodId) -> BTreeSet<InstrumentId> {
        self.working
            .values()
            .filter(|o| &o.pod == pod)
            .map(|o| o.instrument.clone())
            .collect()
    }

    pub fn working_count(&self) -> usize {
        self.working.len()
    }

    pub fn stats(&self) -> ExecutionStats {
        self.stats
    }

    /// Every order seen, ordered by id
    pub fn into_orders(self) -> Vec<Order> {
        let mut orders = self.retired;
        orders.extend(self.working.into_values());
        orders.sort_by_key(|o| o.id);
        orders
    }
}
