//! Drawdown Circuit Breaker
//!
//! Tracks peak equity and trips once equity falls too far below it.
//!
//! ## State Machine
//!
//! ```text
//!          NORMAL ──── equity >= peak ───▶ NORMAL (peak raised)
//!            │
//!            │ (peak - equity) / peak > threshold
//!            ▼
//!         TRIPPED   (terminal for the run: the pod is liquidated
//!                    and suspended, no automatic reset)
//! ```
//!
//! Drawdown is evaluated once per tick on marked equity, after every fill
//! of the tick has been applied.

use crate::core::Timestamp;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BreakerState {
    Normal,
    Tripped { at: Timestamp, drawdown: Decimal },
}

#[derive(Debug, Clone)]
pub struct DrawdownBreaker {
    threshold: Decimal,
    peak: Decimal,
    state: BreakerState,
}

impl DrawdownBreaker {
    pub fn new(threshold: Decimal, starting_equity: Decimal) -> Self {
        Self {
            threshold,
            peak: starting_equity.max(Decimal::ZERO),
            state: BreakerState::Normal,
        }
    }

    /// Feed the latest equity; returns the drawdown if this call trips the breaker
    pub fn update(&mut self, equity: Decimal, at: Timestamp) -> Option<Decimal> {
        if self.is_tripped() {
            return None;
        }
        if equity > self.peak {
            self.peak = equity;
        }
        let drawdown = self.drawdown(equity);
        if drawdown > self.threshold {
            self.state = BreakerState::Tripped { at, drawdown };
            return Some(drawdown);
        }
        None
    }

    /// Fractional decline of `equity` from the running peak
    pub fn drawdown(&self, equity: Decimal) -> Decimal {
        if self.peak <= Decimal::ZERO || equity >= self.peak {
            Decimal::ZERO
        } else {
            (self.peak - equity) / self.peak
        }
    }

    pub fn is_tripped(&self) -> bool {
        matches!(self.state, BreakerState::Tripped { .. })
    }

    /// Force the breaker into the tripped state (portfolio-wide stop)
    pub fn trip(&mut self, at: Timestamp, drawdown: Decimal) {
        if !self.is_tripped() {
            self.state = BreakerState::Tripped { at, drawdown };
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn peak(&self) -> Decimal {
        self.peak
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }
}
