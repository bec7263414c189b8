//! Per-series bar validation
//!
//! One validator per instrument stream. Checks price sanity and that
//! timestamps strictly increase within the series.

use super::types::Bar;
use crate::core::{DataFeedError, Timestamp};
use rust_decimal::Decimal;

#[derive(Debug, Default, Clone)]
pub struct BarValidator {
    last_timestamp: Option<Timestamp>,
}

impl BarValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `bar` and remember its timestamp on success
    pub fn check(&mut self, bar: &Bar) -> Result<(), DataFeedError> {
        if let Some(previous) = self.last_timestamp {
            if bar.timestamp <= previous {
                return Err(DataFeedError::OutOfOrder {
                    instrument: bar.instrument.clone(),
                    previous,
                    next: bar.timestamp,
                });
            }
        }
        if let Some(reason) = malformed_reason(bar) {
            return Err(DataFeedError::Malformed {
                instrument: bar.instrument.clone(),
                timestamp: bar.timestamp,
                reason,
            });
        }
        self.last_timestamp = Some(bar.timestamp);
        Ok(())
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.last_timestamp
    }
}

fn malformed_reason(bar: &Bar) -> Option<String> {
    let prices = [
        ("open", bar.open),
        ("high", bar.high),
        ("low", bar.low),
        ("close", bar.close),
    ];
    for (name, value) in prices {
        if value <= Decimal::ZERO {
            return Some(format!("{} price {} is not positive", name, value));
        }
    }
    if bar.high < bar.low {
        return Some(format!("high {} below low {}", bar.high, bar.low));
    }
    if bar.volume < Decimal::ZERO {
        return Some(format!("negative volume {}", bar.volume));
    }
    None
}
