use crate::core::{InstrumentId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: Timestamp,
    pub instrument: InstrumentId,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    #[serde(default)]
    pub sentiment_score: Option<Decimal>,
    /// Synthetic bar repeating the last known close at a missing timestamp
    #[serde(default)]
    pub forward_filled: bool,
}

impl Bar {
    pub fn new(
        timestamp: Timestamp,
        instrument: InstrumentId,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            instrument,
            open,
            high,
            low,
            close,
            volume,
            sentiment_score: None,
            forward_filled: false,
        }
    }

    /// Flat bar where open = high = low = close
    pub fn flat(timestamp: Timestamp, instrument: InstrumentId, price: Decimal, volume: Decimal) -> Self {
        Self::new(timestamp, instrument, price, price, price, price, volume)
    }

    pub fn with_sentiment(mut self, score: Decimal) -> Self {
        self.sentiment_score = Some(score);
        self
    }

    /// Reference price for execution and marking
    #[inline]
    pub fn mid_price(&self) -> Decimal {
        self.close
    }

    /// Copy of this bar carried forward to `timestamp` with no liquidity
    pub fn carried_to(&self, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            instrument: self.instrument.clone(),
            open: self.close,
            high: self.close,
            low: self.close,
            close: self.close,
            volume: Decimal::ZERO,
            sentiment_score: self.sentiment_score,
            forward_filled: true,
        }
    }
}
