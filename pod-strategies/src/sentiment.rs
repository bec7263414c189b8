//! Sentiment threshold pod
//!
//! Each bar carrying a `sentiment_score` (in [-1, 1]) updates an
//! exponentially smoothed score per instrument:
//!
//! ```text
//! s_t = smoothing * score_t + (1 - smoothing) * s_{t-1}
//! ```
//!
//! At or beyond `+threshold` the pod goes long, at or beyond `-threshold`
//! short (flat when shorting is disabled); inside `±exit_band` it exits.
//! Between the band and the threshold it holds. Intent strength is the
//! magnitude of the smoothed score.

use crate::sizing::TargetSizer;
use pod_core::core::{ConfigError, InstrumentId};
use pod_core::pod::{MarketView, OrderRequest, Pod, PodAllocation, TradeIntent};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentimentParams {
    /// Weight of the newest score, in (0, 1]
    pub smoothing: Decimal,
    pub exit_band: Decimal,
    pub threshold: Decimal,
    pub allow_short: bool,
}

impl Default for SentimentParams {
    fn default() -> Self {
        Self {
            smoothing: dec!(0.5),
            exit_band: dec!(0.2),
            threshold: dec!(0.6),
            allow_short: true,
        }
    }
}

impl SentimentParams {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let key = |field: &str| format!("strategies.{}.{}", name, field);
        if self.smoothing <= Decimal::ZERO || self.smoothing > Decimal::ONE {
            return Err(ConfigError::invalid(key("smoothing"), "must be in (0, 1]"));
        }
        if self.threshold <= Decimal::ZERO || self.threshold > Decimal::ONE {
            return Err(ConfigError::invalid(key("signal_threshold"), "must be in (0, 1]"));
        }
        if self.exit_band < Decimal::ZERO || self.exit_band >= self.threshold {
            return Err(ConfigError::invalid(
                key("exit_band"),
                format!("must be in [0, {})", self.threshold),
            ));
        }
        Ok(())
    }
}

pub struct SentimentPod {
    params: SentimentParams,
    sizer: TargetSizer,
    smoothed: BTreeMap<InstrumentId, Decimal>,
}

impl SentimentPod {
    pub fn new(params: SentimentParams, sizer: TargetSizer) -> Self {
        Self {
            params,
            sizer,
            smoothed: BTreeMap::new(),
        }
    }

    pub fn smoothed(&self, instrument: &InstrumentId) -> Option<Decimal> {
        self.smoothed.get(instrument).copied()
    }
}

impl Pod for SentimentPod {
    fn generate_signal(&mut self, view: &MarketView<'_>) -> anyhow::Result<Vec<TradeIntent>> {
        if view.bar.forward_filled {
            return Ok(Vec::new());
        }
        let Some(score) = view.bar.sentiment_score else {
            return Ok(Vec::new());
        };
        let score = score.clamp(Decimal::NEGATIVE_ONE, Decimal::ONE);

        let p = self.params;
        let instrument = view.instrument().clone();
        let s = match self.smoothed.get(&instrument) {
            Some(prev) => p.smoothing * score + (Decimal::ONE - p.smoothing) * *prev,
            None => score,
        };
        self.smoothed.insert(instrument.clone(), s);

        let price = view.bar.close;
        let intent = if s >= p.threshold {
            TradeIntent::long(instrument, price).with_strength(s.abs())
        } else if s <= -p.threshold {
            if p.allow_short {
                TradeIntent::short(instrument, price).with_strength(s.abs())
            } else {
                TradeIntent::exit(instrument, price)
            }
        } else if s.abs() < p.exit_band {
            TradeIntent::exit(instrument, price)
        } else {
            return Ok(Vec::new());
        };
        Ok(vec![intent])
    }

    fn size_order(
        &mut self,
        intent: &TradeIntent,
        allocation: &PodAllocation,
    ) -> anyhow::Result<Option<OrderRequest>> {
        self.sizer.size(intent, allocation)
    }

    fn name(&self) -> &str {
        "sentiment"
    }

    fn reset(&mut self) {
        self.smoothed.clear();
    }
}
