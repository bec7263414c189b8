//! Lookback momentum
//!
//! `r = close_t / close_{t-lookback} - 1`. Long when `r > threshold`,
//! short (or flat, the default) when `r < -threshold`.

use crate::sizing::TargetSizer;
use pod_core::core::ConfigError;
use pod_core::pod::{MarketView, OrderRequest, Pod, PodAllocation, TradeIntent};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MomentumParams {
    pub lookback: usize,
    pub threshold: Decimal,
    pub allow_short: bool,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            lookback: 20,
            threshold: dec!(0.05),
            allow_short: false,
        }
    }
}

impl MomentumParams {
    pub fn validate(&self, name: &str, history_window: usize) -> Result<(), ConfigError> {
        self.validate_lookback(name)?;
        let key = format!("strategies.{}.lookback", name);
        if self.lookback + 1 > history_window {
            return Err(ConfigError::invalid(
                key,
                format!("lookback {} exceeds history window {}", self.lookback, history_window),
            ));
        }
        Ok(())
    }

    pub fn validate_lookback(&self, name: &str) -> Result<(), ConfigError> {
        if self.lookback == 0 {
            return Err(ConfigError::invalid(
                format!("strategies.{}.lookback", name),
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

pub struct MomentumPod {
    params: MomentumParams,
    sizer: TargetSizer,
}

impl MomentumPod {
    pub fn new(params: MomentumParams, sizer: TargetSizer) -> Result<Self, ConfigError> {
        params.validate_lookback("momentum")?;
        Ok(Self { params, sizer })
    }
}

impl Pod for MomentumPod {
    fn generate_signal(&mut self, view: &MarketView<'_>) -> anyhow::Result<Vec<TradeIntent>> {
        if view.bar.forward_filled {
            return Ok(Vec::new());
        }
        let p = &self.params;
        let Some(closes) = view.trailing_closes(p.lookback + 1) else {
            return Ok(Vec::new());
        };
        let (Some(&first), Some(&last)) = (closes.first(), closes.last()) else {
            return Ok(Vec::new());
        };
        if first <= Decimal::ZERO {
            return Ok(Vec::new());
        }
        let ret = last / first - Decimal::ONE;

        let instrument = view.instrument().clone();
        let intent = if ret > p.threshold {
            TradeIntent::long(instrument, last)
        } else if ret < -p.threshold {
            if p.allow_short {
                TradeIntent::short(instrument, last)
            } else {
                TradeIntent::exit(instrument, last)
            }
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
        "momentum"
    }
}
