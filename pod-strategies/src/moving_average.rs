//! Moving-average crossover
//!
//! Long while the fast simple moving average sits above the slow one by
//! more than `threshold` (relative gap), short (or flat when shorting is
//! disabled) while it sits below by more than `threshold`. Needs
//! `slow_window + 1` closes before it signals.

use crate::sizing::TargetSizer;
use pod_core::core::ConfigError;
use pod_core::pod::{MarketView, OrderRequest, Pod, PodAllocation, TradeIntent};
use rust_decimal::Decimal;

pub const DEFAULT_FAST_WINDOW: usize = 10;
pub const DEFAULT_SLOW_WINDOW: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovingAverageParams {
    pub fast_window: usize,
    pub slow_window: usize,
    /// Minimum relative gap between the averages
    pub threshold: Decimal,
    pub allow_short: bool,
}

impl Default for MovingAverageParams {
    fn default() -> Self {
        Self {
            fast_window: DEFAULT_FAST_WINDOW,
            slow_window: DEFAULT_SLOW_WINDOW,
            threshold: Decimal::ZERO,
            allow_short: true,
        }
    }
}

impl MovingAverageParams {
    /// Check window ordering against the history the pod will see
    pub fn validate(&self, name: &str, history_window: usize) -> Result<(), ConfigError> {
        self.validate_windows(name)?;
        if self.slow_window + 1 > history_window {
            return Err(ConfigError::invalid(
                format!("strategies.{}.slow_window", name),
                format!(
                    "slow_window {} needs {} bars of history, only {} kept",
                    self.slow_window,
                    self.slow_window + 1,
                    history_window
                ),
            ));
        }
        Ok(())
    }

    /// `0 < fast_window < slow_window`
    pub fn validate_windows(&self, name: &str) -> Result<(), ConfigError> {
        let key = |field: &str| format!("strategies.{}.{}", name, field);
        if self.fast_window == 0 {
            return Err(ConfigError::invalid(key("fast_window"), "must be at least 1"));
        }
        if self.fast_window >= self.slow_window {
            return Err(ConfigError::invalid(
                key("fast_window"),
                format!(
                    "fast_window {} must be below slow_window {}",
                    self.fast_window, self.slow_window
                ),
            ));
        }
        Ok(())
    }
}

pub struct MovingAverageCrossover {
    params: MovingAverageParams,
    sizer: TargetSizer,
}

impl MovingAverageCrossover {
    pub fn new(params: MovingAverageParams, sizer: TargetSizer) -> Result<Self, ConfigError> {
        params.validate_windows("moving_average")?;
        Ok(Self { params, sizer })
    }

    pub fn params(&self) -> &MovingAverageParams {
        &self.params
    }
}

fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().sum::<Decimal>() / Decimal::from(values.len() as u64)
}

impl Pod for MovingAverageCrossover {
    fn generate_signal(&mut self, view: &MarketView<'_>) -> anyhow::Result<Vec<TradeIntent>> {
        if view.bar.forward_filled {
            return Ok(Vec::new());
        }
        let p = &self.params;
        let Some(closes) = view.trailing_closes(p.slow_window + 1) else {
            return Ok(Vec::new());
        };

        let slow = mean(&closes[closes.len() - p.slow_window..]);
        let fast = mean(&closes[closes.len() - p.fast_window..]);
        if slow <= Decimal::ZERO {
            return Ok(Vec::new());
        }
        let gap = (fast - slow) / slow;

        let instrument = view.instrument().clone();
        let price = view.bar.close;
        let intent = if gap > p.threshold {
            TradeIntent::long(instrument, price)
        } else if gap < -p.threshold {
            if p.allow_short {
                TradeIntent::short(instrument, price)
            } else {
                TradeIntent::exit(instrument, price)
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
        "moving_average"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pod_core::data::Bar;
    use pod_core::pod::{Direction, MarketHistory};
    use pod_core::InstrumentId;
    use rust_decimal_macros::dec;

    fn pod(allow_short: bool) -> MovingAverageCrossover {
        MovingAverageCrossover::new(
            MovingAverageParams {
                fast_window: 2,
                slow_window: 4,
                threshold: Decimal::ZERO,
                allow_short,
            },
            TargetSizer::new(dec!(0.1)),
        )
        .unwrap()
    }

    /// Feed `closes` and return the direction signalled on the last bar
    fn last_signal(pod: &mut MovingAverageCrossover, closes: &[Decimal]) -> Option<Direction> {
        let mut history = MarketHistory::new(16);
        let mut last = None;
        for (i, close) in closes.iter().enumerate() {
            let bar = Bar::flat(i as u64 + 1, InstrumentId::from("AAPL"), *close, dec!(1000));
            history.record(&bar);
            let view = MarketView::new(&bar, &history);
            last = pod.generate_signal(&view).unwrap().first().map(|i| i.direction);
        }
        last
    }

    #[test]
    fn test_needs_slow_window_plus_one() {
        let mut p = pod(true);
        assert_eq!(last_signal(&mut p, &[dec!(1), dec!(2), dec!(3), dec!(4)]), None);
        assert_eq!(
            last_signal(&mut p, &[dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)]),
            Some(Direction::Long)
        );
    }

    #[test]
    fn test_downtrend() {
        let falling = [dec!(9), dec!(8), dec!(7), dec!(6), dec!(5)];
        assert_eq!(last_signal(&mut pod(true), &falling), Some(Direction::Short));
        assert_eq!(last_signal(&mut pod(false), &falling), Some(Direction::Exit));
    }

    #[test]
    fn test_flat_prices_hold() {
        let flat = [dec!(5); 6];
        assert_eq!(last_signal(&mut pod(true), &flat), None);
    }

    #[test]
    fn test_forward_filled_bar_is_ignored() {
        let mut p = pod(true);
        let mut history = MarketHistory::new(16);
        for ts in 1..=5u64 {
            history.record(&Bar::flat(ts, InstrumentId::from("AAPL"), Decimal::from(ts), dec!(1)));
        }
        let filled = Bar::flat(5, InstrumentId::from("AAPL"), dec!(5), dec!(1)).carried_to(6);
        history.record(&filled);
        let view = MarketView::new(&filled, &history);
        assert!(p.generate_signal(&view).unwrap().is_empty());
    }

    #[test]
    fn test_validate_windows() {
        let ok = MovingAverageParams::default();
        assert!(ok.validate("ma", 31).is_ok());
        assert!(ok.validate("ma", 30).is_err());

        let inverted = MovingAverageParams {
            fast_window: 30,
            slow_window: 10,
            ..ok
        };
        assert!(matches!(
            inverted.validate("ma", 256),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_new_rejects_inverted_windows() {
        let sizer = TargetSizer::new(dec!(0.1));
        for (fast_window, slow_window) in [(4, 2), (3, 3), (0, 5)] {
            let params = MovingAverageParams {
                fast_window,
                slow_window,
                ..MovingAverageParams::default()
            };
            assert!(MovingAverageCrossover::new(params, sizer).is_err());
        }
    }

    #[test]
    fn test_short_history_window_never_signals() {
        // Valid windows, but only 3 closes kept: the pod waits instead of slicing
        let mut p = pod(true);
        let mut history = MarketHistory::new(3);
        for ts in 1..=8u64 {
            let bar = Bar::flat(ts, InstrumentId::from("AAPL"), Decimal::from(ts), dec!(1));
            history.record(&bar);
            assert!(p.generate_signal(&MarketView::new(&bar, &history)).unwrap().is_empty());
        }
    }
}
