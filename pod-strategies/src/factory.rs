//! Build a [`PodRegistry`] from configuration
//!
//! Strategy names become pod ids; registration follows name order so
//! dispatch order is stable across runs.

use crate::momentum::{MomentumParams, MomentumPod};
use crate::moving_average::{MovingAverageCrossover, MovingAverageParams};
use crate::sentiment::{SentimentParams, SentimentPod};
use crate::sizing::TargetSizer;
use pod_core::config::{SimConfig, StrategyConfig};
use pod_core::core::ConfigError;
use pod_core::pod::{Pod, PodRegistry, PodSpec};
use tracing::info;

pub const MOVING_AVERAGE: &str = "moving_average";
pub const SENTIMENT: &str = "sentiment";
pub const MOMENTUM: &str = "momentum";

/// Strategy types this crate can build
pub fn strategy_types() -> &'static [&'static str] {
    &[MOVING_AVERAGE, SENTIMENT, MOMENTUM]
}

/// One pod from its configuration entry
pub fn build_pod(
    name: &str,
    strategy: &StrategyConfig,
    history_window: usize,
) -> Result<Box<dyn Pod>, ConfigError> {
    let sizer = TargetSizer::new(strategy.position_size);

    match strategy.strategy_type.as_str() {
        MOVING_AVERAGE => {
            let defaults = MovingAverageParams::default();
            let params = MovingAverageParams {
                fast_window: strategy.param_or(name, "fast_window", defaults.fast_window)?,
                slow_window: strategy.param_or(name, "slow_window", defaults.slow_window)?,
                threshold: strategy.signal_threshold.unwrap_or(defaults.threshold),
                allow_short: strategy.param_or(name, "allow_short", defaults.allow_short)?,
            };
            params.validate(name, history_window)?;
            Ok(Box::new(MovingAverageCrossover::new(params, sizer)?))
        }
        SENTIMENT => {
            let defaults = SentimentParams::default();
            let params = SentimentParams {
                smoothing: strategy.param_or(name, "smoothing", defaults.smoothing)?,
                exit_band: strategy.param_or(name, "exit_band", defaults.exit_band)?,
                threshold: strategy.signal_threshold.unwrap_or(defaults.threshold),
                allow_short: strategy.param_or(name, "allow_short", defaults.allow_short)?,
            };
            params.validate(name)?;
            Ok(Box::new(SentimentPod::new(params, sizer)))
        }
        MOMENTUM => {
            let defaults = MomentumParams::default();
            let params = MomentumParams {
                lookback: strategy.param_or(name, "lookback", defaults.lookback)?,
                threshold: strategy.signal_threshold.unwrap_or(defaults.threshold),
                allow_short: strategy.param_or(name, "allow_short", defaults.allow_short)?,
            };
            params.validate(name, history_window)?;
            Ok(Box::new(MomentumPod::new(params, sizer)?))
        }
        other => Err(ConfigError::UnknownStrategyType {
            name: name.to_string(),
            strategy_type: other.to_string(),
        }),
    }
}

/// Every configured strategy, with its capital and risk limits
pub fn build_registry(config: &SimConfig) -> Result<PodRegistry, ConfigError> {
    let mut registry = PodRegistry::new();

    for (id, capital) in config.allocations() {
        let name = id.as_str().to_string();
        let strategy = config
            .strategies
            .get(&name)
            .ok_or_else(|| ConfigError::MissingKey(format!("strategies.{}", name)))?;
        let limit = config
            .pod_limit(&name)
            .ok_or_else(|| ConfigError::MissingKey(format!("strategies.{}", name)))?;
        let pod = build_pod(&name, strategy, config.global.history_window)?;

        info!(
            pod = %id,
            strategy_type = %strategy.strategy_type,
            category = %strategy.category,
            capital = %capital,
            "Registering pod"
        );
        registry.register(
            PodSpec {
                id,
                category: strategy.category,
                capital,
                limit,
            },
            pod,
        )?;
    }

    Ok(registry)
}
