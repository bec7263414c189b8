//! Simulation configuration
//!
//! Built from an already-resolved `serde_json::Value`; reading files and
//! merging sources is the caller's business. Missing required keys and
//! out-of-range values surface as [`ConfigError`] before any tick runs.

pub mod types;

pub use types::*;

use crate::core::{ConfigError, InstrumentId, PodId};
use crate::data::SyncConfig;
use crate::execution::{CostModel, ExecutionConfig};
use crate::risk::{GlobalLimits, RiskLimit};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Map a serde error onto the config taxonomy
fn parse_error(err: serde_json::Error) -> ConfigError {
    let message = err.to_string();
    if let Some(rest) = message.strip_prefix("missing field `") {
        if let Some(end) = rest.find('`') {
            return ConfigError::MissingKey(rest[..end].to_string());
        }
    }
    ConfigError::Parse(message)
}

fn check_fraction(
    key: &str,
    value: Decimal,
    allow_zero: bool,
    allow_one: bool,
) -> Result<(), ConfigError> {
    let low_ok = if allow_zero {
        value >= Decimal::ZERO
    } else {
        value > Decimal::ZERO
    };
    let high_ok = if allow_one {
        value <= Decimal::ONE
    } else {
        value < Decimal::ONE
    };
    if low_ok && high_ok {
        Ok(())
    } else {
        let low = if allow_zero { "[0" } else { "(0" };
        let high = if allow_one { "1]" } else { "1)" };
        Err(ConfigError::invalid(
            key,
            format!("{} must be in {}, {}", value, low, high),
        ))
    }
}

impl SimConfig {
    /// Deserialize and validate
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_value(value).map_err(parse_error)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.global;
        if g.initial_capital <= Decimal::ZERO {
            return Err(ConfigError::invalid("global.initial_capital", "must be positive"));
        }
        if g.max_leverage < Decimal::ONE {
            return Err(ConfigError::invalid("global.max_leverage", "must be at least 1"));
        }
        check_fraction("global.transaction_cost", g.transaction_cost, true, false)?;
        check_fraction("global.slippage", g.slippage, true, false)?;
        check_fraction("global.max_drawdown", g.max_drawdown, false, true)?;
        check_fraction("global.max_participation_rate", g.max_participation_rate, false, true)?;
        if let Some(c) = g.max_concentration {
            if c <= Decimal::ZERO {
                return Err(ConfigError::invalid("global.max_concentration", "must be positive"));
            }
        }
        if g.lot_size <= Decimal::ZERO {
            return Err(ConfigError::invalid("global.lot_size", "must be positive"));
        }
        if g.history_window < 2 {
            return Err(ConfigError::invalid("global.history_window", "must be at least 2"));
        }

        if self.strategies.is_empty() {
            return Err(ConfigError::MissingKey("strategies".to_string()));
        }
        let mut allocated = Decimal::ZERO;
        for (name, s) in &self.strategies {
            let key = |field: &str| format!("strategies.{}.{}", name, field);
            if s.position_size <= Decimal::ZERO {
                return Err(ConfigError::invalid(key("position_size"), "must be positive"));
            }
            if s.max_positions == 0 {
                return Err(ConfigError::invalid(key("max_positions"), "must be at least 1"));
            }
            if let Some(a) = s.allocation {
                check_fraction(&key("allocation"), a, false, true)?;
                allocated += a;
            }
            if let Some(l) = s.max_leverage {
                if l <= Decimal::ZERO {
                    return Err(ConfigError::invalid(key("max_leverage"), "must be positive"));
                }
            }
            if let Some(d) = s.max_drawdown {
                check_fraction(&key("max_drawdown"), d, false, true)?;
            }
            if let Some(n) = s.max_position_notional {
                if n <= Decimal::ZERO {
                    return Err(ConfigError::invalid(
                        key("max_position_notional"),
                        "must be positive",
                    ));
                }
            }
            if let Some(t) = s.signal_threshold {
                if t < Decimal::ZERO {
                    return Err(ConfigError::invalid(
                        key("signal_threshold"),
                        "must not be negative",
                    ));
                }
            }
        }
        if allocated > Decimal::ONE {
            return Err(ConfigError::invalid(
                "strategies.*.allocation",
                format!("allocations sum to {}, more than 1", allocated),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::invalid(
                "logging.level",
                format!("`{}` must be one of {:?}", self.logging.level, valid_log_levels),
            ));
        }

        debug!(strategies = self.strategies.len(), "Configuration validated");
        Ok(())
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.global.slippage, self.global.transaction_cost)
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            cost: self.cost_model(),
            max_participation_rate: self.global.max_participation_rate,
            lot_size: self.global.lot_size,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            default_policy: self.data.missing_bar_policy,
            overrides: self.data.policy_overrides.clone(),
            staleness_window: self.data.staleness_window_secs,
            on_error: self.data.on_error,
        }
    }

    pub fn global_limits(&self) -> GlobalLimits {
        GlobalLimits {
            max_leverage: self.global.max_leverage,
            max_drawdown: self.global.max_drawdown,
            max_concentration: self.global.max_concentration,
        }
    }

    /// Risk limits of strategy `name`, inheriting global defaults
    pub fn pod_limit(&self, name: &str) -> Option<RiskLimit> {
        let s = self.strategies.get(name)?;
        let mut limit = RiskLimit::new(
            s.max_leverage.unwrap_or(self.global.max_leverage),
            s.max_positions,
            s.max_drawdown.unwrap_or(self.global.max_drawdown),
        );
        limit.max_position_notional = s.max_position_notional;
        Some(limit)
    }

    /// Capital per strategy, in registration order
    ///
    /// With no explicit allocations capital is split equally. Otherwise
    /// each explicit fraction is honoured and whatever remains is split
    /// equally among the strategies without one; capital left over when
    /// every strategy is explicit stays in reserve.
    pub fn allocations(&self) -> Vec<(PodId, Decimal)> {
        let capital = self.global.initial_capital;
        let explicit: Decimal = self
            .strategies
            .values()
            .filter_map(|s| s.allocation)
            .map(|a| capital * a)
            .sum();
        let implicit = self
            .strategies
            .values()
            .filter(|s| s.allocation.is_none())
            .count();
        // Split the remaining amount, not the fraction
        let share = if implicit == 0 {
            Decimal::ZERO
        } else {
            (capital - explicit).max(Decimal::ZERO) / Decimal::from(implicit as u64)
        };

        self.strategies
            .iter()
            .map(|(name, s)| {
                let amount = s.allocation.map_or(share, |a| capital * a);
                (PodId::new(name.clone()), amount)
            })
            .collect()
    }

    /// Strategy names in registration order
    pub fn strategy_names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    /// Instruments named in `data.policy_overrides`
    pub fn override_instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.data.policy_overrides.keys()
    }
}

impl StrategyConfig {
    /// Type-specific parameter, `None` when absent
    pub fn param<T: DeserializeOwned>(
        &self,
        name: &str,
        key: &str,
    ) -> Result<Option<T>, ConfigError> {
        match self.params.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                ConfigError::invalid(format!("strategies.{}.{}", name, key), e.to_string())
            }),
        }
    }

    /// Type-specific parameter with a default
    pub fn param_or<T: DeserializeOwned>(
        &self,
        name: &str,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        Ok(self.param(name, key)?.unwrap_or(default))
    }
}
