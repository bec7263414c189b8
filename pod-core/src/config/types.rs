use crate::core::{InstrumentId, StrategyCategory};
use crate::data::{FeedErrorPolicy, MissingBarPolicy};
use crate::risk::RiskPolicy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root of a simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub global: GlobalConfig,

    #[serde(default)]
    pub data: DataConfig,

    /// Strategy name -> parameters; registration order is name order
    pub strategies: BTreeMap<String, StrategyConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Portfolio-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub initial_capital: Decimal,

    /// Gross exposure / equity ceiling for the whole portfolio
    pub max_leverage: Decimal,

    /// Fee as a fraction of notional
    #[serde(default = "default_transaction_cost")]
    pub transaction_cost: Decimal,

    /// Price impact as a fraction of mid
    #[serde(default = "default_slippage")]
    pub slippage: Decimal,

    /// Circuit-breaker drawdown threshold (fraction of peak equity)
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown: Decimal,

    /// Max aggregate notional of one instrument as a fraction of equity
    #[serde(default)]
    pub max_concentration: Option<Decimal>,

    #[serde(default = "default_participation")]
    pub max_participation_rate: Decimal,

    #[serde(default = "default_lot_size")]
    pub lot_size: Decimal,

    #[serde(default)]
    pub risk_policy: RiskPolicy,

    /// Run the signal stage of all pods on worker threads
    #[serde(default)]
    pub parallel_signals: bool,

    /// Bars of history per instrument visible to pods
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub missing_bar_policy: MissingBarPolicy,

    #[serde(default)]
    pub policy_overrides: BTreeMap<InstrumentId, MissingBarPolicy>,

    /// Largest allowed gap between ticks; unbounded when absent
    #[serde(default)]
    pub staleness_window_secs: Option<u64>,

    #[serde(default)]
    pub on_error: FeedErrorPolicy,
}

/// One pod's configuration
///
/// Keys not listed here are kept in `params` for the strategy factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Strategy type: "moving_average", "sentiment" or "momentum"
    #[serde(rename = "type")]
    pub strategy_type: String,

    /// Target position notional as a fraction of pod equity
    pub position_size: Decimal,

    #[serde(default)]
    pub signal_threshold: Option<Decimal>,

    #[serde(default = "default_max_positions")]
    pub max_positions: usize,

    /// Fraction of initial capital; see `SimConfig::allocations`
    #[serde(default)]
    pub allocation: Option<Decimal>,

    /// Defaults to the global leverage limit
    #[serde(default)]
    pub max_leverage: Option<Decimal>,

    /// Defaults to the global drawdown threshold
    #[serde(default)]
    pub max_drawdown: Option<Decimal>,

    #[serde(default)]
    pub max_position_notional: Option<Decimal>,

    #[serde(default)]
    pub category: StrategyCategory,

    #[serde(flatten)]
    pub params: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// "trace", "debug", "info", "warn" or "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_transaction_cost() -> Decimal {
    Decimal::new(1, 3) // 0.1%
}

fn default_slippage() -> Decimal {
    Decimal::new(5, 4) // 5 bps
}

fn default_max_drawdown() -> Decimal {
    Decimal::new(20, 2) // 20%
}

fn default_participation() -> Decimal {
    Decimal::new(10, 2) // 10% of bar volume
}

fn default_lot_size() -> Decimal {
    Decimal::ONE
}

fn default_history_window() -> usize {
    256
}

fn default_max_positions() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber described by this section
    pub fn init(&self) -> Result<(), tracing_subscriber::util::TryInitError> {
        crate::utils::init_logger(&self.level, self.json)
    }
}
