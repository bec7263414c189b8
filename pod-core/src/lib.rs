//! Pod Core - Deterministic Multi-Pod Backtesting Simulator
//!
//! Replays historical bars through independent strategy pods that share one
//! portfolio, with centralized risk limits and a cost-aware execution model.
//!
//! ## Architecture
//! - **Simulated time only**: the data feed drives the clock
//! - **Deterministic replay**: events ordered by (timestamp, sequence), pods
//!   dispatched in registration order
//! - **Single writer**: the ledger and risk counters are mutated serially per tick
//! - **Isolated pods**: a failing or panicking pod is excluded, the run goes on
//! - **Exact accounting**: money and quantities are `Decimal`
//!
//! ## Core Modules
//! - `core`: identifiers, sides, order state machine, error taxonomy
//! - `events`: event clock and bus
//! - `data`: bars, feed interface, synchronizer
//! - `pod`: pod trait, registry, orchestrator
//! - `risk`: pre-trade checks, drawdown breakers, deleveraging
//! - `execution`: cost model and fill simulation
//! - `ledger`: cash, positions, equity curve, snapshots
//! - `config`: simulation configuration
//! - `engine`: the run driver
//! - `metrics`: performance summary

pub mod config;
pub mod core;
pub mod data;
pub mod engine;
pub mod events;
pub mod execution;
pub mod ledger;
pub mod metrics;
pub mod pod;
pub mod risk;
pub mod testing;
pub mod utils;

// Re-export core types
pub use core::{
    ConfigError, DataFeedError, DateRange, InstrumentId, LedgerInvariantViolation, Order,
    OrderId, OrderStatus, OrderType, PodExecutionError, PodId, Side, SimError, StrategyCategory,
    Timestamp,
};

pub use config::SimConfig;
pub use data::{Bar, DataFeed, InMemoryFeed};
pub use engine::{run, CancellationToken, RunResult, RunStatus, Simulator};
pub use pod::{Pod, PodRegistry, PodSpec};
pub use risk::{RiskLimit, RiskPolicy};

/// Prelude for convenient imports
pub mod prelude {
    // Core types
    pub use crate::core::{DateRange, InstrumentId, OrderType, PodId, Side, Timestamp};

    // Pods
    pub use crate::pod::{
        Direction, MarketView, OrderRequest, Pod, PodAllocation, PodRegistry, PodSpec,
        TradeIntent,
    };

    // Running
    pub use crate::config::SimConfig;
    pub use crate::data::{Bar, DataFeed, InMemoryFeed};
    pub use crate::engine::{run, RunResult, RunStatus, Simulator};
    pub use crate::risk::RiskLimit;

    // Error types
    pub use crate::core::SimError;
}
