//! Pod Strategies - Concrete pods for the multi-pod simulator
//!
//! ## Available Strategies
//!
//! | Type | Pod | Signal |
//! |------|-----|--------|
//! | `moving_average` | [`MovingAverageCrossover`] | fast SMA vs slow SMA |
//! | `sentiment` | [`SentimentPod`] | smoothed `sentiment_score` vs threshold |
//! | `momentum` | [`MomentumPod`] | lookback return vs threshold |
//!
//! All of them size through [`TargetSizer`]: a target notional that is a
//! fraction of the pod's equity, bounded by its leverage limit.
//!
//! ## Usage Example
//!
//! ```no_run
//! use pod_core::prelude::*;
//! use serde_json::json;
//!
//! let config = SimConfig::from_value(json!({
//!     "global": { "initial_capital": 1_000_000, "max_leverage": 2 },
//!     "strategies": {
//!         "trend": { "type": "moving_average", "position_size": 0.2 },
//!         "mood": { "type": "sentiment", "position_size": 0.1 }
//!     }
//! }))?;
//! config.logging.init()?;
//!
//! let mut feed = InMemoryFeed::new();
//! let result = pod_strategies::run(
//!     &config,
//!     &mut feed,
//!     &[InstrumentId::from("AAPL")],
//!     DateRange::unbounded(),
//! )?;
//! println!("final equity {}", result.final_equity());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod factory;
pub mod momentum;
pub mod moving_average;
pub mod sentiment;
pub mod sizing;

pub use factory::{build_pod, build_registry, strategy_types};
pub use momentum::{MomentumParams, MomentumPod};
pub use moving_average::{MovingAverageCrossover, MovingAverageParams};
pub use sentiment::{SentimentParams, SentimentPod};
pub use sizing::TargetSizer;

use pod_core::core::{DateRange, InstrumentId, SimError};
use pod_core::data::DataFeed;
use pod_core::engine::RunResult;
use pod_core::SimConfig;

/// Build the configured pods and replay `feed` through them
pub fn run(
    config: &SimConfig,
    feed: &mut dyn DataFeed,
    instruments: &[InstrumentId],
    range: DateRange,
) -> Result<RunResult, SimError> {
    let registry = build_registry(config)?;
    pod_core::run(config.clone(), registry, feed, instruments, range)
}
