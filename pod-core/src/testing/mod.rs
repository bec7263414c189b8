//! Builders and scripted pods shared by unit tests, integration tests
//! and benchmarks
//!
//! - Bars: single bars, fixed close series, seeded random walks
//! - Configuration: a valid `SimConfig` with default costs
//! - Pods: scripted orders, failing and panicking pods

pub mod helpers;

pub use helpers::*;
