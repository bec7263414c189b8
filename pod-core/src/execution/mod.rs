//! Execution: cost model, fill records and the simulator that drives the
//! order state machine from submission to a terminal state.
//!
//! The simulator is the only component that creates [`Fill`]s.

pub mod cost;
pub mod simulated;
pub mod types;

pub use cost::{CostModel, FillEstimate};
pub use simulated::{ExecutionConfig, ExecutionSimulator, ExecutionStats};
pub use types::Fill;
