//! Simulation engine
//!
//! - `simulator`: the run driver wiring bus, feed, pods, risk, execution and ledger
//! - `cancel`: cooperative stop between ticks
//! - `result`: what a finished run hands back

pub mod cancel;
pub mod result;
pub mod simulator;

pub use cancel::CancellationToken;
pub use result::{PodReport, RunResult, RunStats, RunStatus};
pub use simulator::{run, Simulator};
