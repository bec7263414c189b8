//! Core simulator types
//!
//! - Identifiers: `PodId`, `InstrumentId`, `OrderId`, `FillId`
//! - Trading primitives: `Side`, `OrderType`, `OrderOrigin`, `StrategyCategory`
//! - Simulated time: `Timestamp`, `DateRange`
//! - The order lifecycle state machine
//! - The error taxonomy shared by every component

pub mod errors;
pub mod order_fsm;
pub mod types;

pub use errors::{
    ConfigError, DataFeedError, LedgerInvariantViolation, PodExecutionError, PodStage, SimError,
};
pub use order_fsm::{FillError, Order, OrderStateError, OrderStatus};
pub use types::{
    round_to_lot, round_up_to_lot, DateRange, FillId, InstrumentId, OrderId, OrderOrigin,
    OrderType, PodId, Side, StrategyCategory, Timestamp, SECONDS_PER_DAY,
};
