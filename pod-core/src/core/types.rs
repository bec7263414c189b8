use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulated time: seconds since the Unix epoch.
///
/// All time in the simulator is virtual and driven by the data feed, never
/// by the wall clock.
pub type Timestamp = u64;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Inclusive simulated-time window for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl DateRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Range covering every representable timestamp
    pub fn unbounded() -> Self {
        Self {
            start: 0,
            end: Timestamp::MAX,
        }
    }

    #[inline]
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Instrument symbol (e.g. "AAPL")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Pod identity, the strategy name it was registered under
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodId(String);

impl PodId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PodId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Order identifier, assigned sequentially per run so replays agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ord-{:08}", self.0)
    }
}

/// Fill identifier, one per partial or total execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FillId(pub u64);

impl fmt::Display for FillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fill-{:08}", self.0)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells
    #[inline]
    pub fn sign(self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Side that moves a signed position by `delta`
    pub fn for_delta(delta: Decimal) -> Option<Self> {
        if delta > Decimal::ZERO {
            Some(Side::Buy)
        } else if delta < Decimal::ZERO {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Fill at the simulated fill price, whatever it is
    Market,
    /// Fill only when the simulated fill price is at or better than `price`
    Limit { price: Decimal },
}

impl OrderType {
    /// Whether a fill at `fill_price` is acceptable for `side`
    pub fn accepts(&self, side: Side, fill_price: Decimal) -> bool {
        match (self, side) {
            (OrderType::Market, _) => true,
            (OrderType::Limit { price }, Side::Buy) => fill_price <= *price,
            (OrderType::Limit { price }, Side::Sell) => fill_price >= *price,
        }
    }
}

/// Who created an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderOrigin {
    /// Produced by the pod's sizing stage
    Pod,
    /// Synthetic liquidation issued by the circuit breaker
    Liquidation,
    /// Synthetic reduction issued when marking pushed leverage over its limit
    Deleverage,
}

impl OrderOrigin {
    /// Risk-originated orders bypass the participation cap and pre-trade checks
    #[inline]
    pub fn is_forced(self) -> bool {
        !matches!(self, OrderOrigin::Pod)
    }
}

/// Strategy family a pod belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyCategory {
    EquityLongShort,
    LongBiased,
    EventDriven,
    Macro,
    #[default]
    Quant,
    MultiStrategy,
}

impl fmt::Display for StrategyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyCategory::EquityLongShort => "equity_long_short",
            StrategyCategory::LongBiased => "long_biased",
            StrategyCategory::EventDriven => "event_driven",
            StrategyCategory::Macro => "macro",
            StrategyCategory::Quant => "quant",
            StrategyCategory::MultiStrategy => "multi_strategy",
        };
        f.write_str(s)
    }
}

/// Round `qty` down to a whole number of lots (toward zero).
pub fn round_to_lot(qty: Decimal, lot_size: Decimal) -> Decimal {
    if lot_size <= Decimal::ZERO {
        return qty;
    }
    (qty / lot_size).trunc() * lot_size
}

/// Round `qty` up to a whole number of lots (away from zero).
pub fn round_up_to_lot(qty: Decimal, lot_size: Decimal) -> Decimal {
    if lot_size <= Decimal::ZERO {
        return qty;
    }
    let lots = qty / lot_size;
    let whole = lots.trunc();
    if lots == whole {
        qty
    } else if lots > Decimal::ZERO {
        (whole + Decimal::ONE) * lot_size
    } else {
        (whole - Decimal::ONE) * lot_size
    }
}
