use crate::config::{DataConfig, GlobalConfig, LoggingConfig, SimConfig, StrategyConfig};
use crate::core::{InstrumentId, PodId, Side, StrategyCategory, Timestamp, SECONDS_PER_DAY};
use crate::data::Bar;
use crate::pod::{
    Direction, MarketView, OrderRequest, Pod, PodAllocation, PodSpec, TradeIntent,
};
use crate::risk::{RiskLimit, RiskPolicy};
use anyhow::bail;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};

// ============================================================================
// Bars
// ============================================================================

/// Flat bar (open = high = low = close)
pub fn bar(symbol: &str, ts: Timestamp, close: Decimal, volume: Decimal) -> Bar {
    Bar::flat(ts, InstrumentId::from(symbol), close, volume)
}

/// One flat bar per close, `step` seconds apart starting at `start`
pub fn closes(
    symbol: &str,
    start: Timestamp,
    step: u64,
    closes: &[Decimal],
    volume: Decimal,
) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| bar(symbol, start + i as u64 * step, *close, volume))
        .collect()
}

/// Daily random-walk bars, reproducible from `seed`
///
/// Each close moves by a whole number of basis points in [-200, 200] and
/// never drops below one cent.
pub fn random_walk(symbol: &str, seed: u64, len: usize, start_price: Decimal) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let floor = Decimal::new(1, 2);
    let mut price = start_price;
    (0..len)
        .map(|i| {
            let bps: i64 = rng.gen_range(-200..=200);
            let open = price;
            price = (price * (Decimal::ONE + Decimal::new(bps, 4)))
                .round_dp(4)
                .max(floor);
            let volume = Decimal::from(rng.gen_range(5_000..50_000_i64));
            Bar::new(
                (i as u64 + 1) * SECONDS_PER_DAY,
                InstrumentId::from(symbol),
                open,
                open.max(price),
                open.min(price),
                price,
                volume,
            )
        })
        .collect()
}

// ============================================================================
// Configuration
// ============================================================================

/// Strategy entry with a 10% position size and no type-specific keys
pub fn strategy_config(strategy_type: &str) -> StrategyConfig {
    StrategyConfig {
        strategy_type: strategy_type.to_string(),
        position_size: Decimal::new(1, 1),
        signal_threshold: None,
        max_positions: 5,
        allocation: None,
        max_leverage: None,
        max_drawdown: None,
        max_position_notional: None,
        category: StrategyCategory::default(),
        params: BTreeMap::new(),
    }
}

/// Valid configuration with default costs and one placeholder strategy
///
/// The run driver takes its pods from the registry, so the strategy entry
/// only has to pass validation.
pub fn sim_config(initial_capital: Decimal, max_leverage: Decimal) -> SimConfig {
    SimConfig {
        global: GlobalConfig {
            initial_capital,
            max_leverage,
            transaction_cost: Decimal::new(1, 3),
            slippage: Decimal::new(5, 4),
            max_drawdown: Decimal::new(20, 2),
            max_concentration: None,
            max_participation_rate: Decimal::new(10, 2),
            lot_size: Decimal::ONE,
            risk_policy: RiskPolicy::Scale,
            parallel_signals: false,
            history_window: 256,
        },
        data: DataConfig::default(),
        strategies: BTreeMap::from([("scripted".to_string(), strategy_config("scripted"))]),
        logging: LoggingConfig::default(),
    }
}

/// Pod spec with leverage 2, five positions and a 20% drawdown breaker
pub fn spec(name: &str, capital: Decimal) -> PodSpec {
    spec_with_limit(name, capital, RiskLimit::new(Decimal::TWO, 5, Decimal::new(20, 2)))
}

pub fn spec_with_limit(name: &str, capital: Decimal, limit: RiskLimit) -> PodSpec {
    PodSpec {
        id: PodId::from(name),
        category: StrategyCategory::Quant,
        capital,
        limit,
    }
}

// ============================================================================
// Pods
// ============================================================================

/// Pod that places pre-recorded orders at given timestamps
///
/// An order fires when the bar of its instrument arrives at its timestamp.
#[derive(Debug, Clone)]
pub struct ScriptedPod {
    name: String,
    script: BTreeMap<Timestamp, Vec<OrderRequest>>,
    pending: VecDeque<OrderRequest>,
}

impl ScriptedPod {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: BTreeMap::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn at(mut self, ts: Timestamp, request: OrderRequest) -> Self {
        self.script.entry(ts).or_default().push(request);
        self
    }
}

impl Pod for ScriptedPod {
    fn generate_signal(&mut self, view: &MarketView<'_>) -> anyhow::Result<Vec<TradeIntent>> {
        self.pending.clear();
        let due: Vec<OrderRequest> = self
            .script
            .get(&view.timestamp)
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| &r.instrument == view.instrument())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let intents = due
            .iter()
            .map(|r| {
                let direction = match r.side {
                    Side::Buy => Direction::Long,
                    Side::Sell => Direction::Short,
                };
                TradeIntent::new(r.instrument.clone(), direction, view.bar.close)
            })
            .collect();
        self.pending.extend(due);
        Ok(intents)
    }

    fn size_order(
        &mut self,
        _intent: &TradeIntent,
        _allocation: &PodAllocation,
    ) -> anyhow::Result<Option<OrderRequest>> {
        Ok(self.pending.pop_front())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Signal stage returns an error from `fail_at` on
#[derive(Debug, Clone)]
pub struct FailingPod {
    name: String,
    fail_at: Timestamp,
}

impl FailingPod {
    pub fn new(name: &str, fail_at: Timestamp) -> Self {
        Self {
            name: name.to_string(),
            fail_at,
        }
    }
}

impl Pod for FailingPod {
    fn generate_signal(&mut self, view: &MarketView<'_>) -> anyhow::Result<Vec<TradeIntent>> {
        if view.timestamp >= self.fail_at {
            bail!("scripted failure at t={}", view.timestamp);
        }
        Ok(Vec::new())
    }

    fn size_order(
        &mut self,
        _intent: &TradeIntent,
        _allocation: &PodAllocation,
    ) -> anyhow::Result<Option<OrderRequest>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Signal stage panics from `panic_at` on
#[derive(Debug, Clone)]
pub struct PanickingPod {
    name: String,
    panic_at: Timestamp,
}

impl PanickingPod {
    pub fn new(name: &str, panic_at: Timestamp) -> Self {
        Self {
            name: name.to_string(),
            panic_at,
        }
    }
}

impl Pod for PanickingPod {
    fn generate_signal(&mut self, view: &MarketView<'_>) -> anyhow::Result<Vec<TradeIntent>> {
        if view.timestamp >= self.panic_at {
            panic!("scripted panic at t={}", view.timestamp);
        }
        Ok(Vec::new())
    }

    fn size_order(
        &mut self,
        _intent: &TradeIntent,
        _allocation: &PodAllocation,
    ) -> anyhow::Result<Option<OrderRequest>> {
        Ok(None)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
