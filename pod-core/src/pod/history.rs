//! Bounded market history visible to pods

use crate::core::{InstrumentId, Timestamp};
use crate::data::Bar;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};

/// Last `window` bars per instrument, oldest first
#[derive(Debug, Clone)]
pub struct MarketHistory {
    window: usize,
    bars: BTreeMap<InstrumentId, VecDeque<Bar>>,
}

impl MarketHistory {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            bars: BTreeMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn record(&mut self, bar: &Bar) {
        let series = self
            .bars
            .entry(bar.instrument.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.window));
        if series.len() == self.window {
            series.pop_front();
        }
        series.push_back(bar.clone());
    }

    pub fn bars(&self, instrument: &InstrumentId) -> impl Iterator<Item = &Bar> + '_ {
        self.bars.get(instrument).into_iter().flatten()
    }

    pub fn len(&self, instrument: &InstrumentId) -> usize {
        self.bars.get(instrument).map_or(0, VecDeque::len)
    }

    pub fn latest(&self, instrument: &InstrumentId) -> Option<&Bar> {
        self.bars.get(instrument).and_then(|s| s.back())
    }

    /// Latest close of every instrument seen so far
    pub fn latest_closes(&self) -> BTreeMap<InstrumentId, Decimal> {
        self.bars
            .iter()
            .filter_map(|(i, s)| s.back().map(|b| (i.clone(), b.close)))
            .collect()
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.bars.keys()
    }
}

/// What a pod's signal stage sees for one bar
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    pub timestamp: Timestamp,
    /// The bar being delivered (already recorded in `history`)
    pub bar: &'a Bar,
    pub history: &'a MarketHistory,
}

impl<'a> MarketView<'a> {
    pub fn new(bar: &'a Bar, history: &'a MarketHistory) -> Self {
        Self {
            timestamp: bar.timestamp,
            bar,
            history,
        }
    }

    pub fn instrument(&self) -> &'a InstrumentId {
        &self.bar.instrument
    }

    /// Closes of `instrument`, oldest first, including the current bar
    pub fn closes(&self, instrument: &InstrumentId) -> Vec<Decimal> {
        self.history.bars(instrument).map(|b| b.close).collect()
    }

    /// Last `n` closes of the current instrument, or `None` with fewer bars
    pub fn trailing_closes(&self, n: usize) -> Option<Vec<Decimal>> {
        let len = self.history.len(self.instrument());
        if n == 0 || len < n {
            return None;
        }
        Some(
            self.history
                .bars(self.instrument())
                .skip(len - n)
                .map(|b| b.close)
                .collect(),
        )
    }

    pub fn latest(&self, instrument: &InstrumentId) -> Option<&'a Bar> {
        self.history.latest(instrument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(ts: Timestamp, close: Decimal) -> Bar {
        Bar::flat(ts, InstrumentId::from("AAPL"), close, dec!(1000))
    }

    #[test]
    fn test_window_drops_oldest() {
        let mut history = MarketHistory::new(3);
        for (ts, close) in [(1, dec!(10)), (2, dec!(11)), (3, dec!(12)), (4, dec!(13))] {
            history.record(&bar(ts, close));
        }
        let aapl = InstrumentId::from("AAPL");
        assert_eq!(history.len(&aapl), 3);
        assert_eq!(history.bars(&aapl).next().map(|b| b.timestamp), Some(2));
        assert_eq!(history.latest(&aapl).map(|b| b.close), Some(dec!(13)));
        assert_eq!(history.latest_closes().get(&aapl), Some(&dec!(13)));
    }

    #[test]
    fn test_view_trailing_closes() {
        let mut history = MarketHistory::new(10);
        for ts in 1..=5 {
            history.record(&bar(ts, Decimal::from(ts)));
        }
        let current = bar(5, dec!(5));
        let view = MarketView::new(&current, &history);
        assert_eq!(view.trailing_closes(2), Some(vec![dec!(4), dec!(5)]));
        assert_eq!(view.trailing_closes(6), None);
        assert_eq!(view.closes(&InstrumentId::from("MSFT")), Vec::<Decimal>::new());
    }
}
