//! Data feed collaborator interface
//!
//! The simulator never parses files. A [`DataFeed`] hands out one ordered
//! stream of bars per instrument and the synchronizer merges them.

use super::types::Bar;
use crate::core::{DataFeedError, DateRange, InstrumentId};
use std::collections::BTreeMap;

/// Ordered bars for a single instrument
pub type BarStream = Box<dyn Iterator<Item = Result<Bar, DataFeedError>> + Send>;

pub trait DataFeed {
    /// Open the bar stream for `instrument` restricted to `range`
    fn open(&mut self, instrument: &InstrumentId, range: DateRange) -> Result<BarStream, DataFeedError>;
}

/// Feed backed by bars already in memory
///
/// Bars keep the order they were added in, so an out-of-order input is
/// reported by the synchronizer instead of being silently sorted.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeed {
    series: BTreeMap<InstrumentId, Vec<Bar>>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bars(bars: impl IntoIterator<Item = Bar>) -> Self {
        let mut feed = Self::new();
        for bar in bars {
            feed.push(bar);
        }
        feed
    }

    pub fn push(&mut self, bar: Bar) {
        self.series.entry(bar.instrument.clone()).or_default().push(bar);
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        self.series.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DataFeed for InMemoryFeed {
    fn open(&mut self, instrument: &InstrumentId, range: DateRange) -> Result<BarStream, DataFeedError> {
        let bars = self
            .series
            .get(instrument)
            .ok_or_else(|| DataFeedError::Source {
                instrument: instrument.clone(),
                reason: "instrument not present in feed".to_string(),
            })?
            .iter()
            .filter(|bar| range.contains(bar.timestamp))
            .cloned()
            .map(Ok)
            .collect::<Vec<_>>();
        Ok(Box::new(bars.into_iter()))
    }
}
