//! Data Feed Synchronizer
//!
//! Merges N per-instrument bar streams into one non-decreasing sequence of
//! ticks. A tick is every bar sharing the smallest pending timestamp,
//! in instrument order.
//!
//! ```text
//!  AAPL: t1 t2    t4        ┌─────────────┐   t1: [AAPL, MSFT]
//!  MSFT: t1 t2 t3 t4  ───▶  │ k-way merge │──▶ t2: [AAPL, MSFT]
//!  SPY : t1 ·exhausted      └─────────────┘   t3: [AAPL*, MSFT]   (* forward-filled)
//!                                             t4: [AAPL, MSFT]
//! ```
//!
//! - Missing bar: forward-fill the last known bar or skip, per instrument
//! - Exhausted stream: dropped from the merge, recorded, run continues
//! - Gap larger than the staleness window: `DataFeedError::Stale`
//! - Malformed/out-of-order bar: fatal, or drop the instrument when configured
//!
//! Every fill/skip/drop decision is kept as a [`FeedRecord`] so a replay can
//! be audited.

use super::feed::{BarStream, DataFeed};
use super::stale::StalenessGuard;
use super::types::Bar;
use super::validator::BarValidator;
use crate::core::{DataFeedError, DateRange, InstrumentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// What to emit for an instrument with no bar at a tick's timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingBarPolicy {
    #[default]
    ForwardFill,
    Skip,
}

/// What to do when one instrument's stream yields bad data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedErrorPolicy {
    #[default]
    Abort,
    /// Drop the offending instrument with a warning record and continue
    SkipInstrument,
}

#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    pub default_policy: MissingBarPolicy,
    pub overrides: BTreeMap<InstrumentId, MissingBarPolicy>,
    /// Maximum simulated seconds between ticks
    pub staleness_window: Option<u64>,
    pub on_error: FeedErrorPolicy,
}

impl SyncConfig {
    pub fn policy_for(&self, instrument: &InstrumentId) -> MissingBarPolicy {
        self.overrides
            .get(instrument)
            .copied()
            .unwrap_or(self.default_policy)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FeedRecordKind {
    ForwardFilled,
    Skipped,
    /// End of series reached; the stream left the merge
    Exhausted,
    /// Stream removed after bad data under `FeedErrorPolicy::SkipInstrument`
    Dropped { error: DataFeedError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedRecord {
    pub timestamp: Timestamp,
    pub instrument: InstrumentId,
    pub kind: FeedRecordKind,
}

struct Cursor {
    instrument: InstrumentId,
    stream: BarStream,
    range: DateRange,
    policy: MissingBarPolicy,
    validator: BarValidator,
    peeked: Option<Bar>,
    last_bar: Option<Bar>,
}

impl Cursor {
    /// Pull the next in-range, validated bar into `peeked`
    fn advance(&mut self) -> Result<(), DataFeedError> {
        self.peeked = None;
        for item in self.stream.by_ref() {
            let bar = item?;
            if bar.timestamp < self.range.start {
                continue;
            }
            if bar.timestamp > self.range.end {
                break;
            }
            self.validator.check(&bar)?;
            self.peeked = Some(bar);
            break;
        }
        Ok(())
    }

    fn last_timestamp(&self) -> Timestamp {
        self.last_bar.as_ref().map_or(self.range.start, |b| b.timestamp)
    }
}

pub struct FeedSynchronizer {
    cursors: Vec<Cursor>,
    guard: StalenessGuard,
    on_error: FeedErrorPolicy,
    policies: BTreeMap<InstrumentId, MissingBarPolicy>,
    records: Vec<FeedRecord>,
    ticks: u64,
}

impl FeedSynchronizer {
    /// Open and prime one stream per instrument
    ///
    /// Duplicate instruments are opened once. Fails with `NoData` when no
    /// stream has a single bar in range.
    pub fn open(
        feed: &mut dyn DataFeed,
        instruments: &[InstrumentId],
        range: DateRange,
        config: &SyncConfig,
    ) -> Result<Self, DataFeedError> {
        let mut unique: Vec<InstrumentId> = instruments.to_vec();
        unique.sort();
        unique.dedup();

        let mut sync = Self {
            cursors: Vec::with_capacity(unique.len()),
            guard: StalenessGuard::new(config.staleness_window),
            on_error: config.on_error,
            policies: BTreeMap::new(),
            records: Vec::new(),
            ticks: 0,
        };

        for instrument in unique {
            let policy = config.policy_for(&instrument);
            sync.policies.insert(instrument.clone(), policy);

            let opened = feed.open(&instrument, range).and_then(|stream| {
                let mut cursor = Cursor {
                    instrument: instrument.clone(),
                    stream,
                    range,
                    policy,
                    validator: BarValidator::new(),
                    peeked: None,
                    last_bar: None,
                };
                cursor.advance()?;
                Ok(cursor)
            });

            match opened {
                Ok(cursor) if cursor.peeked.is_some() => sync.cursors.push(cursor),
                Ok(_) => {
                    sync.record(range.start, instrument, FeedRecordKind::Exhausted);
                }
                Err(error) => sync.handle_error(range.start, instrument, error)?,
            }
        }

        if sync.cursors.is_empty() {
            return Err(DataFeedError::NoData);
        }

        info!(
            instruments = sync.cursors.len(),
            staleness_window = ?config.staleness_window,
            on_error = ?config.on_error,
            "Feed synchronizer opened"
        );
        Ok(sync)
    }

    /// Next tick's bars, or `None` once every stream is exhausted
    pub fn next_tick(&mut self) -> Result<Option<Vec<Bar>>, DataFeedError> {
        let Some(ts) = self
            .cursors
            .iter()
            .filter_map(|c| c.peeked.as_ref().map(|b| b.timestamp))
            .min()
        else {
            return Ok(None);
        };
        self.guard.check(ts)?;

        let mut bars = Vec::with_capacity(self.cursors.len());
        let mut finished: Vec<(usize, Option<DataFeedError>)> = Vec::new();
        let mut records = Vec::new();

        for (idx, cursor) in self.cursors.iter_mut().enumerate() {
            let due = cursor.peeked.as_ref().map_or(false, |b| b.timestamp == ts);
            if due {
                if let Some(bar) = cursor.peeked.take() {
                    cursor.last_bar = Some(bar.clone());
                    bars.push(bar);
                }
                match cursor.advance() {
                    Ok(()) if cursor.peeked.is_none() => finished.push((idx, None)),
                    Ok(()) => {}
                    Err(error) => finished.push((idx, Some(error))),
                }
                continue;
            }

            // Instrument has no bar at `ts` but has already started
            if let Some(last) = cursor.last_bar.as_ref() {
                match cursor.policy {
                    MissingBarPolicy::ForwardFill => {
                        bars.push(last.carried_to(ts));
                        records.push(FeedRecord {
                            timestamp: ts,
                            instrument: cursor.instrument.clone(),
                            kind: FeedRecordKind::ForwardFilled,
                        });
                    }
                    MissingBarPolicy::Skip => records.push(FeedRecord {
                        timestamp: ts,
                        instrument: cursor.instrument.clone(),
                        kind: FeedRecordKind::Skipped,
                    }),
                }
            }
        }
        self.records.extend(records);

        // Remove back to front so indices stay valid
        for (idx, error) in finished.into_iter().rev() {
            let cursor = self.cursors.remove(idx);
            let at = cursor.last_timestamp();
            match error {
                None => {
                    info!(instrument = %cursor.instrument, at, "Feed exhausted, dropping from merge");
                    self.record(at, cursor.instrument, FeedRecordKind::Exhausted);
                }
                Some(error) => self.handle_error(at, cursor.instrument, error)?,
            }
        }

        self.guard.mark_emitted(ts);
        self.ticks += 1;
        debug!(ts, bars = bars.len(), "tick assembled");
        Ok(Some(bars))
    }

    fn handle_error(
        &mut self,
        at: Timestamp,
        instrument: InstrumentId,
        error: DataFeedError,
    ) -> Result<(), DataFeedError> {
        match self.on_error {
            FeedErrorPolicy::Abort => Err(error),
            FeedErrorPolicy::SkipInstrument => {
                warn!(instrument = %instrument, %error, "Dropping instrument after feed error");
                self.record(at, instrument, FeedRecordKind::Dropped { error });
                Ok(())
            }
        }
    }

    fn record(&mut self, timestamp: Timestamp, instrument: InstrumentId, kind: FeedRecordKind) {
        self.records.push(FeedRecord {
            timestamp,
            instrument,
            kind,
        });
    }

    /// Instruments still in the merge
    pub fn active_instruments(&self) -> Vec<InstrumentId> {
        self.cursors.iter().map(|c| c.instrument.clone()).collect()
    }

    /// Missing-bar policy in effect per requested instrument
    pub fn policies(&self) -> &BTreeMap<InstrumentId, MissingBarPolicy> {
        &self.policies
    }

    pub fn records(&self) -> &[FeedRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<FeedRecord> {
        self.records
    }

    pub fn ticks_emitted(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryFeed;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn id(s: &str) -> InstrumentId {
        InstrumentId::from(s)
    }

    fn bar(sym: &str, ts: Timestamp, close: Decimal) -> Bar {
        Bar::flat(ts, id(sym), close, dec!(1000))
    }

    fn drain(sync: &mut FeedSynchronizer) -> Vec<(Timestamp, Vec<(String, bool)>)> {
        let mut out = Vec::new();
        while let Some(bars) = sync.next_tick().unwrap() {
            let ts = bars[0].timestamp;
            assert!(bars.iter().all(|b| b.timestamp == ts));
            out.push((
                ts,
                bars.iter()
                    .map(|b| (b.instrument.to_string(), b.forward_filled))
                    .collect(),
            ));
        }
        out
    }

    #[test]
    fn test_merges_in_timestamp_then_instrument_order() {
        let mut feed = InMemoryFeed::from_bars(vec![
            bar("MSFT", 1, dec!(10)),
            bar("MSFT", 2, dec!(11)),
            bar("AAPL", 1, dec!(20)),
            bar("AAPL", 2, dec!(21)),
        ]);
        let mut sync = FeedSynchronizer::open(
            &mut feed,
            &[id("MSFT"), id("AAPL")],
            DateRange::unbounded(),
            &SyncConfig::default(),
        )
        .unwrap();

        let ticks = drain(&mut sync);
        assert_eq!(ticks.len(), 2);
        assert_eq!(
            ticks[0].1,
            vec![("AAPL".to_string(), false), ("MSFT".to_string(), false)]
        );
        assert_eq!(sync.ticks_emitted(), 2);
    }

    #[test]
    fn test_forward_fill_missing_bar() {
        let mut feed = InMemoryFeed::from_bars(vec![
            bar("AAPL", 1, dec!(20)),
            bar("AAPL", 3, dec!(22)),
            bar("MSFT", 1, dec!(10)),
            bar("MSFT", 2, dec!(11)),
            bar("MSFT", 3, dec!(12)),
        ]);
        let mut sync = FeedSynchronizer::open(
            &mut feed,
            &[id("AAPL"), id("MSFT")],
            DateRange::unbounded(),
            &SyncConfig::default(),
        )
        .unwrap();

        let first = sync.next_tick().unwrap().unwrap();
        assert_eq!(first.len(), 2);
        let second = sync.next_tick().unwrap().unwrap();
        let aapl = &second[0];
        assert!(aapl.forward_filled);
        assert_eq!(aapl.close, dec!(20));
        assert_eq!(aapl.timestamp, 2);
        assert_eq!(
            sync.records(),
            &[FeedRecord {
                timestamp: 2,
                instrument: id("AAPL"),
                kind: FeedRecordKind::ForwardFilled
            }]
        );
    }

    #[test]
    fn test_skip_policy_per_instrument() {
        let mut feed = InMemoryFeed::from_bars(vec![
            bar("AAPL", 1, dec!(20)),
            bar("AAPL", 3, dec!(22)),
            bar("MSFT", 1, dec!(10)),
            bar("MSFT", 2, dec!(11)),
            bar("MSFT", 3, dec!(12)),
        ]);
        let mut config = SyncConfig::default();
        config.overrides.insert(id("AAPL"), MissingBarPolicy::Skip);
        let mut sync =
            FeedSynchronizer::open(&mut feed, &[id("AAPL"), id("MSFT")], DateRange::unbounded(), &config)
                .unwrap();

        let ticks = drain(&mut sync);
        assert_eq!(ticks[1].1, vec![("MSFT".to_string(), false)]);
        assert_eq!(sync.records()[0].kind, FeedRecordKind::Skipped);
        assert_eq!(sync.policies()[&id("AAPL")], MissingBarPolicy::Skip);
        assert_eq!(sync.policies()[&id("MSFT")], MissingBarPolicy::ForwardFill);
    }

    #[test]
    fn test_no_forward_fill_before_first_bar() {
        let mut feed = InMemoryFeed::from_bars(vec![
            bar("MSFT", 1, dec!(10)),
            bar("AAPL", 2, dec!(20)),
            bar("MSFT", 2, dec!(11)),
        ]);
        let mut sync = FeedSynchronizer::open(
            &mut feed,
            &[id("AAPL"), id("MSFT")],
            DateRange::unbounded(),
            &SyncConfig::default(),
        )
        .unwrap();
        let first = sync.next_tick().unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].instrument, id("MSFT"));
    }

    #[test]
    fn test_exhausted_feed_dropped_without_error() {
        let mut feed = InMemoryFeed::from_bars(vec![
            bar("AAPL", 1, dec!(20)),
            bar("MSFT", 1, dec!(10)),
            bar("MSFT", 2, dec!(11)),
            bar("MSFT", 3, dec!(12)),
        ]);
        let mut sync = FeedSynchronizer::open(
            &mut feed,
            &[id("AAPL"), id("MSFT")],
            DateRange::unbounded(),
            &SyncConfig::default(),
        )
        .unwrap();

        let ticks = drain(&mut sync);
        assert_eq!(ticks.len(), 3);
        // Exhausted stream is not forward-filled
        assert_eq!(ticks[2].1, vec![("MSFT".to_string(), false)]);
        assert_eq!(sync.active_instruments(), Vec::<InstrumentId>::new());
        assert!(sync
            .records()
            .iter()
            .any(|r| r.instrument == id("AAPL") && r.kind == FeedRecordKind::Exhausted));
    }

    #[test]
    fn test_stale_gap_fails() {
        let mut feed = InMemoryFeed::from_bars(vec![bar("AAPL", 100, dec!(20)), bar("AAPL", 500, dec!(21))]);
        let config = SyncConfig {
            staleness_window: Some(300),
            ..SyncConfig::default()
        };
        let mut sync =
            FeedSynchronizer::open(&mut feed, &[id("AAPL")], DateRange::unbounded(), &config).unwrap();
        assert!(sync.next_tick().unwrap().is_some());
        assert!(matches!(
            sync.next_tick(),
            Err(DataFeedError::Stale { last: 100, next: Some(500), window: 300 })
        ));
    }

    #[test]
    fn test_malformed_bar_aborts_by_default() {
        let mut feed = InMemoryFeed::from_bars(vec![
            bar("AAPL", 1, dec!(20)),
            bar("AAPL", 2, dec!(-1)),
        ]);
        let mut sync = FeedSynchronizer::open(
            &mut feed,
            &[id("AAPL")],
            DateRange::unbounded(),
            &SyncConfig::default(),
        )
        .unwrap();
        assert!(matches!(sync.next_tick(), Err(DataFeedError::Malformed { .. })));
    }

    #[test]
    fn test_skip_instrument_on_error() {
        let mut feed = InMemoryFeed::from_bars(vec![
            bar("AAPL", 1, dec!(20)),
            bar("AAPL", 0, dec!(20)),
            bar("MSFT", 1, dec!(10)),
            bar("MSFT", 2, dec!(11)),
        ]);
        let config = SyncConfig {
            on_error: FeedErrorPolicy::SkipInstrument,
            ..SyncConfig::default()
        };
        let mut sync = FeedSynchronizer::open(
            &mut feed,
            &[id("AAPL"), id("MSFT"), id("NFLX")],
            DateRange::unbounded(),
            &config,
        )
        .unwrap();

        let ticks = drain(&mut sync);
        assert_eq!(ticks.len(), 2);
        let dropped: Vec<_> = sync
            .records()
            .iter()
            .filter(|r| matches!(r.kind, FeedRecordKind::Dropped { .. }))
            .map(|r| r.instrument.to_string())
            .collect();
        assert_eq!(dropped, vec!["NFLX".to_string(), "AAPL".to_string()]);
    }

    #[test]
    fn test_no_data_is_error() {
        let mut feed = InMemoryFeed::from_bars(vec![bar("AAPL", 1, dec!(20))]);
        let result = FeedSynchronizer::open(
            &mut feed,
            &[id("AAPL")],
            DateRange::new(10, 20),
            &SyncConfig::default(),
        );
        assert!(matches!(result, Err(DataFeedError::NoData)));
    }
}
