//! Market data: bars, the feed interface and the synchronizer that merges
//! per-instrument series into one ordered tick stream.

pub mod feed;
pub mod stale;
pub mod synchronizer;
pub mod types;
pub mod validator;

pub use feed::{BarStream, DataFeed, InMemoryFeed};
pub use stale::{FeedState, StalenessGuard};
pub use synchronizer::{
    FeedErrorPolicy, FeedRecord, FeedRecordKind, FeedSynchronizer, MissingBarPolicy, SyncConfig,
};
pub use types::Bar;
pub use validator::BarValidator;
