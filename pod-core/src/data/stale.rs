//! Staleness guard for the merged feed
//!
//! Tracks the last emitted timestamp and refuses a next timestamp further
//! ahead than the configured window. A jump that large signals missing or
//! corrupted source data rather than a normal gap between bars.

use crate::core::{DataFeedError, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// Nothing emitted yet
    Idle,
    Fresh,
    Stale,
}

#[derive(Debug, Clone)]
pub struct StalenessGuard {
    /// Maximum simulated seconds between consecutive ticks; `None` disables
    window: Option<u64>,
    last_emitted: Option<Timestamp>,
    state: FeedState,
}

impl StalenessGuard {
    pub fn new(window: Option<u64>) -> Self {
        Self {
            window,
            last_emitted: None,
            state: FeedState::Idle,
        }
    }

    /// Check that `next` is within the window of the last emitted tick
    pub fn check(&mut self, next: Timestamp) -> Result<(), DataFeedError> {
        let (Some(window), Some(last)) = (self.window, self.last_emitted) else {
            return Ok(());
        };
        if next.saturating_sub(last) > window {
            self.state = FeedState::Stale;
            return Err(DataFeedError::Stale {
                last,
                next: Some(next),
                window,
            });
        }
        Ok(())
    }

    pub fn mark_emitted(&mut self, ts: Timestamp) {
        self.last_emitted = Some(ts);
        self.state = FeedState::Fresh;
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn last_emitted(&self) -> Option<Timestamp> {
        self.last_emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let guard = StalenessGuard::new(Some(10));
        assert_eq!(guard.state(), FeedState::Idle);
        assert_eq!(guard.last_emitted(), None);
    }

    #[test]
    fn test_first_tick_never_stale() {
        let mut guard = StalenessGuard::new(Some(10));
        assert!(guard.check(1_000_000).is_ok());
    }

    #[test]
    fn test_gap_within_window_ok() {
        let mut guard = StalenessGuard::new(Some(10));
        guard.mark_emitted(100);
        assert!(guard.check(110).is_ok());
        guard.mark_emitted(110);
        assert_eq!(guard.state(), FeedState::Fresh);
    }

    #[test]
    fn test_gap_beyond_window_is_stale() {
        let mut guard = StalenessGuard::new(Some(10));
        guard.mark_emitted(100);
        let err = guard.check(111).unwrap_err();
        assert_eq!(
            err,
            DataFeedError::Stale {
                last: 100,
                next: Some(111),
                window: 10
            }
        );
        assert_eq!(guard.state(), FeedState::Stale);
    }

    #[test]
    fn test_unbounded_window() {
        let mut guard = StalenessGuard::new(None);
        guard.mark_emitted(0);
        assert!(guard.check(u64::MAX).is_ok());
    }
}
