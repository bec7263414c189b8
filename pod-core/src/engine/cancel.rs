//! External stop control for a running simulation
//!
//! ```no_run
//! use pod_core::engine::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let remote = token.clone();
//! std::thread::spawn(move || remote.cancel("operator request"));
//! ```
//!
//! The run loop checks the token between ticks only, so a cancelled run
//! always stops on a tick boundary.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Cloneable stop flag shared between the run loop and a controller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop at the next tick boundary
    ///
    /// Only the first reason is kept.
    pub fn cancel(&self, reason: &str) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            *self.reason.lock() = Some(reason.to_string());
            warn!(reason, "Cancellation requested");
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}
