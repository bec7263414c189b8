//! Event Clock & Bus
//!
//! Holds simulated time and delivers events in one deterministic order.
//!
//! ```text
//!  publish(ts, payload) ──▶ ┌──────────────────────────────┐
//!   (seq assigned here)     │ min-heap keyed (ts, seq)     │
//!                           └──────────────┬───────────────┘
//!                                          │ advance()
//!                                          ▼
//!                     clock.now = ts ─▶ handlers for kind, in subscription order
//! ```
//!
//! Ties on timestamp are broken by sequence number (arrival order), never by
//! handler identity, so the dispatch order depends only on the published
//! stream.

use crate::core::{Order, PodId, Timestamp};
use crate::data::Bar;
use crate::execution::Fill;
use crate::pod::TradeIntent;
use crate::risk::RiskAlert;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use thiserror::Error;
use tracing::trace;

/// Discriminant of [`EventPayload`], used for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    MarketData,
    Signal,
    OrderSubmitted,
    Fill,
    RiskAlert,
    Tick,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EventPayload {
    MarketData(Bar),
    Signal { pod: PodId, intent: TradeIntent },
    OrderSubmitted(Order),
    Fill(Fill),
    RiskAlert(RiskAlert),
    /// End-of-tick boundary: all market data for the timestamp has been handled
    Tick,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::MarketData(_) => EventKind::MarketData,
            EventPayload::Signal { .. } => EventKind::Signal,
            EventPayload::OrderSubmitted(_) => EventKind::OrderSubmitted,
            EventPayload::Fill(_) => EventKind::Fill,
            EventPayload::RiskAlert(_) => EventKind::RiskAlert,
            EventPayload::Tick => EventKind::Tick,
        }
    }
}

/// Immutable once published
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub timestamp: Timestamp,
    pub sequence: u64,
    pub payload: EventPayload,
}

impl Event {
    #[inline]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("event at t={timestamp} published after the clock reached t={now}")]
    PastTimestamp { timestamp: Timestamp, now: Timestamp },
}

// Heap entry ordered so the smallest (timestamp, sequence) pops first.
struct Queued(Event);

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.0.timestamp, other.0.sequence).cmp(&(self.0.timestamp, self.0.sequence))
    }
}

pub type Handler = Box<dyn FnMut(&Event) + Send>;

struct Subscription {
    kind: Option<EventKind>,
    handler: Handler,
}

/// Priority queue of pending events plus the simulated clock
pub struct EventBus {
    queue: BinaryHeap<Queued>,
    subscriptions: Vec<Subscription>,
    next_sequence: u64,
    now: Timestamp,
    dispatched: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            subscriptions: Vec::new(),
            next_sequence: 0,
            now: 0,
            dispatched: 0,
        }
    }

    /// Register a handler for one event kind, invoked synchronously on dispatch
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.subscriptions.push(Subscription {
            kind: Some(kind),
            handler: Box::new(handler),
        });
    }

    /// Register a handler for every event kind
    pub fn subscribe_all<F>(&mut self, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.subscriptions.push(Subscription {
            kind: None,
            handler: Box::new(handler),
        });
    }

    /// Enqueue an event with a freshly assigned sequence number
    pub fn publish(
        &mut self,
        timestamp: Timestamp,
        payload: EventPayload,
    ) -> Result<u64, ClockError> {
        if timestamp < self.now {
            return Err(ClockError::PastTimestamp {
                timestamp,
                now: self.now,
            });
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(Queued(Event {
            timestamp,
            sequence,
            payload,
        }));
        Ok(sequence)
    }

    /// Pop the next event, move the clock to it and dispatch it
    ///
    /// The event is returned so the caller can act on it after subscribers
    /// have seen it.
    pub fn advance(&mut self) -> Option<Event> {
        let Queued(event) = self.queue.pop()?;
        self.now = event.timestamp;
        self.dispatched += 1;
        trace!(ts = event.timestamp, seq = event.sequence, kind = ?event.kind(), "dispatch");

        let kind = event.kind();
        for sub in self.subscriptions.iter_mut() {
            if sub.kind.map_or(true, |k| k == kind) {
                (sub.handler)(&event);
            }
        }
        Some(event)
    }

    /// Current simulated time
    #[inline]
    pub fn now(&self) -> Timestamp {
        self.now
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total events delivered so far
    #[inline]
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}
