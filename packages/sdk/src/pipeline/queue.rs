// packages/sdk/src/pipeline/queue.rs
//! Bounded event queue
//!
//! The single shared store between capture and delivery: a FIFO with a hard
//! capacity. Overflow evicts the oldest pending event (freshness wins, for
//! all kinds equally) and counts as a warning, not an error.

use crate::event::MonitorEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 1_000;

/// Bounded FIFO of events pending delivery.
pub struct EventQueue {
    inner: Mutex<VecDeque<MonitorEvent>>,

    capacity: usize,

    /// Total events accepted
    enqueue_count: AtomicU64,

    /// Total events evicted by overflow
    drop_count: AtomicU64,
}

impl EventQueue {
    /// Create a queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity,
            enqueue_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
        }
    }

    /// Append an event; evicts the head first when full.
    pub fn enqueue(&self, event: MonitorEvent) {
        let mut inner = self.inner.lock();
        if inner.len() >= self.capacity {
            inner.pop_front();
            self.drop_count.fetch_add(1, Ordering::Relaxed);
            warn!(capacity = self.capacity, "event queue full, dropped oldest event");
        }
        inner.push_back(event);
        self.enqueue_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove and return the first `limit` events (all when `None`).
    pub fn drain(&self, limit: Option<usize>) -> Vec<MonitorEvent> {
        let mut inner = self.inner.lock();
        let n = limit.unwrap_or(inner.len()).min(inner.len());
        inner.drain(..n).collect()
    }

    /// Copy of the pending events, oldest first. Side-effect free.
    pub fn snapshot(&self) -> Vec<MonitorEvent> {
        self.inner.lock().iter().cloned().collect()
    }

    /// Number of pending events.
    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue statistics.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueue_count: self.enqueue_count.load(Ordering::Relaxed),
            drop_count: self.drop_count.load(Ordering::Relaxed),
            current_size: self.size(),
            capacity: self.capacity,
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Queue statistics.
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub enqueue_count: u64,
    pub drop_count: u64,
    pub current_size: usize,
    pub capacity: usize,
}
