// packages/sdk/src/runtime/bus.rs
//! Named event bus
//!
//! Subscribe/unsubscribe/emit for lifecycle notifications (`start`,
//! `stop`) and per-event `track` fan-out. Handlers are isolated: one
//! panicking subscriber never disables the others.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

pub type BusHandler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Subscription handle returned by `on`; pass to `off` to unsubscribe.
pub type SubscriptionId = u64;

/// Minimal named event bus.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<(SubscriptionId, BusHandler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `event`; returns a handle for `off`.
    pub fn on(&self, event: &str, handler: BusHandler) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.handlers
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Unsubscribe one handler, or all handlers for `event` when `None`.
    pub fn off(&self, event: &str, subscription: Option<SubscriptionId>) {
        let mut handlers = self.handlers.lock();
        match subscription {
            Some(id) => {
                if let Some(list) = handlers.get_mut(event) {
                    list.retain(|(i, _)| *i != id);
                }
            }
            None => {
                handlers.remove(event);
            }
        }
    }

    /// Emit `event` to all subscribers, in subscription order.
    pub fn emit(&self, event: &str, payload: &serde_json::Value) {
        let batch: Vec<BusHandler> = self
            .handlers
            .lock()
            .get(event)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in batch {
            if catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
                warn!(event, "bus subscriber panicked; isolating");
            }
        }
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .get(event)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}
