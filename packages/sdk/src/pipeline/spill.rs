// packages/sdk/src/pipeline/spill.rs
//! Persistent spill store for failed uploads
//!
//! Events whose batch exhausted its retries are parked here and replayed on
//! the next startup or when the network comes back. The store is bounded by
//! entry count and by serialized size; when full, the newest events win.

use crate::event::MonitorEvent;
use crate::runtime::storage::StorageHandle;
use crate::utils::errors::{MonitorError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key inside the persistent store.
pub const SPILL_KEY: &str = "failed_events";

/// Maximum parked events.
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

/// Maximum serialized size of the parked array (guards the storage quota).
pub const DEFAULT_MAX_BYTES: usize = 512 * 1024;

/// Failed-event park over the persistent key/value store.
pub struct SpillStore {
    store: Arc<StorageHandle>,
    max_entries: usize,
    max_bytes: usize,
}

impl SpillStore {
    pub fn new(store: Arc<StorageHandle>) -> Self {
        Self {
            store,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_limits(store: Arc<StorageHandle>, max_entries: usize, max_bytes: usize) -> Self {
        Self {
            store,
            max_entries,
            max_bytes,
        }
    }

    /// Append `events`, trimming oldest entries to stay within both bounds.
    pub fn append(&self, events: &[MonitorEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut parked = self.load()?;
        parked.extend(events.iter().cloned());

        if parked.len() > self.max_entries {
            let excess = parked.len() - self.max_entries;
            parked.drain(..excess);
            warn!(dropped = excess, "spill store full, dropped oldest entries");
        }

        let mut serialized = serde_json::to_string(&parked)
            .map_err(|e| MonitorError::SerializationFailed(e.to_string()))?;

        // Trim oldest until the serialized array fits the byte budget.
        while serialized.len() > self.max_bytes && !parked.is_empty() {
            parked.remove(0);
            serialized = serde_json::to_string(&parked)
                .map_err(|e| MonitorError::SerializationFailed(e.to_string()))?;
        }

        self.store.set(SPILL_KEY, &serialized);
        debug!(parked = parked.len(), "events spilled to persistent store");
        Ok(())
    }

    /// All parked events, oldest first.
    pub fn load(&self) -> Result<Vec<MonitorEvent>> {
        match self.store.get(SPILL_KEY) {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                // A corrupt entry would wedge the store forever; discard it.
                warn!(error = %e, "discarding unreadable spill entry");
                self.store.remove(SPILL_KEY);
                MonitorError::SerializationFailed(e.to_string())
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Number of parked events.
    pub fn len(&self) -> usize {
        self.load().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty the store after a successful replay.
    pub fn clear(&self) {
        self.store.remove(SPILL_KEY);
    }
}
