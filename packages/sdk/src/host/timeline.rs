// packages/sdk/src/host/timeline.rs
//! Performance timeline
//!
//! Buffered performance entries plus observer streams, mirroring the
//! host's timing surface. Observers receive already-buffered entries of
//! their types on registration, then every future entry.

use crate::event::types::ResourceTiming;
use crate::utils::errors::{MonitorError, Result};
use crate::utils::ids::now_ms;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Navigation timing, all values in milliseconds relative to time origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigationTiming {
    pub navigation_start: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub dom_content_loaded_event_end: f64,
    pub load_event_end: f64,
}

/// One performance timeline entry.
#[derive(Debug, Clone)]
pub enum PerformanceEntry {
    Navigation(NavigationTiming),
    Paint {
        name: String,
        start_time: f64,
    },
    LargestContentfulPaint {
        start_time: f64,
        size: u64,
    },
    LayoutShift {
        value: f64,
        start_time: f64,
        had_recent_input: bool,
    },
    Resource(ResourceTiming),
    Mark {
        name: String,
        start_time: f64,
    },
    Measure {
        name: String,
        start_time: f64,
        duration: f64,
    },
}

impl PerformanceEntry {
    pub fn entry_type(&self) -> &'static str {
        match self {
            PerformanceEntry::Navigation(_) => "navigation",
            PerformanceEntry::Paint { .. } => "paint",
            PerformanceEntry::LargestContentfulPaint { .. } => "largest-contentful-paint",
            PerformanceEntry::LayoutShift { .. } => "layout-shift",
            PerformanceEntry::Resource(_) => "resource",
            PerformanceEntry::Mark { .. } => "mark",
            PerformanceEntry::Measure { .. } => "measure",
        }
    }
}

pub type EntryCallback = Arc<dyn Fn(&PerformanceEntry) + Send + Sync>;

/// Observer handle.
pub type ObserverId = u64;

/// The buffered, observable timing surface.
pub struct PerformanceTimeline {
    entries: Mutex<Vec<PerformanceEntry>>,
    observers: Mutex<Vec<(ObserverId, Vec<String>, EntryCallback)>>,
    next_id: AtomicU64,
    origin_ms: u64,
}

impl PerformanceTimeline {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            origin_ms: now_ms(),
        }
    }

    /// Milliseconds since the timeline's origin.
    pub fn elapsed(&self) -> f64 {
        now_ms().saturating_sub(self.origin_ms) as f64
    }

    /// Append an entry and notify matching observers.
    pub fn emit(&self, entry: PerformanceEntry) {
        self.entries.lock().push(entry.clone());

        let matching: Vec<EntryCallback> = self
            .observers
            .lock()
            .iter()
            .filter(|(_, types, _)| types.iter().any(|t| t == entry.entry_type()))
            .map(|(_, _, cb)| Arc::clone(cb))
            .collect();

        for callback in matching {
            callback(&entry);
        }
    }

    /// Register an observer for the given entry types.
    ///
    /// Buffered entries of those types are delivered immediately, in order.
    pub fn observe(&self, entry_types: &[&str], callback: EntryCallback) -> ObserverId {
        let types: Vec<String> = entry_types.iter().map(|t| t.to_string()).collect();

        let buffered: Vec<PerformanceEntry> = self
            .entries
            .lock()
            .iter()
            .filter(|e| types.iter().any(|t| t == e.entry_type()))
            .cloned()
            .collect();

        for entry in &buffered {
            callback(entry);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, types, callback));
        id
    }

    pub fn disconnect(&self, id: ObserverId) {
        self.observers.lock().retain(|(i, _, _)| *i != id);
    }

    pub fn entries_by_type(&self, entry_type: &str) -> Vec<PerformanceEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.entry_type() == entry_type)
            .cloned()
            .collect()
    }

    /// The navigation entry, when the host has published one.
    pub fn navigation(&self) -> Option<NavigationTiming> {
        self.entries.lock().iter().find_map(|e| match e {
            PerformanceEntry::Navigation(timing) => Some(*timing),
            _ => None,
        })
    }

    /// Resource entries, in emission order.
    pub fn resources(&self) -> Vec<ResourceTiming> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                PerformanceEntry::Resource(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Place a named mark at the current time.
    pub fn mark(&self, name: &str) -> f64 {
        let start_time = self.elapsed();
        self.emit(PerformanceEntry::Mark {
            name: name.to_string(),
            start_time,
        });
        start_time
    }

    fn mark_time(&self, name: &str) -> Option<f64> {
        self.entries.lock().iter().rev().find_map(|e| match e {
            PerformanceEntry::Mark { name: n, start_time } if n == name => Some(*start_time),
            _ => None,
        })
    }

    /// Measure between two marks (start defaults to the origin, end to now).
    pub fn measure(&self, name: &str, start: Option<&str>, end: Option<&str>) -> Result<f64> {
        let start_time = match start {
            Some(mark) => self
                .mark_time(mark)
                .ok_or_else(|| MonitorError::CaptureFailed(format!("unknown mark: {}", mark)))?,
            None => 0.0,
        };
        let end_time = match end {
            Some(mark) => self
                .mark_time(mark)
                .ok_or_else(|| MonitorError::CaptureFailed(format!("unknown mark: {}", mark)))?,
            None => self.elapsed(),
        };

        let duration = end_time - start_time;
        self.emit(PerformanceEntry::Measure {
            name: name.to_string(),
            start_time,
            duration,
        });
        Ok(duration)
    }
}

impl Default for PerformanceTimeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_receives_buffered_then_live() {
        let timeline = PerformanceTimeline::new();
        timeline.emit(PerformanceEntry::Paint {
            name: "first-paint".to_string(),
            start_time: 100.0,
        });

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        timeline.observe(
            &["paint"],
            Arc::new(move |entry| {
                if let PerformanceEntry::Paint { name, .. } = entry {
                    sink.lock().push(name.clone());
                }
            }),
        );

        timeline.emit(PerformanceEntry::Paint {
            name: "first-contentful-paint".to_string(),
            start_time: 180.0,
        });

        assert_eq!(*seen.lock(), vec!["first-paint", "first-contentful-paint"]);
    }

    #[test]
    fn test_observer_type_filter() {
        let timeline = PerformanceTimeline::new();
        let count: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        timeline.observe(&["layout-shift"], Arc::new(move |_| *sink.lock() += 1));

        timeline.emit(PerformanceEntry::Paint {
            name: "first-paint".to_string(),
            start_time: 10.0,
        });
        timeline.emit(PerformanceEntry::LayoutShift {
            value: 0.1,
            start_time: 20.0,
            had_recent_input: false,
        });

        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_disconnect() {
        let timeline = PerformanceTimeline::new();
        let count: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        let id = timeline.observe(&["paint"], Arc::new(move |_| *sink.lock() += 1));
        timeline.disconnect(id);

        timeline.emit(PerformanceEntry::Paint {
            name: "first-paint".to_string(),
            start_time: 10.0,
        });
        assert_eq!(*count.lock(), 0);
    }

    #[test]
    fn test_mark_and_measure() {
        let timeline = PerformanceTimeline::new();
        timeline.mark("task:start");
        timeline.mark("task:end");

        let duration = timeline
            .measure("task", Some("task:start"), Some("task:end"))
            .unwrap();
        assert!(duration >= 0.0);

        assert!(timeline.measure("bad", Some("missing"), None).is_err());
        assert_eq!(timeline.entries_by_type("measure").len(), 1);
    }

    #[test]
    fn test_navigation_lookup() {
        let timeline = PerformanceTimeline::new();
        assert!(timeline.navigation().is_none());

        timeline.emit(PerformanceEntry::Navigation(NavigationTiming {
            navigation_start: 0.0,
            request_start: 10.0,
            response_start: 90.0,
            dom_content_loaded_event_end: 800.0,
            load_event_end: 1_500.0,
        }));

        let nav = timeline.navigation().unwrap();
        assert_eq!(nav.load_event_end, 1_500.0);
    }
}
