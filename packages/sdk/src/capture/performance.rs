// packages/sdk/src/capture/performance.rs
//! Performance capture
//!
//! Navigation timing is read once from the timeline; paint and layout
//! metrics stream in through observers. CLS uses session windows: shifts
//! without recent input accumulate until a 1 s gap or a 5 s span starts a
//! new window, and the reported value is the largest window seen. FID is
//! measured on the first qualifying input only.

use crate::event::types::{PerformanceMetrics, PerformancePayload};
use crate::host::page::{ListenerId, ListenerOptions, Page};
use crate::host::timeline::PerformanceEntry;
use crate::utils::errors::{MonitorError, Result};
use crate::utils::ids::now_ms;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Gap that closes a CLS session window.
const CLS_SESSION_GAP_MS: f64 = 1_000.0;

/// Maximum span of one CLS session window.
const CLS_SESSION_SPAN_MS: f64 = 5_000.0;

/// Input kinds that qualify for first-input delay.
const FIRST_INPUT_KINDS: [&str; 4] = ["mousedown", "keydown", "touchstart", "pointerdown"];

/// Session-window CLS accumulator.
#[derive(Debug, Default)]
struct ClsTracker {
    session_value: f64,
    session_start: f64,
    last_entry: f64,
    max_value: f64,
    seen_any: bool,
}

impl ClsTracker {
    fn record(&mut self, value: f64, start_time: f64, had_recent_input: bool) {
        if had_recent_input {
            return;
        }

        let new_session = !self.seen_any
            || start_time - self.last_entry > CLS_SESSION_GAP_MS
            || start_time - self.session_start > CLS_SESSION_SPAN_MS;
        if new_session {
            self.session_value = 0.0;
            self.session_start = start_time;
        }

        self.seen_any = true;
        self.session_value += value;
        self.last_entry = start_time;
        if self.session_value > self.max_value {
            self.max_value = self.session_value;
        }
    }

    fn value(&self) -> Option<f64> {
        self.seen_any.then_some(self.max_value)
    }
}

#[derive(Default)]
struct Vitals {
    fcp: Option<f64>,
    lcp: Option<f64>,
    fid: Option<f64>,
    cls: ClsTracker,
}

/// Performance capture component.
pub struct PerformanceCapture {
    vitals: Mutex<Vitals>,
    custom: Mutex<HashMap<String, f64>>,
    observer_ids: Mutex<Vec<crate::host::timeline::ObserverId>>,
    listener_ids: Mutex<Vec<ListenerId>>,
    fid_measured: AtomicBool,
    installed: AtomicBool,
}

impl PerformanceCapture {
    pub fn new() -> Self {
        Self {
            vitals: Mutex::new(Vitals::default()),
            custom: Mutex::new(HashMap::new()),
            observer_ids: Mutex::new(Vec::new()),
            listener_ids: Mutex::new(Vec::new()),
            fid_measured: AtomicBool::new(false),
            installed: AtomicBool::new(false),
        }
    }

    /// Attach timeline observers and first-input listeners.
    pub fn install(self: &Arc<Self>, page: &Arc<Page>) -> Result<()> {
        if !page.capabilities().performance_observer {
            return Err(MonitorError::CaptureFailed(
                "performance observer unavailable".to_string(),
            ));
        }
        if self.installed.swap(true, Ordering::Relaxed) {
            warn!("performance capture already installed");
            return Ok(());
        }

        let timeline = page.timeline();
        let mut observer_ids = self.observer_ids.lock();

        let capture = Arc::downgrade(self);
        observer_ids.push(timeline.observe(
            &["paint"],
            Arc::new(move |entry| {
                let Some(capture) = capture.upgrade() else { return };
                if let PerformanceEntry::Paint { name, start_time } = entry {
                    if name == "first-contentful-paint" {
                        let mut vitals = capture.vitals.lock();
                        if vitals.fcp.is_none() {
                            vitals.fcp = Some(*start_time);
                        }
                    }
                }
            }),
        ));

        let capture = Arc::downgrade(self);
        observer_ids.push(timeline.observe(
            &["largest-contentful-paint"],
            Arc::new(move |entry| {
                let Some(capture) = capture.upgrade() else { return };
                if let PerformanceEntry::LargestContentfulPaint { start_time, .. } = entry {
                    // Later candidates supersede earlier ones
                    capture.vitals.lock().lcp = Some(*start_time);
                }
            }),
        ));

        let capture = Arc::downgrade(self);
        observer_ids.push(timeline.observe(
            &["layout-shift"],
            Arc::new(move |entry| {
                let Some(capture) = capture.upgrade() else { return };
                if let PerformanceEntry::LayoutShift {
                    value,
                    start_time,
                    had_recent_input,
                } = entry
                {
                    capture
                        .vitals
                        .lock()
                        .cls
                        .record(*value, *start_time, *had_recent_input);
                }
            }),
        ));
        drop(observer_ids);

        // First input delay: capture+once so the listeners self-remove
        let mut listener_ids = self.listener_ids.lock();
        for kind in FIRST_INPUT_KINDS {
            let capture = Arc::downgrade(self);
            listener_ids.push(page.add_listener(
                kind,
                ListenerOptions::capture_once(),
                Arc::new(move |event| {
                    let Some(capture) = capture.upgrade() else { return };
                    if capture.fid_measured.swap(true, Ordering::Relaxed) {
                        return;
                    }
                    let delay = now_ms().saturating_sub(event.timestamp) as f64;
                    capture.vitals.lock().fid = Some(delay);
                }),
            ));
        }
        drop(listener_ids);

        debug!("performance capture installed");
        Ok(())
    }

    /// Disconnect observers and remove any remaining input listeners.
    pub fn uninstall(&self, page: &Page) {
        if !self.installed.swap(false, Ordering::Relaxed) {
            return;
        }

        for id in self.listener_ids.lock().drain(..).rev() {
            page.remove_listener(id);
        }
        for id in self.observer_ids.lock().drain(..).rev() {
            page.timeline().disconnect(id);
        }
        debug!("performance capture uninstalled");
    }

    /// Place a named mark on the host timeline.
    pub fn mark(&self, page: &Page, name: &str) {
        page.timeline().mark(name);
    }

    /// Measure between marks and store the duration as a custom metric.
    pub fn measure(
        &self,
        page: &Page,
        name: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<f64> {
        let duration = page.timeline().measure(name, start, end)?;
        self.custom.lock().insert(name.to_string(), duration);
        Ok(duration)
    }

    /// Build the payload for one collection cycle.
    pub fn collect(&self, page: &Page) -> PerformancePayload {
        let timeline = page.timeline();
        let navigation = timeline.navigation();

        let (page_load_time, dom_ready_time, resource_load_time, ttfb) = match navigation {
            Some(nav) => (
                nav.load_event_end - nav.navigation_start,
                nav.dom_content_loaded_event_end - nav.navigation_start,
                nav.load_event_end - nav.dom_content_loaded_event_end,
                Some(nav.response_start - nav.request_start),
            ),
            None => (0.0, 0.0, 0.0, None),
        };

        let vitals = self.vitals.lock();
        let metrics = PerformanceMetrics {
            lcp: vitals.lcp,
            fid: vitals.fid,
            cls: vitals.cls.value(),
            fcp: vitals.fcp,
            ttfb,
            page_load_time,
            dom_ready_time,
            resource_load_time,
            custom_metrics: self.custom.lock().clone(),
        };

        PerformancePayload {
            metrics,
            resources: timeline.resources(),
        }
    }
}

impl Default for PerformanceCapture {
    fn default() -> Self {
        Self::new()
    }
}
