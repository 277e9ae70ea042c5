// packages/sdk/src/host/page.rs
//! The observable page surface
//!
//! Everything the capture engine can see of the host page: URL and device
//! context, visibility, viewport, an event-target listener registry, the
//! global hook slots, the performance timeline, and the document tree.
//! The host embedding (or a test harness) drives this surface; the SDK
//! only observes it.

use crate::dom::Document;
use crate::event::envelope::DeviceInfo;
use crate::host::hooks::GlobalHooks;
use crate::host::timeline::PerformanceTimeline;
use crate::utils::ids::now_ms;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Page visibility state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Static page context supplied by the host.
#[derive(Debug, Clone)]
pub struct PageInfo {
    pub url: String,
    pub user_agent: String,
    pub device: DeviceInfo,
}

impl Default for PageInfo {
    fn default() -> Self {
        Self {
            url: "about:blank".to_string(),
            user_agent: String::new(),
            device: DeviceInfo::default(),
        }
    }
}

/// Which observer APIs the host exposes.
#[derive(Debug, Clone, Copy)]
pub struct HostCapabilities {
    pub mutation_observer: bool,
    pub intersection_observer: bool,
    pub performance_observer: bool,
    pub beacon: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            mutation_observer: true,
            intersection_observer: true,
            performance_observer: true,
            beacon: true,
        }
    }
}

/// Listener registration options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListenerOptions {
    pub capture: bool,
    pub passive: bool,
    pub once: bool,
}

impl ListenerOptions {
    pub fn capture() -> Self {
        Self {
            capture: true,
            ..Default::default()
        }
    }

    pub fn passive() -> Self {
        Self {
            passive: true,
            ..Default::default()
        }
    }

    pub fn capture_once() -> Self {
        Self {
            capture: true,
            once: true,
            passive: false,
        }
    }
}

/// Action-specific event detail.
#[derive(Debug, Clone)]
pub enum PageEventDetail {
    None,
    Pointer { x: i32, y: i32 },
    Scroll { x: i32, y: i32 },
    Input { value: String },
    Resize { width: u32, height: u32 },
    Visibility(Visibility),
    Navigation { url: String },
}

/// One event dispatched on the page surface.
#[derive(Debug, Clone)]
pub struct PageEvent {
    /// Event name ("click", "scroll", "visibilitychange", ...)
    pub kind: String,

    /// When the event occurred, host clock milliseconds
    pub timestamp: u64,

    /// The node the event targeted, when any
    pub target: Option<crate::dom::NodeId>,

    pub detail: PageEventDetail,
}

impl PageEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            timestamp: now_ms(),
            target: None,
            detail: PageEventDetail::None,
        }
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn on(mut self, target: crate::dom::NodeId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with(mut self, detail: PageEventDetail) -> Self {
        self.detail = detail;
        self
    }
}

pub type ListenerId = u64;
pub type PageListener = Arc<dyn Fn(&PageEvent) + Send + Sync>;

struct ListenerEntry {
    id: ListenerId,
    kind: String,
    options: ListenerOptions,
    callback: PageListener,
}

/// The page surface.
pub struct Page {
    url: Mutex<String>,
    user_agent: String,
    device: Mutex<DeviceInfo>,
    visibility: Mutex<Visibility>,
    listeners: Mutex<Vec<ListenerEntry>>,
    next_listener_id: AtomicU64,
    hooks: GlobalHooks,
    timeline: PerformanceTimeline,
    document: Document,
    capabilities: HostCapabilities,
}

impl Page {
    pub fn new(info: PageInfo) -> Arc<Self> {
        Self::with_capabilities(info, HostCapabilities::default())
    }

    pub fn with_capabilities(info: PageInfo, capabilities: HostCapabilities) -> Arc<Self> {
        let page = Arc::new(Self {
            url: Mutex::new(info.url),
            user_agent: info.user_agent,
            device: Mutex::new(info.device),
            visibility: Mutex::new(Visibility::Visible),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            hooks: GlobalHooks::new(),
            timeline: PerformanceTimeline::new(),
            document: Document::new(),
            capabilities,
        });

        // The host's own history methods update the address bar
        let weak = Arc::downgrade(&page);
        page.hooks.set_push_state(Arc::new(move |url| {
            if let Some(page) = weak.upgrade() {
                page.apply_url(url);
            }
        }));
        let weak = Arc::downgrade(&page);
        page.hooks.set_replace_state(Arc::new(move |url| {
            if let Some(page) = weak.upgrade() {
                page.apply_url(url);
            }
        }));

        page
    }

    // ---- context ----

    pub fn url(&self) -> String {
        self.url.lock().clone()
    }

    fn apply_url(&self, url: &str) {
        *self.url.lock() = url.to_string();
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.device.lock().clone()
    }

    pub fn viewport(&self) -> (u32, u32) {
        let device = self.device.lock();
        (
            device.viewport_width.unwrap_or(0),
            device.viewport_height.unwrap_or(0),
        )
    }

    pub fn visibility(&self) -> Visibility {
        *self.visibility.lock()
    }

    /// Host-driven visibility change; dispatches `visibilitychange`.
    pub fn set_visibility(&self, visibility: Visibility) {
        *self.visibility.lock() = visibility;
        self.dispatch(
            PageEvent::new("visibilitychange").with(PageEventDetail::Visibility(visibility)),
        );
    }

    /// Host-driven viewport change; dispatches `resize`.
    pub fn resize(&self, width: u32, height: u32) {
        {
            let mut device = self.device.lock();
            device.viewport_width = Some(width);
            device.viewport_height = Some(height);
        }
        self.dispatch(PageEvent::new("resize").with(PageEventDetail::Resize { width, height }));
    }

    // ---- history ----

    /// Invoke the (possibly wrapped) `pushState`.
    pub fn push_state(&self, url: &str) {
        self.hooks.dispatch_push_state(url);
    }

    /// Invoke the (possibly wrapped) `replaceState`.
    pub fn replace_state(&self, url: &str) {
        self.hooks.dispatch_replace_state(url);
    }

    // ---- listeners ----

    pub fn add_listener(
        &self,
        kind: impl Into<String>,
        options: ListenerOptions,
        callback: PageListener,
    ) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push(ListenerEntry {
            id,
            kind: kind.into(),
            options,
            callback,
        });
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        listeners.len() != before
    }

    /// Number of live listeners for `kind` (teardown assertions).
    pub fn listener_count(&self, kind: &str) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    /// Dispatch an event to all listeners of its kind.
    ///
    /// Capture-phase listeners run first; within a phase, registration
    /// order holds, so host listeners registered before the SDK's always
    /// see the event first. A panicking listener is isolated and does not
    /// disable the others.
    pub fn dispatch(&self, event: PageEvent) {
        let batch: Vec<(ListenerId, bool, PageListener)> = {
            let listeners = self.listeners.lock();
            let mut capture: Vec<&ListenerEntry> = Vec::new();
            let mut bubble: Vec<&ListenerEntry> = Vec::new();
            for entry in listeners.iter().filter(|e| e.kind == event.kind) {
                if entry.options.capture {
                    capture.push(entry);
                } else {
                    bubble.push(entry);
                }
            }
            capture
                .into_iter()
                .chain(bubble)
                .map(|e| (e.id, e.options.once, Arc::clone(&e.callback)))
                .collect()
        };

        for (id, once, callback) in batch {
            if once {
                self.remove_listener(id);
            }
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                warn!(kind = %event.kind, "listener panicked; isolating");
            }
        }
    }

    // ---- surfaces ----

    pub fn hooks(&self) -> &GlobalHooks {
        &self.hooks
    }

    pub fn timeline(&self) -> &PerformanceTimeline {
        &self.timeline
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }
}
