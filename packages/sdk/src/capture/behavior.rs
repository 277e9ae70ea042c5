// packages/sdk/src/capture/behavior.rs
//! Behavior capture
//!
//! Interaction listeners with per-action rate gates, CSS-path target
//! encoding, and input masking. History's push/replace methods are wrapped
//! so client-side navigations surface as navigate events; wraps and
//! listeners are reverted on stop.

use crate::capture::throttle::{Debounce, Throttle};
use crate::dom::{css_path, matches_any};
use crate::event::types::{BehaviorAction, BehaviorPayload, Coordinates};
use crate::host::page::{ListenerId, ListenerOptions, Page, PageEvent, PageEventDetail, Visibility};
use crate::utils::config::PrivacyConfig;
use crate::utils::errors::Result;
use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Capture-side buffer capacity per session.
pub const DEFAULT_MAX_BUFFERED: usize = 500;

/// Input types that are always masked.
const SENSITIVE_INPUT_TYPES: [&str; 5] = ["password", "email", "tel", "credit-card", "ssn"];

/// Name/id substrings that mark an input as sensitive.
const SENSITIVE_NAME_PARTS: [&str; 10] = [
    "password", "pass", "pwd", "email", "phone", "tel", "credit", "card", "ssn", "social",
];

/// The masked-value literal.
pub const MASKED_VALUE: &str = "[MASKED]";

/// Behavior capture tunables.
#[derive(Debug, Clone)]
pub struct BehaviorConfig {
    pub max_buffered: usize,

    /// Opt-in mouse movement sampling
    pub track_mouse_moves: bool,

    pub scroll_throttle_ms: u64,

    pub input_debounce_ms: u64,

    pub mousemove_throttle_ms: u64,

    pub resize_throttle_ms: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            max_buffered: DEFAULT_MAX_BUFFERED,
            track_mouse_moves: false,
            scroll_throttle_ms: 250,
            input_debounce_ms: 500,
            mousemove_throttle_ms: 100,
            resize_throttle_ms: 250,
        }
    }
}

/// A captured interaction waiting for admission.
#[derive(Debug, Clone)]
pub struct PendingBehavior {
    pub timestamp: u64,
    pub payload: BehaviorPayload,
}

struct Gates {
    scroll: Throttle,
    mousemove: Throttle,
    resize: Throttle,
    input: Debounce<PendingBehavior>,
}

#[derive(Default)]
struct Installed {
    listeners: Vec<ListenerId>,
    history_wrapped: bool,
}

/// Behavior capture component.
pub struct BehaviorCapture {
    config: BehaviorConfig,
    privacy: PrivacyConfig,
    buffer: ArrayQueue<PendingBehavior>,
    dropped: AtomicU64,
    gates: Mutex<Gates>,
    installed: Mutex<Installed>,
    notifier: Mutex<Option<crate::capture::errors::ActivityNotifier>>,
    active: AtomicBool,
}

impl BehaviorCapture {
    pub fn new(config: BehaviorConfig, privacy: PrivacyConfig) -> Self {
        let buffer = ArrayQueue::new(config.max_buffered.max(1));
        let gates = Gates {
            scroll: Throttle::new(config.scroll_throttle_ms),
            mousemove: Throttle::new(config.mousemove_throttle_ms),
            resize: Throttle::new(config.resize_throttle_ms),
            input: Debounce::new(config.input_debounce_ms),
        };
        Self {
            config,
            privacy,
            buffer,
            dropped: AtomicU64::new(0),
            gates: Mutex::new(gates),
            installed: Mutex::new(Installed::default()),
            notifier: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    /// Register the orchestrator's wake-up callback.
    pub fn set_notifier(&self, notifier: crate::capture::errors::ActivityNotifier) {
        *self.notifier.lock() = Some(notifier);
    }

    /// Install interaction listeners and history wraps on `page`.
    pub fn install(self: &Arc<Self>, page: &Arc<Page>) -> Result<()> {
        let mut installed = self.installed.lock();
        if self.active.swap(true, Ordering::Relaxed) {
            warn!("behavior capture already installed");
            return Ok(());
        }

        let mut kinds: Vec<(&str, ListenerOptions)> = vec![
            ("click", ListenerOptions::passive()),
            ("scroll", ListenerOptions::passive()),
            ("input", ListenerOptions::capture()),
            ("change", ListenerOptions::capture()),
            // focus and blur do not bubble; observe the capture phase
            ("focus", ListenerOptions::capture()),
            ("blur", ListenerOptions::capture()),
            ("visibilitychange", ListenerOptions::passive()),
            ("resize", ListenerOptions::passive()),
            ("popstate", ListenerOptions::passive()),
        ];
        if self.config.track_mouse_moves {
            kinds.push(("mousemove", ListenerOptions::passive()));
        }

        for (kind, options) in kinds {
            let capture = Arc::downgrade(self);
            let weak_page = Arc::downgrade(page);
            installed.listeners.push(page.add_listener(
                kind,
                options,
                Arc::new(move |event| {
                    if let (Some(capture), Some(page)) = (capture.upgrade(), weak_page.upgrade()) {
                        capture.on_page_event(&page, event);
                    }
                }),
            ));
        }

        // Client-side navigations: emit first, then delegate to the saved
        // original so the address bar still updates
        let hooks = page.hooks();
        let capture = Arc::downgrade(self);
        hooks.wrap_push_state(move |prior| {
            Arc::new(move |url: &str| {
                if let Some(capture) = capture.upgrade() {
                    capture.record_navigation(url);
                }
                if let Some(prior) = &prior {
                    prior(url);
                }
            })
        });
        let capture = Arc::downgrade(self);
        hooks.wrap_replace_state(move |prior| {
            Arc::new(move |url: &str| {
                if let Some(capture) = capture.upgrade() {
                    capture.record_navigation(url);
                }
                if let Some(prior) = &prior {
                    prior(url);
                }
            })
        });
        installed.history_wrapped = true;

        debug!("behavior capture installed");
        Ok(())
    }

    /// Remove listeners (reverse registration order) and restore wraps.
    pub fn uninstall(&self, page: &Page) {
        let mut installed = self.installed.lock();
        if !self.active.swap(false, Ordering::Relaxed) {
            return;
        }

        if installed.history_wrapped {
            page.hooks().restore_replace_state();
            page.hooks().restore_push_state();
            installed.history_wrapped = false;
        }
        for id in installed.listeners.drain(..).rev() {
            page.remove_listener(id);
        }
        debug!("behavior capture uninstalled");
    }

    // ---- event handling ----

    fn on_page_event(&self, page: &Page, event: &PageEvent) {
        match event.kind.as_str() {
            "click" => self.on_click(page, event),
            "scroll" => self.on_scroll(event),
            "input" => self.on_input(page, event),
            "change" => self.on_change(page, event),
            "focus" => self.on_focus_blur(page, event, BehaviorAction::Focus),
            "blur" => self.on_focus_blur(page, event, BehaviorAction::Blur),
            "visibilitychange" => self.on_visibility(event),
            "resize" => self.on_resize(event),
            "popstate" => self.on_popstate(page, event),
            "mousemove" => self.on_mousemove(page, event),
            _ => {}
        }
    }

    fn target_path(&self, page: &Page, event: &PageEvent) -> Option<String> {
        let target = event.target?;
        let doc = page.document();
        if !self.privacy.blocked_elements.is_empty()
            && matches_any(doc, target, &self.privacy.blocked_elements)
        {
            return None;
        }
        css_path(doc, target)
    }

    fn blocked(&self, page: &Page, event: &PageEvent) -> bool {
        match event.target {
            Some(target) if !self.privacy.blocked_elements.is_empty() => {
                matches_any(page.document(), target, &self.privacy.blocked_elements)
            }
            _ => false,
        }
    }

    fn on_click(&self, page: &Page, event: &PageEvent) {
        if self.blocked(page, event) {
            return;
        }
        let coordinates = match event.detail {
            PageEventDetail::Pointer { x, y } => Some(Coordinates { x, y }),
            _ => None,
        };
        self.push(PendingBehavior {
            timestamp: event.timestamp,
            payload: BehaviorPayload {
                action: BehaviorAction::Click,
                target: self.target_path(page, event),
                value: None,
                coordinates,
                duration: None,
                context: None,
            },
        });
    }

    fn on_scroll(&self, event: &PageEvent) {
        if !self.gates.lock().scroll.allow(event.timestamp) {
            return;
        }
        let value = match event.detail {
            PageEventDetail::Scroll { x, y } => Some(serde_json::json!({ "x": x, "y": y })),
            _ => None,
        };
        self.push(PendingBehavior {
            timestamp: event.timestamp,
            payload: BehaviorPayload {
                action: BehaviorAction::Scroll,
                target: None,
                value,
                coordinates: None,
                duration: None,
                context: None,
            },
        });
    }

    fn input_payload(&self, page: &Page, event: &PageEvent, action: BehaviorAction) -> Option<PendingBehavior> {
        if self.blocked(page, event) {
            return None;
        }
        let PageEventDetail::Input { ref value } = event.detail else {
            return None;
        };

        let masked = match event.target {
            Some(target) if self.is_sensitive_input(page, target) => {
                serde_json::Value::String(MASKED_VALUE.to_string())
            }
            // Raw text never leaves the page; summaries only
            _ => serde_json::json!({
                "length": value.chars().count(),
                "isEmpty": value.is_empty(),
                "hasValue": !value.is_empty(),
            }),
        };

        Some(PendingBehavior {
            timestamp: event.timestamp,
            payload: BehaviorPayload {
                action,
                target: self.target_path(page, event),
                value: Some(masked),
                coordinates: None,
                duration: None,
                context: None,
            },
        })
    }

    fn on_input(&self, page: &Page, event: &PageEvent) {
        let Some(pending) = self.input_payload(page, event, BehaviorAction::Input) else {
            return;
        };
        if let Some(released) = self.gates.lock().input.push(event.timestamp, pending) {
            self.push(released);
        }
    }

    fn on_change(&self, page: &Page, event: &PageEvent) {
        if let Some(pending) = self.input_payload(page, event, BehaviorAction::Change) {
            self.push(pending);
        }
    }

    fn on_focus_blur(&self, page: &Page, event: &PageEvent, action: BehaviorAction) {
        if self.blocked(page, event) {
            return;
        }
        self.push(PendingBehavior {
            timestamp: event.timestamp,
            payload: BehaviorPayload {
                action,
                target: self.target_path(page, event),
                value: None,
                coordinates: None,
                duration: None,
                context: None,
            },
        });
    }

    fn on_visibility(&self, event: &PageEvent) {
        let state = match event.detail {
            PageEventDetail::Visibility(Visibility::Hidden) => "hidden",
            _ => "visible",
        };
        self.push(PendingBehavior {
            timestamp: event.timestamp,
            payload: BehaviorPayload {
                action: BehaviorAction::Visibility,
                target: None,
                value: Some(serde_json::Value::String(state.to_string())),
                coordinates: None,
                duration: None,
                context: None,
            },
        });
    }

    fn on_resize(&self, event: &PageEvent) {
        if !self.gates.lock().resize.allow(event.timestamp) {
            return;
        }
        let value = match event.detail {
            PageEventDetail::Resize { width, height } => {
                Some(serde_json::json!({ "width": width, "height": height }))
            }
            _ => None,
        };
        self.push(PendingBehavior {
            timestamp: event.timestamp,
            payload: BehaviorPayload {
                action: BehaviorAction::Resize,
                target: None,
                value,
                coordinates: None,
                duration: None,
                context: None,
            },
        });
    }

    fn on_popstate(&self, page: &Page, event: &PageEvent) {
        let url = match &event.detail {
            PageEventDetail::Navigation { url } => url.clone(),
            _ => page.url(),
        };
        self.record_navigation(&url);
    }

    fn on_mousemove(&self, page: &Page, event: &PageEvent) {
        if !self.gates.lock().mousemove.allow(event.timestamp) {
            return;
        }
        let coordinates = match event.detail {
            PageEventDetail::Pointer { x, y } => Some(Coordinates { x, y }),
            _ => None,
        };
        self.push(PendingBehavior {
            timestamp: event.timestamp,
            payload: BehaviorPayload {
                action: BehaviorAction::Custom,
                target: self.target_path(page, event),
                value: Some(serde_json::Value::String("mousemove".to_string())),
                coordinates,
                duration: None,
                context: None,
            },
        });
    }

    /// Record a client-side navigation to `url`.
    fn record_navigation(&self, url: &str) {
        let (path, search, hash) = url_parts(url);
        self.push(PendingBehavior {
            timestamp: crate::utils::ids::now_ms(),
            payload: BehaviorPayload {
                action: BehaviorAction::Navigate,
                target: None,
                value: Some(serde_json::json!({
                    "url": url,
                    "path": path,
                    "search": search,
                    "hash": hash,
                })),
                coordinates: None,
                duration: None,
                context: None,
            },
        });
    }

    /// Record an application-defined event (`track`).
    pub fn track_custom(&self, name: &str, properties: Option<serde_json::Value>) {
        self.push(PendingBehavior {
            timestamp: crate::utils::ids::now_ms(),
            payload: BehaviorPayload {
                action: BehaviorAction::Custom,
                target: None,
                value: Some(serde_json::json!({
                    "name": name,
                    "properties": properties.unwrap_or(serde_json::Value::Null),
                })),
                coordinates: None,
                duration: None,
                context: None,
            },
        });
    }

    fn is_sensitive_input(&self, page: &Page, target: crate::dom::NodeId) -> bool {
        if !self.privacy.mask_sensitive_data {
            return false;
        }
        let doc = page.document();

        if let Some(input_type) = doc.attribute(target, "type") {
            if SENSITIVE_INPUT_TYPES.contains(&input_type.to_lowercase().as_str()) {
                return true;
            }
        }

        for attr in ["name", "id"] {
            if let Some(value) = doc.attribute(target, attr) {
                let lowered = value.to_lowercase();
                if SENSITIVE_NAME_PARTS.iter().any(|part| lowered.contains(part)) {
                    return true;
                }
            }
        }
        false
    }

    fn push(&self, pending: PendingBehavior) {
        if let Err(pending) = self.buffer.push(pending) {
            let _ = self.buffer.pop();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("behavior buffer full, dropped oldest");
            let _ = self.buffer.push(pending);
        }

        let notifier = self.notifier.lock().clone();
        if let Some(notifier) = notifier {
            notifier();
        }
    }

    /// Take everything buffered, releasing any input whose debounce quiet
    /// period has elapsed by `now_ms`.
    pub fn drain_pending(&self, now_ms: u64) -> Vec<PendingBehavior> {
        if let Some(released) = self.gates.lock().input.poll(now_ms) {
            self.push(released);
        }

        let mut drained = Vec::new();
        while let Some(pending) = self.buffer.pop() {
            drained.push(pending);
        }
        drained
    }

    /// Release the held debounce value unconditionally (teardown/unload).
    pub fn flush_gates(&self) {
        if let Some(released) = self.gates.lock().input.flush() {
            self.push(released);
        }
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer.len()
    }
}

/// Split a URL into path, search, and hash parts.
fn url_parts(url: &str) -> (String, String, String) {
    let after_scheme = match url.find("://") {
        Some(at) => &url[at + 3..],
        None => url,
    };
    let rest = match after_scheme.find('/') {
        Some(at) => &after_scheme[at..],
        None => "/",
    };

    let (rest, hash) = match rest.split_once('#') {
        Some((r, h)) => (r, format!("#{}", h)),
        None => (rest, String::new()),
    };
    let (path, search) = match rest.split_once('?') {
        Some((p, s)) => (p.to_string(), format!("?{}", s)),
        None => (rest.to_string(), String::new()),
    };

    (path, search, hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeId;
    use crate::host::page::PageInfo;

    fn page_with_input(input_type: &str, name: &str) -> (Arc<Page>, NodeId) {
        let page = Page::new(PageInfo::default());
        let doc = page.document();
        let html = doc.create_element("html");
        doc.set_root(html);
        let input = doc.create_element("input");
        doc.set_attribute(input, "type", input_type);
        doc.set_attribute(input, "name", name);
        doc.append_child(html, input);
        (page, input)
    }

    fn capture() -> Arc<BehaviorCapture> {
        Arc::new(BehaviorCapture::new(
            BehaviorConfig::default(),
            PrivacyConfig::default(),
        ))
    }

    #[test]
    fn test_url_parts() {
        let (path, search, hash) = url_parts("https://app.example/cart?step=2#review");
        assert_eq!(path, "/cart");
        assert_eq!(search, "?step=2");
        assert_eq!(hash, "#review");

        let (path, search, hash) = url_parts("https://app.example");
        assert_eq!(path, "/");
        assert!(search.is_empty());
        assert!(hash.is_empty());
    }

    #[tokio::test]
    async fn test_password_input_always_masked() {
        let (page, input) = page_with_input("password", "login");
        let capture = capture();
        capture.install(&page).unwrap();

        page.dispatch(
            PageEvent::new("input")
                .on(input)
                .with(PageEventDetail::Input {
                    value: "hunter2".to_string(),
                }),
        );
        capture.flush_gates();

        let pending = capture.drain_pending(0);
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].payload.value,
            Some(serde_json::Value::String(MASKED_VALUE.to_string()))
        );
    }

    #[tokio::test]
    async fn test_name_keyword_masks_text_input() {
        let (page, input) = page_with_input("text", "creditCard");
        let capture = capture();
        capture.install(&page).unwrap();

        page.dispatch(
            PageEvent::new("input")
                .on(input)
                .with(PageEventDetail::Input {
                    value: "4111 1111 1111 1111".to_string(),
                }),
        );
        capture.flush_gates();

        let pending = capture.drain_pending(0);
        assert_eq!(
            pending[0].payload.value,
            Some(serde_json::Value::String(MASKED_VALUE.to_string()))
        );
    }

    #[tokio::test]
    async fn test_plain_input_summarized_not_raw() {
        let (page, input) = page_with_input("text", "search");
        let capture = capture();
        capture.install(&page).unwrap();

        page.dispatch(
            PageEvent::new("input")
                .on(input)
                .with(PageEventDetail::Input {
                    value: "rust monitoring".to_string(),
                }),
        );
        capture.flush_gates();

        let pending = capture.drain_pending(0);
        let value = pending[0].payload.value.as_ref().unwrap();
        assert_eq!(value["length"], 15);
        assert_eq!(value["isEmpty"], false);
        assert_eq!(value["hasValue"], true);
        assert!(value.get("text").is_none());
    }

    #[tokio::test]
    async fn test_input_debounce_coalesces_burst() {
        let (page, input) = page_with_input("text", "search");
        let capture = capture();
        capture.install(&page).unwrap();

        for (t, text) in [(0u64, "r"), (100, "ru"), (200, "rus"), (300, "rust")] {
            page.dispatch(
                PageEvent::new("input")
                    .at(t)
                    .on(input)
                    .with(PageEventDetail::Input {
                        value: text.to_string(),
                    }),
            );
        }

        // Nothing released during the burst
        assert_eq!(capture.drain_pending(700).len(), 0);
        // Quiet since t=300: the last value is released
        let pending = capture.drain_pending(900);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload.value.as_ref().unwrap()["length"], 4);
    }

    #[tokio::test]
    async fn test_scroll_throttled() {
        let page = Page::new(PageInfo::default());
        let capture = capture();
        capture.install(&page).unwrap();

        for t in [0u64, 50, 100, 150, 200, 300] {
            page.dispatch(
                PageEvent::new("scroll")
                    .at(t)
                    .with(PageEventDetail::Scroll { x: 0, y: t as i32 }),
            );
        }

        // Leading edge at t=0, next pass at t=300
        let pending = capture.drain_pending(1_000);
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn test_click_carries_path_and_coordinates() {
        let page = Page::new(PageInfo::default());
        let doc = page.document();
        let html = doc.create_element("html");
        doc.set_root(html);
        let button = doc.create_element("button");
        doc.set_attribute(button, "id", "buy");
        doc.append_child(html, button);

        let capture = capture();
        capture.install(&page).unwrap();

        page.dispatch(
            PageEvent::new("click")
                .on(button)
                .with(PageEventDetail::Pointer { x: 10, y: 20 }),
        );

        let pending = capture.drain_pending(1_000);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload.target.as_deref(), Some("button#buy"));
        assert_eq!(pending[0].payload.coordinates, Some(Coordinates { x: 10, y: 20 }));
    }

    #[tokio::test]
    async fn test_history_wrap_emits_navigate_and_delegates() {
        let page = Page::new(PageInfo {
            url: "https://app.example/home".to_string(),
            ..Default::default()
        });
        let capture = capture();
        capture.install(&page).unwrap();

        page.push_state("https://app.example/cart?step=1");

        // The wrap delegated to the original: the URL changed
        assert_eq!(page.url(), "https://app.example/cart?step=1");

        let pending = capture.drain_pending(1_000);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload.action, BehaviorAction::Navigate);
        let value = pending[0].payload.value.as_ref().unwrap();
        assert_eq!(value["path"], "/cart");
        assert_eq!(value["search"], "?step=1");

        capture.uninstall(&page);
        page.push_state("https://app.example/done");
        assert_eq!(page.url(), "https://app.example/done");
        assert_eq!(capture.drain_pending(2_000).len(), 0);
    }

    #[tokio::test]
    async fn test_blocked_elements_skipped() {
        let page = Page::new(PageInfo::default());
        let doc = page.document();
        let html = doc.create_element("html");
        doc.set_root(html);
        let secret = doc.create_element("div");
        doc.set_attribute(secret, "class", "admin-panel");
        doc.append_child(html, secret);

        let privacy = PrivacyConfig {
            blocked_elements: vec![".admin-panel".to_string()],
            ..Default::default()
        };
        let capture = Arc::new(BehaviorCapture::new(BehaviorConfig::default(), privacy));
        capture.install(&page).unwrap();

        page.dispatch(
            PageEvent::new("click")
                .on(secret)
                .with(PageEventDetail::Pointer { x: 0, y: 0 }),
        );

        assert_eq!(capture.drain_pending(1_000).len(), 0);
    }
}
