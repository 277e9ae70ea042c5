// packages/sdk/src/capture/errors.rs
//! Error capture
//!
//! Hooks into the host's error surfaces — the global error handler,
//! unhandled rejections, resource-load errors, and the fetch/XHR
//! transports — and turns each signal into a uniform, scrubbed error
//! payload. Duplicate errors (by fingerprint) are dropped for the whole
//! session. Every installation is save-and-chain and reverted on stop.

use crate::capture::redaction::Redactor;
use crate::event::fingerprint::fingerprint;
use crate::event::types::{ErrorKind, ErrorPayload, Severity};
use crate::host::hooks::{NetFailure, NetRequest, RejectionReason, RuntimeErrorInfo};
use crate::host::page::{ListenerId, ListenerOptions, Page};
use crate::utils::errors::Result;
use crate::utils::ids::now_ms;
use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Capture-side buffer capacity per session.
pub const DEFAULT_MAX_BUFFERED: usize = 100;

/// Derive a severity from an error message by keyword.
pub fn derive_severity(message: &str) -> Severity {
    let lowered = message.to_lowercase();
    if ["crash", "fatal", "critical", "security"]
        .iter()
        .any(|kw| lowered.contains(kw))
    {
        Severity::Critical
    } else if ["error", "exception", "failed", "timeout"]
        .iter()
        .any(|kw| lowered.contains(kw))
    {
        Severity::High
    } else if ["warning", "deprecated", "invalid"]
        .iter()
        .any(|kw| lowered.contains(kw))
    {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// A captured error waiting for admission.
#[derive(Debug, Clone)]
pub struct PendingError {
    pub timestamp: u64,
    pub payload: ErrorPayload,
}

#[derive(Default)]
struct Installed {
    hooked: bool,
    resource_listener: Option<ListenerId>,
}

/// Signals the orchestrator that something was buffered.
pub type ActivityNotifier = Arc<dyn Fn() + Send + Sync>;

/// Error capture component.
pub struct ErrorCapture {
    redactor: Redactor,
    buffer: ArrayQueue<PendingError>,
    seen: Mutex<HashSet<String>>,
    installed: Mutex<Installed>,
    notifier: Mutex<Option<ActivityNotifier>>,
    captured: AtomicU64,
    deduped: AtomicU64,
    dropped: AtomicU64,
}

impl ErrorCapture {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_BUFFERED)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            redactor: Redactor::new(),
            buffer: ArrayQueue::new(capacity.max(1)),
            seen: Mutex::new(HashSet::new()),
            installed: Mutex::new(Installed::default()),
            notifier: Mutex::new(None),
            captured: AtomicU64::new(0),
            deduped: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Install all error hooks on `page`, chaining any prior handlers.
    pub fn install(self: &Arc<Self>, page: &Arc<Page>) -> Result<()> {
        let mut installed = self.installed.lock();
        if installed.hooked {
            warn!("error capture already installed");
            return Ok(());
        }

        let hooks = page.hooks();

        let capture = Arc::downgrade(self);
        hooks.wrap_error(move |prior| {
            Arc::new(move |info: &RuntimeErrorInfo| {
                if let Some(prior) = &prior {
                    prior(info);
                }
                if let Some(capture) = capture.upgrade() {
                    capture.on_runtime_error(info);
                }
            })
        });

        let capture = Arc::downgrade(self);
        hooks.wrap_rejection(move |prior| {
            Arc::new(move |reason: &RejectionReason| {
                if let Some(prior) = &prior {
                    prior(reason);
                }
                if let Some(capture) = capture.upgrade() {
                    capture.on_unhandled_rejection(reason);
                }
            })
        });

        hooks.wrap_fetch(|prior| Self::net_wrapper(Arc::downgrade(self), prior));
        hooks.wrap_xhr(|prior| Self::net_wrapper(Arc::downgrade(self), prior));

        // Resource load failures surface as capturing-phase "error" events
        // targeting the failed element
        let capture = Arc::downgrade(self);
        let doc_page = Arc::downgrade(page);
        let listener = page.add_listener(
            "error",
            ListenerOptions::capture(),
            Arc::new(move |event| {
                let (Some(capture), Some(page)) = (capture.upgrade(), doc_page.upgrade()) else {
                    return;
                };
                let Some(target) = event.target else {
                    return;
                };
                let doc = page.document();
                let source = doc
                    .attribute(target, "src")
                    .or_else(|| doc.attribute(target, "href"));
                if let Some(source) = source {
                    let tag = doc.tag_name(target).unwrap_or_default();
                    capture.on_resource_error(&tag, &source, event.timestamp);
                }
            }),
        );

        installed.hooked = true;
        installed.resource_listener = Some(listener);
        debug!("error capture installed");
        Ok(())
    }

    /// Revert every hook and listener installed by `install`.
    pub fn uninstall(&self, page: &Page) {
        let mut installed = self.installed.lock();
        if !installed.hooked {
            return;
        }

        if let Some(listener) = installed.resource_listener.take() {
            page.remove_listener(listener);
        }

        let hooks = page.hooks();
        hooks.restore_xhr();
        hooks.restore_fetch();
        hooks.restore_rejection();
        hooks.restore_error();

        installed.hooked = false;
        debug!("error capture uninstalled");
    }

    fn net_wrapper(
        capture: Weak<Self>,
        prior: Option<crate::host::hooks::NetHandler>,
    ) -> crate::host::hooks::NetHandler {
        Arc::new(move |request: NetRequest| {
            let prior = prior.clone();
            let capture = capture.clone();
            Box::pin(async move {
                let started = now_ms();
                let result = match prior {
                    Some(prior) => prior(request.clone()).await,
                    None => Err(NetFailure::Network("no transport installed".to_string())),
                };
                let duration = now_ms().saturating_sub(started);

                if let Some(capture) = capture.upgrade() {
                    match &result {
                        Ok(response) if !response.is_ok() => {
                            capture.on_network_status(&request, response.status, duration, response);
                        }
                        Err(failure) => capture.on_network_failure(&request, failure, duration),
                        Ok(_) => {}
                    }
                }

                // The host sees its original outcome either way
                result
            })
        })
    }

    // ---- signal handlers ----

    /// A runtime error from the global error handler.
    pub fn on_runtime_error(&self, info: &RuntimeErrorInfo) {
        let message = self.redactor.scrub_message(&info.message);
        let severity = derive_severity(&message);
        let payload = ErrorPayload {
            error_type: ErrorKind::Javascript,
            message: message.clone(),
            stack_trace: info.stack.as_deref().map(|s| self.redactor.scrub_stack(s)),
            file_name: info.file_name.clone(),
            line_number: info.line,
            column_number: info.column,
            severity,
            context: serde_json::Value::Null,
            fingerprint: fingerprint(&message, info.file_name.as_deref(), info.line, info.column),
        };
        self.admit(payload, now_ms());
    }

    /// An unhandled rejection; the reason is coerced to a message.
    pub fn on_unhandled_rejection(&self, reason: &RejectionReason) {
        let (message, stack) = match reason {
            RejectionReason::Error { message, stack } => (message.clone(), stack.clone()),
            RejectionReason::Text(text) => (text.clone(), None),
            RejectionReason::Value(value) => (
                serde_json::to_string(value).unwrap_or_else(|_| "[unserializable]".to_string()),
                None,
            ),
        };

        let message = self.redactor.scrub_message(&message);
        let payload = ErrorPayload {
            error_type: ErrorKind::Promise,
            message: message.clone(),
            stack_trace: stack.as_deref().map(|s| self.redactor.scrub_stack(s)),
            file_name: None,
            line_number: None,
            column_number: None,
            severity: Severity::High,
            context: serde_json::Value::Null,
            fingerprint: fingerprint(&message, None, None, None),
        };
        self.admit(payload, now_ms());
    }

    /// A resource whose load failed (element with `src`/`href`).
    fn on_resource_error(&self, tag: &str, source: &str, timestamp: u64) {
        let message = format!("Failed to load resource: {}", source);
        let payload = ErrorPayload {
            error_type: ErrorKind::Network,
            message: message.clone(),
            stack_trace: None,
            file_name: None,
            line_number: None,
            column_number: None,
            severity: Severity::Medium,
            context: self.redactor.sanitize_context(&serde_json::json!({
                "element": tag,
                "url": source,
            })),
            fingerprint: fingerprint(&message, None, None, None),
        };
        self.admit(payload, timestamp);
    }

    /// An intercepted request that completed with a non-2xx status.
    fn on_network_status(
        &self,
        request: &NetRequest,
        status: u16,
        duration: u64,
        response: &crate::host::hooks::NetResponse,
    ) {
        let severity = if status >= 500 {
            Severity::High
        } else {
            Severity::Medium
        };
        let message = format!("HTTP {} on {} {}", status, request.method, request.url);
        let payload = ErrorPayload {
            error_type: ErrorKind::Network,
            message: message.clone(),
            stack_trace: None,
            file_name: None,
            line_number: None,
            column_number: None,
            severity,
            context: self.redactor.sanitize_context(&serde_json::json!({
                "url": request.url,
                "method": request.method,
                "status": status,
                "duration": duration,
                "requestHeaders": header_map(&request.headers),
                "responseHeaders": header_map(&response.headers),
            })),
            fingerprint: fingerprint(&message, None, None, None),
        };
        self.admit(payload, now_ms());
    }

    /// An intercepted request that threw, aborted, or timed out.
    fn on_network_failure(&self, request: &NetRequest, failure: &NetFailure, duration: u64) {
        let message = format!("{} on {} {}", failure, request.method, request.url);
        let payload = ErrorPayload {
            error_type: ErrorKind::Network,
            message: message.clone(),
            stack_trace: None,
            file_name: None,
            line_number: None,
            column_number: None,
            severity: Severity::High,
            context: self.redactor.sanitize_context(&serde_json::json!({
                "url": request.url,
                "method": request.method,
                "duration": duration,
                "requestHeaders": header_map(&request.headers),
            })),
            fingerprint: fingerprint(&message, None, None, None),
        };
        self.admit(payload, now_ms());
    }

    // ---- explicit capture API ----

    /// Capture a caught exception on behalf of the application.
    pub fn capture_exception(
        &self,
        message: &str,
        stack: Option<&str>,
        context: Option<&serde_json::Value>,
        severity: Option<Severity>,
    ) {
        let message = self.redactor.scrub_message(message);
        let severity = severity.unwrap_or_else(|| derive_severity(&message));
        let payload = ErrorPayload {
            error_type: ErrorKind::Javascript,
            message: message.clone(),
            stack_trace: stack.map(|s| self.redactor.scrub_stack(s)),
            file_name: None,
            line_number: None,
            column_number: None,
            severity,
            context: context
                .map(|c| self.redactor.sanitize_context(c))
                .unwrap_or(serde_json::Value::Null),
            fingerprint: fingerprint(&message, None, None, None),
        };
        self.admit(payload, now_ms());
    }

    /// Capture a free-form message at a chosen level.
    pub fn capture_message(
        &self,
        message: &str,
        level: Option<Severity>,
        context: Option<&serde_json::Value>,
    ) {
        let message = self.redactor.scrub_message(message);
        let payload = ErrorPayload {
            error_type: ErrorKind::Custom,
            message: message.clone(),
            stack_trace: None,
            file_name: None,
            line_number: None,
            column_number: None,
            severity: level.unwrap_or(Severity::Low),
            context: context
                .map(|c| self.redactor.sanitize_context(c))
                .unwrap_or(serde_json::Value::Null),
            fingerprint: fingerprint(&message, None, None, None),
        };
        self.admit(payload, now_ms());
    }

    // ---- admission & drain ----

    fn admit(&self, payload: ErrorPayload, timestamp: u64) {
        // Session-lifetime dedup; the set is never garbage collected
        if !self.seen.lock().insert(payload.fingerprint.clone()) {
            self.deduped.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %payload.fingerprint, "duplicate error dropped");
            return;
        }

        self.captured.fetch_add(1, Ordering::Relaxed);
        let pending = PendingError { timestamp, payload };
        if let Err(pending) = self.buffer.push(pending) {
            let _ = self.buffer.pop();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("error buffer full, dropped oldest");
            let _ = self.buffer.push(pending);
        }

        let notifier = self.notifier.lock().clone();
        if let Some(notifier) = notifier {
            notifier();
        }
    }

    /// Register the orchestrator's wake-up callback.
    pub fn set_notifier(&self, notifier: ActivityNotifier) {
        *self.notifier.lock() = Some(notifier);
    }

    /// Take everything buffered, in capture order.
    pub fn drain_pending(&self) -> Vec<PendingError> {
        let mut drained = Vec::new();
        while let Some(pending) = self.buffer.pop() {
            drained.push(pending);
        }
        drained
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn captured_count(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    pub fn deduped_count(&self) -> u64 {
        self.deduped.load(Ordering::Relaxed)
    }
}

impl Default for ErrorCapture {
    fn default() -> Self {
        Self::new()
    }
}

fn header_map(headers: &[(String, String)]) -> serde_json::Value {
    serde_json::Value::Object(
        headers
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::hooks::NetResponse;
    use crate::host::page::{PageEvent, PageInfo};

    fn runtime_error(message: &str, file: &str, line: u32, column: u32) -> RuntimeErrorInfo {
        RuntimeErrorInfo {
            message: message.to_string(),
            file_name: Some(file.to_string()),
            line: Some(line),
            column: Some(column),
            stack: None,
        }
    }

    #[test]
    fn test_severity_derivation() {
        assert_eq!(derive_severity("Fatal crash in renderer"), Severity::Critical);
        assert_eq!(derive_severity("SECURITY violation"), Severity::Critical);
        assert_eq!(derive_severity("Uncaught Error: Boom"), Severity::High);
        assert_eq!(derive_severity("request timeout"), Severity::High);
        assert_eq!(derive_severity("Deprecated API used"), Severity::Medium);
        assert_eq!(derive_severity("something odd"), Severity::Low);
    }

    #[test]
    fn test_fingerprint_dedup_within_session() {
        let capture = Arc::new(ErrorCapture::new());

        capture.on_runtime_error(&runtime_error("Uncaught Error: Boom", "app.js", 10, 3));
        capture.on_runtime_error(&runtime_error("Uncaught Error: Boom", "app.js", 10, 3));

        let pending = capture.drain_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(capture.deduped_count(), 1);

        // Same message from a different position is a different class
        capture.on_runtime_error(&runtime_error("Uncaught Error: Boom", "app.js", 20, 1));
        assert_eq!(capture.drain_pending().len(), 1);
    }

    #[test]
    fn test_rejection_coercion() {
        let capture = Arc::new(ErrorCapture::new());

        capture.on_unhandled_rejection(&RejectionReason::Error {
            message: "connect failed".to_string(),
            stack: Some("at connect (app.js:5:1)".to_string()),
        });
        capture.on_unhandled_rejection(&RejectionReason::Text("plain reason".to_string()));
        capture.on_unhandled_rejection(&RejectionReason::Value(
            serde_json::json!({"code": 42}),
        ));

        let pending = capture.drain_pending();
        assert_eq!(pending.len(), 3);
        for p in &pending {
            assert_eq!(p.payload.error_type, ErrorKind::Promise);
            assert_eq!(p.payload.severity, Severity::High);
        }
        assert_eq!(pending[1].payload.message, "plain reason");
        assert_eq!(pending[2].payload.message, r#"{"code":42}"#);
    }

    #[test]
    fn test_buffer_overflow_drops_oldest() {
        let capture = Arc::new(ErrorCapture::with_capacity(3));

        for i in 0..5 {
            capture.on_runtime_error(&runtime_error(
                &format!("plain {}", i),
                "app.js",
                i,
                0,
            ));
        }

        let pending = capture.drain_pending();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].payload.message, "plain 2");
        assert_eq!(pending[2].payload.message, "plain 4");
    }

    #[test]
    fn test_long_message_redacted_and_truncated() {
        let capture = Arc::new(ErrorCapture::new());
        let message = format!("card 4111 1111 1111 1111 {}", "x".repeat(1_200));
        capture.on_runtime_error(&runtime_error(&message, "app.js", 1, 1));

        let pending = capture.drain_pending();
        assert_eq!(pending[0].payload.message.chars().count(), 1_000);
        assert!(!pending[0].payload.message.contains("4111"));
    }

    #[tokio::test]
    async fn test_install_uninstall_round_trip() {
        let page = Page::new(PageInfo::default());
        let capture = Arc::new(ErrorCapture::new());

        capture.install(&page).unwrap();
        assert!(page.hooks().any_wrapped());
        assert_eq!(page.listener_count("error"), 1);

        page.hooks().dispatch_error(&runtime_error("Uncaught Error: Boom", "app.js", 1, 1));
        assert_eq!(capture.buffered_count(), 1);

        capture.uninstall(&page);
        assert!(!page.hooks().any_wrapped());
        assert_eq!(page.listener_count("error"), 0);

        // After uninstall, dispatches no longer reach the capture
        page.hooks().dispatch_error(&runtime_error("plain other", "app.js", 2, 2));
        assert_eq!(capture.buffered_count(), 1);
    }

    #[tokio::test]
    async fn test_network_interception_records_and_rethrows() {
        let page = Page::new(PageInfo::default());
        page.hooks().set_fetch(Arc::new(|_request| {
            Box::pin(async {
                Ok(NetResponse {
                    status: 503,
                    headers: vec![("Retry-After".to_string(), "1".to_string())],
                })
            })
        }));

        let capture = Arc::new(ErrorCapture::new());
        capture.install(&page).unwrap();

        let response = page
            .hooks()
            .fetch(NetRequest {
                url: "https://api.example/items".to_string(),
                method: "POST".to_string(),
                headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            })
            .await
            .unwrap();
        assert_eq!(response.status, 503);

        let pending = capture.drain_pending();
        assert_eq!(pending.len(), 1);
        let payload = &pending[0].payload;
        assert_eq!(payload.error_type, ErrorKind::Network);
        assert_eq!(payload.severity, Severity::High);
        assert_eq!(payload.context["status"], 503);
        assert_eq!(payload.context["method"], "POST");
        assert_eq!(payload.context["responseHeaders"]["Retry-After"], "1");
    }

    #[tokio::test]
    async fn test_resource_error_listener() {
        let page = Page::new(PageInfo::default());
        let doc = page.document();
        let html = doc.create_element("html");
        doc.set_root(html);
        let img = doc.create_element("img");
        doc.set_attribute(img, "src", "https://cdn.example/missing.png");
        doc.append_child(html, img);

        let capture = Arc::new(ErrorCapture::new());
        capture.install(&page).unwrap();

        page.dispatch(PageEvent::new("error").on(img));

        let pending = capture.drain_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload.error_type, ErrorKind::Network);
        assert_eq!(pending[0].payload.severity, Severity::Medium);
        assert!(pending[0]
            .payload
            .message
            .contains("missing.png"));
    }
}
