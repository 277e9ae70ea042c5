// packages/sdk/src/host/hooks.rs
//! Global hook slots with save-and-chain installation
//!
//! The host exposes its global surfaces (error handler, rejection handler,
//! network transports, history methods) as slots. Installing a capture hook
//! never replaces what was there: the prior handler is saved, the new
//! handler invokes it first, and uninstalling restores the saved reference.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A runtime error surfaced through the global error handler.
#[derive(Debug, Clone)]
pub struct RuntimeErrorInfo {
    pub message: String,
    pub file_name: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub stack: Option<String>,
}

/// The reason attached to an unhandled rejection.
#[derive(Debug, Clone)]
pub enum RejectionReason {
    /// An error value: contributes message and stack
    Error {
        message: String,
        stack: Option<String>,
    },
    /// A bare string reason
    Text(String),
    /// Anything else; stringified as JSON when captured
    Value(serde_json::Value),
}

/// An outgoing request through an intercepted transport.
#[derive(Debug, Clone)]
pub struct NetRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
}

/// The response as seen by the interceptor.
#[derive(Debug, Clone)]
pub struct NetResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl NetResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failure modes.
#[derive(Debug, Clone)]
pub enum NetFailure {
    Network(String),
    Timeout,
    Aborted,
}

impl fmt::Display for NetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetFailure::Network(message) => write!(f, "network error: {}", message),
            NetFailure::Timeout => write!(f, "request timed out"),
            NetFailure::Aborted => write!(f, "request aborted"),
        }
    }
}

pub type ErrorHandler = Arc<dyn Fn(&RuntimeErrorInfo) + Send + Sync>;
pub type RejectionHandler = Arc<dyn Fn(&RejectionReason) + Send + Sync>;
pub type HistoryHandler = Arc<dyn Fn(&str) + Send + Sync>;
pub type NetHandler = Arc<
    dyn Fn(NetRequest) -> BoxFuture<'static, std::result::Result<NetResponse, NetFailure>>
        + Send
        + Sync,
>;

/// One hook slot: the live handler plus the reference saved by a wrap.
pub struct HookSlot<H> {
    current: Option<H>,
    saved: Option<H>,
    wrapped: bool,
}

impl<H: Clone> HookSlot<H> {
    pub fn new() -> Self {
        Self {
            current: None,
            saved: None,
            wrapped: false,
        }
    }

    /// Host-side installation of the underlying handler.
    pub fn set(&mut self, handler: H) {
        self.current = Some(handler);
    }

    pub fn get(&self) -> Option<H> {
        self.current.clone()
    }

    /// Save the prior handler and install a chained wrapper built from it.
    ///
    /// Returns `false` (and leaves the slot alone) when already wrapped.
    pub fn wrap(&mut self, make: impl FnOnce(Option<H>) -> H) -> bool {
        if self.wrapped {
            return false;
        }
        let prior = self.current.clone();
        self.saved = prior.clone();
        self.current = Some(make(prior));
        self.wrapped = true;
        true
    }

    /// Restore the reference saved at wrap time.
    pub fn restore(&mut self) -> bool {
        if !self.wrapped {
            return false;
        }
        self.current = self.saved.take();
        self.wrapped = false;
        true
    }

    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }
}

impl<H: Clone> Default for HookSlot<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// The host's global hook surface.
#[derive(Default)]
pub struct GlobalHooks {
    error: Mutex<HookSlot<ErrorHandler>>,
    rejection: Mutex<HookSlot<RejectionHandler>>,
    fetch: Mutex<HookSlot<NetHandler>>,
    xhr: Mutex<HookSlot<NetHandler>>,
    push_state: Mutex<HookSlot<HistoryHandler>>,
    replace_state: Mutex<HookSlot<HistoryHandler>>,
}

impl GlobalHooks {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- global error handler ----

    pub fn set_error_handler(&self, handler: ErrorHandler) {
        self.error.lock().set(handler);
    }

    pub fn wrap_error(&self, make: impl FnOnce(Option<ErrorHandler>) -> ErrorHandler) -> bool {
        self.error.lock().wrap(make)
    }

    pub fn restore_error(&self) -> bool {
        self.error.lock().restore()
    }

    pub fn error_handler(&self) -> Option<ErrorHandler> {
        self.error.lock().get()
    }

    /// Fire the error chain (host handlers first).
    pub fn dispatch_error(&self, info: &RuntimeErrorInfo) {
        if let Some(handler) = self.error_handler() {
            handler(info);
        }
    }

    // ---- unhandled rejection handler ----

    pub fn set_rejection_handler(&self, handler: RejectionHandler) {
        self.rejection.lock().set(handler);
    }

    pub fn wrap_rejection(
        &self,
        make: impl FnOnce(Option<RejectionHandler>) -> RejectionHandler,
    ) -> bool {
        self.rejection.lock().wrap(make)
    }

    pub fn restore_rejection(&self) -> bool {
        self.rejection.lock().restore()
    }

    pub fn dispatch_rejection(&self, reason: &RejectionReason) {
        let handler = self.rejection.lock().get();
        if let Some(handler) = handler {
            handler(reason);
        }
    }

    // ---- intercepted transports ----

    pub fn set_fetch(&self, handler: NetHandler) {
        self.fetch.lock().set(handler);
    }

    pub fn wrap_fetch(&self, make: impl FnOnce(Option<NetHandler>) -> NetHandler) -> bool {
        self.fetch.lock().wrap(make)
    }

    pub fn restore_fetch(&self) -> bool {
        self.fetch.lock().restore()
    }

    /// Issue a request through the (possibly wrapped) fetch transport.
    pub async fn fetch(&self, request: NetRequest) -> std::result::Result<NetResponse, NetFailure> {
        let handler = self.fetch.lock().get();
        match handler {
            Some(handler) => handler(request).await,
            None => Err(NetFailure::Network("no transport installed".to_string())),
        }
    }

    pub fn set_xhr(&self, handler: NetHandler) {
        self.xhr.lock().set(handler);
    }

    pub fn wrap_xhr(&self, make: impl FnOnce(Option<NetHandler>) -> NetHandler) -> bool {
        self.xhr.lock().wrap(make)
    }

    pub fn restore_xhr(&self) -> bool {
        self.xhr.lock().restore()
    }

    /// Issue a request through the (possibly wrapped) XHR transport.
    pub async fn xhr(&self, request: NetRequest) -> std::result::Result<NetResponse, NetFailure> {
        let handler = self.xhr.lock().get();
        match handler {
            Some(handler) => handler(request).await,
            None => Err(NetFailure::Network("no transport installed".to_string())),
        }
    }

    // ---- history methods ----

    pub fn set_push_state(&self, handler: HistoryHandler) {
        self.push_state.lock().set(handler);
    }

    pub fn wrap_push_state(
        &self,
        make: impl FnOnce(Option<HistoryHandler>) -> HistoryHandler,
    ) -> bool {
        self.push_state.lock().wrap(make)
    }

    pub fn restore_push_state(&self) -> bool {
        self.push_state.lock().restore()
    }

    pub fn dispatch_push_state(&self, url: &str) {
        let handler = self.push_state.lock().get();
        if let Some(handler) = handler {
            handler(url);
        }
    }

    pub fn set_replace_state(&self, handler: HistoryHandler) {
        self.replace_state.lock().set(handler);
    }

    pub fn wrap_replace_state(
        &self,
        make: impl FnOnce(Option<HistoryHandler>) -> HistoryHandler,
    ) -> bool {
        self.replace_state.lock().wrap(make)
    }

    pub fn restore_replace_state(&self) -> bool {
        self.replace_state.lock().restore()
    }

    pub fn dispatch_replace_state(&self, url: &str) {
        let handler = self.replace_state.lock().get();
        if let Some(handler) = handler {
            handler(url);
        }
    }

    /// Whether any slot still carries a wrap (used by teardown checks).
    pub fn any_wrapped(&self) -> bool {
        self.error.lock().is_wrapped()
            || self.rejection.lock().is_wrapped()
            || self.fetch.lock().is_wrapped()
            || self.xhr.lock().is_wrapped()
            || self.push_state.lock().is_wrapped()
            || self.replace_state.lock().is_wrapped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_chains_prior_first() {
        let hooks = GlobalHooks::new();
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&order);
        hooks.set_error_handler(Arc::new(move |_| sink.lock().push("host")));

        let sink = Arc::clone(&order);
        hooks.wrap_error(|prior| {
            Arc::new(move |info| {
                if let Some(prior) = &prior {
                    prior(info);
                }
                sink.lock().push("sdk");
            })
        });

        hooks.dispatch_error(&RuntimeErrorInfo {
            message: "Boom".to_string(),
            file_name: None,
            line: None,
            column: None,
            stack: None,
        });

        assert_eq!(*order.lock(), vec!["host", "sdk"]);
    }

    #[test]
    fn test_restore_returns_saved_reference() {
        let hooks = GlobalHooks::new();
        let calls: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));

        let sink = Arc::clone(&calls);
        hooks.set_error_handler(Arc::new(move |_| *sink.lock() += 1));

        hooks.wrap_error(|prior| {
            Arc::new(move |info| {
                if let Some(prior) = &prior {
                    prior(info);
                }
            })
        });
        assert!(hooks.any_wrapped());

        assert!(hooks.restore_error());
        assert!(!hooks.any_wrapped());

        // The host handler alone is live again
        hooks.dispatch_error(&RuntimeErrorInfo {
            message: "Boom".to_string(),
            file_name: None,
            line: None,
            column: None,
            stack: None,
        });
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_double_wrap_is_rejected() {
        let hooks = GlobalHooks::new();
        assert!(hooks.wrap_error(|_| Arc::new(|_| {})));
        assert!(!hooks.wrap_error(|_| Arc::new(|_| {})));
        assert!(hooks.restore_error());
        assert!(!hooks.restore_error());
    }

    #[tokio::test]
    async fn test_fetch_wrap_observes_and_rethrows() {
        let hooks = GlobalHooks::new();

        // Host transport always fails
        hooks.set_fetch(Arc::new(|_request| {
            Box::pin(async { Err(NetFailure::Timeout) })
        }));

        let observed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        hooks.wrap_fetch(|prior| {
            Arc::new(move |request| {
                let prior = prior.clone();
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    let result = match prior {
                        Some(prior) => prior(request.clone()).await,
                        None => Err(NetFailure::Network("no transport installed".to_string())),
                    };
                    if let Err(failure) = &result {
                        sink.lock().push(format!("{} {}", request.url, failure));
                    }
                    result
                })
            })
        });

        let result = hooks
            .fetch(NetRequest {
                url: "https://api.example/items".to_string(),
                method: "GET".to_string(),
                headers: vec![],
            })
            .await;

        // The original failure reaches the caller unchanged
        assert!(matches!(result, Err(NetFailure::Timeout)));
        assert_eq!(observed.lock().len(), 1);
    }
}
