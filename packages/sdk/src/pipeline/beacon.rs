// packages/sdk/src/pipeline/beacon.rs
//! Unload-time beacon sender
//!
//! A single synchronous enqueue into the host's unload-safe delivery
//! channel. No retry, no response handling: the page is going away. The
//! API key travels as a query parameter because beacon requests cannot
//! carry custom headers.

use crate::event::MonitorEvent;
use crate::utils::ids::now_ms;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// The unload-safe delivery channel.
///
/// `enqueue` must not block: implementations hand the body to the host and
/// return whether the host accepted it.
pub trait BeaconChannel: Send + Sync {
    fn enqueue(&self, url: &str, body: Vec<u8>) -> bool;
}

/// Fire-and-forget HTTP channel used when the host has no native beacon.
pub struct HttpBeaconChannel {
    client: reqwest::Client,
}

impl HttpBeaconChannel {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpBeaconChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconChannel for HttpBeaconChannel {
    fn enqueue(&self, url: &str, body: Vec<u8>) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available for beacon delivery");
            return false;
        };

        let request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body);

        handle.spawn(async move {
            if let Err(e) = request.send().await {
                debug!(error = %e, "beacon delivery failed");
            }
        });

        true
    }
}

/// In-memory channel that records enqueued bodies.
///
/// Primarily intended for tests and embedders that deliver beacons
/// themselves.
#[derive(Default)]
pub struct MemoryBeaconChannel {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryBeaconChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all enqueued bodies, leaving the channel empty.
    pub fn take_sent(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl BeaconChannel for MemoryBeaconChannel {
    fn enqueue(&self, url: &str, body: Vec<u8>) -> bool {
        self.sent.lock().push((url.to_string(), body));
        true
    }
}

#[derive(Debug, Serialize)]
struct BeaconBody<'a> {
    events: &'a [MonitorEvent],
    timestamp: u64,
    sdk_version: &'a str,
}

/// One-shot sender over a [`BeaconChannel`].
pub struct BeaconSender {
    channel: Arc<dyn BeaconChannel>,
    endpoint: String,
    api_key: String,
}

impl BeaconSender {
    pub fn new(channel: Arc<dyn BeaconChannel>, endpoint: String, api_key: String) -> Self {
        Self {
            channel,
            endpoint,
            api_key,
        }
    }

    /// Enqueue `events` for unload-safe delivery.
    ///
    /// An empty list performs no request and reports success.
    pub fn send(&self, events: &[MonitorEvent]) -> bool {
        if events.is_empty() {
            return true;
        }

        let body = BeaconBody {
            events,
            timestamp: now_ms(),
            sdk_version: crate::VERSION,
        };

        let Ok(body) = serde_json::to_vec(&body) else {
            warn!("failed to serialize beacon body");
            return false;
        };

        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        let url = format!("{}{}apiKey={}", self.endpoint, separator, self.api_key);

        let accepted = self.channel.enqueue(&url, body);
        if accepted {
            debug!(events = events.len(), "beacon enqueued");
        } else {
            warn!("beacon channel refused the payload");
        }
        accepted
    }
}
