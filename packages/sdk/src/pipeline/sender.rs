// packages/sdk/src/pipeline/sender.rs
//! Batched HTTP sender
//!
//! Splits drained events into bounded batches, posts them in parallel, and
//! retries each batch with exponential backoff. A batch that exhausts its
//! retries spills to the persistent store; the failure is surfaced in the
//! returned report, never thrown into the caller.

use crate::event::MonitorEvent;
use crate::pipeline::compressor::Compressor;
use crate::pipeline::spill::SpillStore;
use crate::utils::errors::{MonitorError, Result};
use crate::utils::ids::now_ms;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Collector endpoint URL
    pub endpoint: String,

    /// API key, sent as a bearer token
    pub api_key: String,

    /// Maximum events per POST
    pub batch_size: usize,

    /// Retries per batch after the initial attempt
    pub max_retries: u32,

    /// Per-attempt deadline
    pub timeout: Duration,

    /// First retry delay; doubles on each retry
    pub initial_backoff: Duration,

    /// Compress large bodies
    pub compress: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            batch_size: 50,
            max_retries: 3,
            timeout: Duration::from_millis(10_000),
            initial_backoff: Duration::from_secs(1),
            compress: true,
        }
    }
}

/// One outgoing POST.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// The parts of a response the sender cares about.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
}

impl TransportResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport seam: the actual HTTP client behind the sender.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| MonitorError::TransportFailed(e.to_string()))?;

        Ok(TransportResponse {
            status: response.status().as_u16(),
        })
    }
}

/// Wire body for one batch POST.
#[derive(Debug, Serialize)]
struct BatchBody<'a> {
    events: &'a [MonitorEvent],
    timestamp: u64,
    sdk_version: &'a str,
}

/// Outcome of one `send` call.
#[derive(Debug, Default)]
pub struct SendReport {
    /// Events acknowledged by the collector
    pub delivered: usize,

    /// Events parked in the spill store
    pub spilled: usize,

    /// One entry per failed batch
    pub failures: Vec<String>,
}

impl SendReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Batched sender with retry, timeout, compression, and spill.
pub struct HttpSender {
    config: SenderConfig,
    transport: Arc<dyn Transport>,
    compressor: Compressor,
    spill: Arc<SpillStore>,
}

impl HttpSender {
    pub fn new(config: SenderConfig, transport: Arc<dyn Transport>, spill: Arc<SpillStore>) -> Self {
        Self {
            config,
            transport,
            compressor: Compressor::default(),
            spill,
        }
    }

    /// Send `events`, splitting into batches posted in parallel.
    ///
    /// Failed batches spill; the report carries per-batch failures.
    pub async fn send(&self, events: Vec<MonitorEvent>) -> SendReport {
        self.send_inner(events, true).await
    }

    async fn send_inner(&self, events: Vec<MonitorEvent>, spill_on_failure: bool) -> SendReport {
        let mut report = SendReport::default();
        if events.is_empty() {
            return report;
        }

        let batches: Vec<Vec<MonitorEvent>> = events
            .chunks(self.config.batch_size.max(1))
            .map(|c| c.to_vec())
            .collect();

        debug!(events = events.len(), batches = batches.len(), "sending events");

        let results = join_all(
            batches
                .iter()
                .map(|batch| self.send_batch(batch, spill_on_failure)),
        )
        .await;

        for (batch, result) in batches.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += batch.len(),
                Err(e) => {
                    if spill_on_failure {
                        report.spilled += batch.len();
                    }
                    report.failures.push(e.to_string());
                }
            }
        }

        report
    }

    /// Post one batch, retrying with exponential backoff.
    async fn send_batch(&self, batch: &[MonitorEvent], spill_on_failure: bool) -> Result<()> {
        let request = self.build_request(batch)?;

        let mut last_error = MonitorError::TransportFailed("no attempt made".to_string());
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.initial_backoff * 2u32.pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }

            match tokio::time::timeout(self.config.timeout, self.transport.post(request.clone()))
                .await
            {
                Ok(Ok(response)) if response.is_ok() => return Ok(()),
                Ok(Ok(response)) => {
                    last_error = MonitorError::TransportFailed(format!(
                        "collector returned HTTP {}",
                        response.status
                    ));
                }
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = MonitorError::RequestTimeout,
            }

            debug!(attempt, error = %last_error, "batch attempt failed");
        }

        warn!(
            events = batch.len(),
            error = %last_error,
            "batch exhausted retries"
        );

        if spill_on_failure {
            if let Err(e) = self.spill.append(batch) {
                warn!(error = %e, "failed to spill batch");
            }
        }

        Err(last_error)
    }

    fn build_request(&self, batch: &[MonitorEvent]) -> Result<TransportRequest> {
        let body = BatchBody {
            events: batch,
            timestamp: now_ms(),
            sdk_version: crate::VERSION,
        };

        let raw = serde_json::to_vec(&body)
            .map_err(|e| MonitorError::SerializationFailed(e.to_string()))?;

        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.config.api_key),
            ),
            ("X-SDK-Version".to_string(), crate::VERSION.to_string()),
        ];

        let body = if self.config.compress {
            match self.compressor.maybe_compress(&raw)? {
                Some(compressed) => {
                    headers.push(("Content-Encoding".to_string(), "zstd".to_string()));
                    compressed
                }
                None => raw,
            }
        } else {
            raw
        };

        Ok(TransportRequest {
            url: self.config.endpoint.clone(),
            headers,
            body,
        })
    }

    /// Replay the spill store once.
    ///
    /// Success empties it; failure leaves it intact for the next trigger.
    pub async fn replay_spill(&self) -> Result<()> {
        let parked = self.spill.load()?;
        if parked.is_empty() {
            return Ok(());
        }

        debug!(events = parked.len(), "replaying spilled events");
        let report = self.send_inner(parked, false).await;

        if report.is_ok() {
            self.spill.clear();
            Ok(())
        } else {
            Err(MonitorError::TransportFailed(format!(
                "spill replay failed: {}",
                report.failures.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::envelope::{DeviceInfo, Envelope};
    use crate::event::types::{EventPayload, PerformanceMetrics, PerformancePayload};
    use crate::runtime::storage::StorageHandle;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    fn test_event(id: &str) -> MonitorEvent {
        MonitorEvent {
            envelope: Envelope {
                event_id: id.to_string(),
                app_id: "app".to_string(),
                session_id: "s1".to_string(),
                user_id: None,
                timestamp: 0,
                page_url: "https://app.example/".to_string(),
                user_agent: "TestAgent/1.0".to_string(),
                device_info: DeviceInfo::default(),
            },
            payload: EventPayload::Performance(PerformancePayload {
                metrics: PerformanceMetrics::default(),
                resources: vec![],
            }),
        }
    }

    /// Scripted transport: returns the queued statuses in order, then 200.
    struct ScriptedTransport {
        statuses: Mutex<Vec<u16>>,
        requests: Mutex<Vec<(Instant, TransportRequest)>>,
    }

    impl ScriptedTransport {
        fn new(statuses: Vec<u16>) -> Self {
            Self {
                statuses: Mutex::new(statuses),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post(&self, request: TransportRequest) -> Result<TransportResponse> {
            self.requests.lock().push((Instant::now(), request));
            let status = {
                let mut statuses = self.statuses.lock();
                if statuses.is_empty() {
                    200
                } else {
                    statuses.remove(0)
                }
            };
            Ok(TransportResponse { status })
        }
    }

    fn sender(
        transport: Arc<ScriptedTransport>,
        spill: Arc<SpillStore>,
        batch_size: usize,
    ) -> HttpSender {
        let config = SenderConfig {
            endpoint: "https://collector.example/v1/events".to_string(),
            api_key: "key".to_string(),
            batch_size,
            ..Default::default()
        };
        HttpSender::new(config, transport, spill)
    }

    #[tokio::test]
    async fn test_successful_send() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let spill = Arc::new(SpillStore::new(Arc::new(StorageHandle::in_memory("app"))));
        let sender = sender(Arc::clone(&transport), Arc::clone(&spill), 50);

        let report = sender.send(vec![test_event("a"), test_event("b")]).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.spilled, 0);
        assert!(report.is_ok());
        assert_eq!(transport.request_count(), 1);
        assert!(spill.is_empty());
    }

    #[tokio::test]
    async fn test_batch_split() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let spill = Arc::new(SpillStore::new(Arc::new(StorageHandle::in_memory("app"))));
        let sender = sender(Arc::clone(&transport), spill, 2);

        let events: Vec<MonitorEvent> = (0..5).map(|i| test_event(&format!("e{}", i))).collect();
        let report = sender.send(events).await;

        assert_eq!(report.delivered, 5);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_headers() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let spill = Arc::new(SpillStore::new(Arc::new(StorageHandle::in_memory("app"))));
        let sender = sender(Arc::clone(&transport), spill, 50);

        sender.send(vec![test_event("a")]).await;

        let requests = transport.requests.lock();
        let (_, request) = &requests[0];
        let find = |name: &str| {
            request
                .headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(find("Content-Type").as_deref(), Some("application/json"));
        assert_eq!(find("Authorization").as_deref(), Some("Bearer key"));
        assert_eq!(find("X-SDK-Version").as_deref(), Some(crate::VERSION));
        // Small body: no content-encoding header
        assert!(find("Content-Encoding").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_then_spill() {
        // 4 attempts (1 + 3 retries), all 500: the batch spills
        let transport = Arc::new(ScriptedTransport::new(vec![500, 500, 500, 500]));
        let store = Arc::new(StorageHandle::in_memory("app"));
        let spill = Arc::new(SpillStore::new(Arc::clone(&store)));
        let sender = sender(Arc::clone(&transport), Arc::clone(&spill), 50);

        let events: Vec<MonitorEvent> = (0..50).map(|i| test_event(&format!("e{}", i))).collect();
        let started = Instant::now();
        let report = sender.send(events).await;

        assert_eq!(report.delivered, 0);
        assert_eq!(report.spilled, 50);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(transport.request_count(), 4);

        // Backoff delays: 1s + 2s + 4s
        assert!(started.elapsed() >= Duration::from_secs(7));

        let delays: Vec<Duration> = {
            let requests = transport.requests.lock();
            requests.windows(2).map(|w| w[1].0 - w[0].0).collect()
        };
        assert!(delays[0] >= Duration::from_secs(1));
        assert!(delays[1] >= Duration::from_secs(2));
        assert!(delays[2] >= Duration::from_secs(4));

        // The exact failed set is parked under the namespaced key
        let parked = spill.load().unwrap();
        assert_eq!(parked.len(), 50);
        assert_eq!(parked[0].envelope.event_id, "e0");
        assert!(store.get(crate::pipeline::spill::SPILL_KEY).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers() {
        let transport = Arc::new(ScriptedTransport::new(vec![503, 200]));
        let spill = Arc::new(SpillStore::new(Arc::new(StorageHandle::in_memory("app"))));
        let sender = sender(Arc::clone(&transport), Arc::clone(&spill), 50);

        let report = sender.send(vec![test_event("a")]).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(transport.request_count(), 2);
        assert!(spill.is_empty());
    }

    #[tokio::test]
    async fn test_replay_spill_success_empties_store() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let spill = Arc::new(SpillStore::new(Arc::new(StorageHandle::in_memory("app"))));
        spill.append(&[test_event("a"), test_event("b")]).unwrap();

        let sender = sender(transport, Arc::clone(&spill), 50);
        sender.replay_spill().await.unwrap();

        assert!(spill.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_spill_failure_leaves_store_intact() {
        let transport = Arc::new(ScriptedTransport::new(vec![500, 500, 500, 500]));
        let spill = Arc::new(SpillStore::new(Arc::new(StorageHandle::in_memory("app"))));
        spill.append(&[test_event("a")]).unwrap();

        let sender = sender(transport, Arc::clone(&spill), 50);
        assert!(sender.replay_spill().await.is_err());

        // Still parked, not duplicated
        assert_eq!(spill.len(), 1);
    }

    #[tokio::test]
    async fn test_large_body_compressed() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let spill = Arc::new(SpillStore::new(Arc::new(StorageHandle::in_memory("app"))));
        let sender = sender(Arc::clone(&transport), spill, 50);

        let events: Vec<MonitorEvent> = (0..40).map(|i| test_event(&format!("e{}", i))).collect();
        sender.send(events).await;

        let requests = transport.requests.lock();
        let (_, request) = &requests[0];
        assert!(request
            .headers
            .iter()
            .any(|(n, v)| n == "Content-Encoding" && v == "zstd"));
    }
}
