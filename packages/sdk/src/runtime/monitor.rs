// packages/sdk/src/runtime/monitor.rs
//! The orchestrator
//!
//! Owns the whole pipeline: installs captures on start, periodically pulls
//! their buffers, samples and envelopes each payload into the queue, and
//! drives the flush policy (debounced for errors, throttled for the rest,
//! periodic always). Unload drains the queue into the beacon; coming back
//! online replays the spill store. Stop tears everything down in reverse
//! order and is idempotent.

use crate::capture::behavior::{BehaviorCapture, BehaviorConfig};
use crate::capture::errors::ErrorCapture;
use crate::capture::performance::PerformanceCapture;
use crate::event::envelope::Envelope;
use crate::event::types::{EventPayload, MonitorEvent, Severity};
use crate::host::page::{ListenerId, ListenerOptions, Page, PageEventDetail, PageInfo, Visibility};
use crate::pipeline::beacon::{BeaconChannel, BeaconSender, HttpBeaconChannel};
use crate::pipeline::flush::FlushPolicy;
use crate::pipeline::queue::EventQueue;
use crate::pipeline::sampler::Sampler;
use crate::pipeline::sender::{HttpSender, HttpTransport, SenderConfig, Transport};
use crate::pipeline::spill::SpillStore;
use crate::replay::recorder::{RecorderState, ReplayConfig, ReplayRecorder};
use crate::replay::snapshot::SnapshotOptions;
use crate::runtime::bus::{BusHandler, EventBus, SubscriptionId};
use crate::runtime::plugin::{Plugin, PluginRegistry};
use crate::runtime::session::SessionManager;
use crate::runtime::storage::{KeyValueStore, StorageHandle};
use crate::utils::config::MonitorConfig;
use crate::utils::errors::Result;
use crate::utils::ids::{self, now_ms};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A point-in-time view of the core, for `getStatus`.
#[derive(Debug, Clone)]
pub struct MonitorStatus {
    pub running: bool,
    pub session_id: String,
    pub user_id: Option<String>,
    pub queued: usize,
    pub queue_dropped: u64,
    pub spilled: usize,
    pub events_admitted: u64,
    pub errors_captured: u64,
    pub errors_deduped: u64,
    pub replay_state: RecorderState,
}

/// Builder for [`Monitor`]; injection points default to production parts.
pub struct MonitorBuilder {
    config: MonitorConfig,
    page: Option<Arc<Page>>,
    transport: Option<Arc<dyn Transport>>,
    beacon_channel: Option<Arc<dyn BeaconChannel>>,
    session_store: Option<Box<dyn KeyValueStore>>,
    persistent_store: Option<Box<dyn KeyValueStore>>,
    sampler_seed: Option<u64>,
    flush_windows: Option<(u64, u64)>,
}

impl MonitorBuilder {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            page: None,
            transport: None,
            beacon_channel: None,
            session_store: None,
            persistent_store: None,
            sampler_seed: None,
            flush_windows: None,
        }
    }

    pub fn with_page(mut self, page: Arc<Page>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_beacon_channel(mut self, channel: Arc<dyn BeaconChannel>) -> Self {
        self.beacon_channel = Some(channel);
        self
    }

    pub fn with_session_store(mut self, store: Box<dyn KeyValueStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn with_persistent_store(mut self, store: Box<dyn KeyValueStore>) -> Self {
        self.persistent_store = Some(store);
        self
    }

    pub fn with_sampler_seed(mut self, seed: u64) -> Self {
        self.sampler_seed = Some(seed);
        self
    }

    /// Override the debounce/throttle flush windows (milliseconds).
    pub fn with_flush_windows(mut self, debounce_ms: u64, throttle_ms: u64) -> Self {
        self.flush_windows = Some((debounce_ms, throttle_ms));
        self
    }

    /// Validate the configuration and assemble the core.
    pub fn build(self) -> Result<Arc<Monitor>> {
        self.config.validate()?;
        let config = self.config;

        let page = self
            .page
            .unwrap_or_else(|| Page::new(PageInfo::default()));

        let session_store = Arc::new(StorageHandle::new(self.session_store, &config.app_id));
        let persistent_store = Arc::new(StorageHandle::new(self.persistent_store, &config.app_id));
        let session = SessionManager::new(session_store, Arc::clone(&persistent_store));

        let spill = Arc::new(SpillStore::new(persistent_store));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new()) as Arc<dyn Transport>);
        let sender = HttpSender::new(
            SenderConfig {
                endpoint: config.endpoint.clone(),
                api_key: config.api_key.clone(),
                batch_size: config.reporting.batch_size,
                max_retries: config.reporting.max_retries,
                timeout: Duration::from_millis(config.reporting.timeout_ms),
                ..Default::default()
            },
            transport,
            Arc::clone(&spill),
        );

        let beacon_channel = self
            .beacon_channel
            .unwrap_or_else(|| Arc::new(HttpBeaconChannel::new()) as Arc<dyn BeaconChannel>);
        let beacon = BeaconSender::new(
            beacon_channel,
            config.endpoint.clone(),
            config.api_key.clone(),
        );

        let sampler = match self.sampler_seed {
            Some(seed) => Sampler::with_seed(config.sampling.clone(), seed),
            None => Sampler::new(config.sampling.clone()),
        };

        let snapshot_options = SnapshotOptions {
            mask: config.privacy.mask_sensitive_data,
            blocked_selectors: config.privacy.blocked_elements.clone(),
        };
        let policy = match self.flush_windows {
            Some((debounce, throttle)) => FlushPolicy::new(debounce, throttle),
            None => FlushPolicy::default(),
        };

        if config.debug {
            info!(
                app_id = %config.app_id,
                endpoint = %config.endpoint,
                environment = config.environment.as_deref().unwrap_or("unset"),
                "monitor configured"
            );
        }

        Ok(Arc::new(Monitor {
            errors: Arc::new(ErrorCapture::new()),
            performance: Arc::new(PerformanceCapture::new()),
            behavior: Arc::new(BehaviorCapture::new(
                BehaviorConfig::default(),
                config.privacy.clone(),
            )),
            replay: Arc::new(ReplayRecorder::new(ReplayConfig::default(), snapshot_options)),
            config,
            page,
            queue: Arc::new(EventQueue::default()),
            sampler,
            sender: Arc::new(sender),
            spill,
            beacon,
            session,
            policy: Mutex::new(policy),
            activity: Arc::new(Notify::new()),
            bus: EventBus::new(),
            plugins: PluginRegistry::new(),
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            unload_listeners: Mutex::new(Vec::new()),
            admitted: AtomicU64::new(0),
        }))
    }
}

/// The monitoring core.
pub struct Monitor {
    config: MonitorConfig,
    page: Arc<Page>,
    queue: Arc<EventQueue>,
    sampler: Sampler,
    sender: Arc<HttpSender>,
    spill: Arc<SpillStore>,
    beacon: BeaconSender,
    session: SessionManager,
    errors: Arc<ErrorCapture>,
    performance: Arc<PerformanceCapture>,
    behavior: Arc<BehaviorCapture>,
    replay: Arc<ReplayRecorder>,
    policy: Mutex<FlushPolicy>,
    activity: Arc<Notify>,
    bus: EventBus,
    plugins: PluginRegistry,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    unload_listeners: Mutex<Vec<ListenerId>>,
    admitted: AtomicU64,
}

impl Monitor {
    pub fn builder(config: MonitorConfig) -> MonitorBuilder {
        MonitorBuilder::new(config)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    // ---- lifecycle ----

    /// Install captures, wire unload/online handling, and start the
    /// collection driver. Re-entrant start is a warning and a no-op.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if !self.domain_allowed() {
            warn!(url = %self.page.url(), "host not in allowedDomains, refusing to start");
            return Ok(());
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("monitor already started");
            return Ok(());
        }

        // Admission-driven wake-ups for the driver
        let activity = Arc::clone(&self.activity);
        self.errors
            .set_notifier(Arc::new(move || activity.notify_one()));
        let activity = Arc::clone(&self.activity);
        self.behavior
            .set_notifier(Arc::new(move || activity.notify_one()));

        // A capture that cannot install loses only its own capability
        if self.config.features.errors {
            if let Err(e) = self.errors.install(&self.page) {
                warn!(error = %e, "error capture disabled");
            }
        }
        if self.config.features.performance {
            if let Err(e) = self.performance.install(&self.page) {
                warn!(error = %e, "performance capture disabled");
            }
        }
        if self.config.features.behavior {
            if let Err(e) = self.behavior.install(&self.page) {
                warn!(error = %e, "behavior capture disabled");
            }
        }
        if self.config.features.replay {
            if let Err(e) = self.replay.start(&self.page) {
                warn!(error = %e, "replay recording disabled");
            }
        }

        self.install_unload_handling();
        self.spawn_driver();

        // Park from an earlier page view may still be waiting
        let weak = Arc::downgrade(self);
        self.spawn(async move {
            if let Some(monitor) = weak.upgrade() {
                if let Err(e) = monitor.sender.replay_spill().await {
                    debug!(error = %e, "startup spill replay failed");
                }
            }
        });

        self.bus.emit(
            "start",
            &serde_json::json!({ "sessionId": self.session.session_id() }),
        );
        info!(session_id = %self.session.session_id(), "monitor started");
        Ok(())
    }

    /// Tear everything down in reverse order, then final-flush and beacon.
    /// Idempotent; a second stop is a warning and a no-op.
    pub async fn stop(self: &Arc<Self>) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("monitor not running");
            return;
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        // Scoop everything still buffered before hooks disappear
        self.behavior.flush_gates();
        self.collect(true);

        self.plugins.shutdown();

        if self.replay.state() != RecorderState::Idle {
            self.replay.stop(&self.page);
        }
        self.behavior.uninstall(&self.page);
        self.performance.uninstall(&self.page);
        self.errors.uninstall(&self.page);

        for listener in self.unload_listeners.lock().drain(..).rev() {
            self.page.remove_listener(listener);
        }

        self.flush().await;
        // Anything the flush could not deliver was spilled; residue goes
        // out through the unload channel
        let residue = self.queue.drain(None);
        self.beacon.send(&residue);

        self.bus.emit("stop", &serde_json::Value::Null);
        info!("monitor stopped");
    }

    fn domain_allowed(&self) -> bool {
        let allowed = &self.config.privacy.allowed_domains;
        if allowed.is_empty() {
            return true;
        }
        let url = self.page.url();
        let Some(host) = host_of(&url) else {
            return false;
        };
        allowed
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{}", domain)))
    }

    fn install_unload_handling(self: &Arc<Self>) {
        let mut listeners = self.unload_listeners.lock();

        for kind in ["visibilitychange", "pagehide", "beforeunload"] {
            let weak = Arc::downgrade(self);
            listeners.push(self.page.add_listener(
                kind,
                ListenerOptions::default(),
                Arc::new(move |event| {
                    let Some(monitor) = weak.upgrade() else { return };
                    if event.kind == "visibilitychange"
                        && !matches!(
                            event.detail,
                            PageEventDetail::Visibility(Visibility::Hidden)
                        )
                    {
                        return;
                    }
                    monitor.handle_unload();
                }),
            ));
        }

        let weak = Arc::downgrade(self);
        listeners.push(self.page.add_listener(
            "online",
            ListenerOptions::default(),
            Arc::new(move |_| {
                let Some(monitor) = weak.upgrade() else { return };
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    return;
                };
                handle.spawn(async move {
                    if let Err(e) = monitor.sender.replay_spill().await {
                        debug!(error = %e, "online spill replay failed");
                    }
                });
            }),
        ));
    }

    fn spawn_driver(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let activity = Arc::clone(&self.activity);
        let flush_interval = Duration::from_millis(self.config.reporting.flush_interval_ms.max(1));

        self.spawn(async move {
            let mut next_periodic = tokio::time::Instant::now() + flush_interval;
            loop {
                let sleep_target = {
                    let Some(monitor) = weak.upgrade() else { break };
                    let now = now_ms();
                    let deadline = monitor.policy.lock().next_deadline();
                    match deadline {
                        Some(deadline) => {
                            let until_policy =
                                Duration::from_millis(deadline.saturating_sub(now));
                            next_periodic.min(tokio::time::Instant::now() + until_policy)
                        }
                        None => next_periodic,
                    }
                };

                tokio::select! {
                    _ = activity.notified() => {}
                    _ = tokio::time::sleep_until(sleep_target) => {}
                }

                let Some(monitor) = weak.upgrade() else { break };
                if !monitor.running.load(Ordering::Relaxed) {
                    break;
                }

                let periodic_due = tokio::time::Instant::now() >= next_periodic;
                monitor.collect(periodic_due);
                if periodic_due {
                    next_periodic = tokio::time::Instant::now() + flush_interval;
                }

                let policy_due = monitor.policy.lock().take_due(now_ms());
                if policy_due || periodic_due {
                    monitor.flush().await;
                }
            }
        });
    }

    fn spawn(&self, future: impl std::future::Future<Output = ()> + Send + 'static) {
        self.tasks.lock().push(tokio::spawn(future));
    }

    // ---- collection & admission ----

    /// Pull pending payloads from each capture and admit them.
    ///
    /// Performance and replay only produce on periodic cycles; error and
    /// behavior buffers drain on every pass.
    fn collect(&self, periodic: bool) {
        let now = now_ms();

        for pending in self.errors.drain_pending() {
            self.admit(EventPayload::Error(pending.payload), pending.timestamp);
        }
        for pending in self.behavior.drain_pending(now) {
            self.admit(EventPayload::Behavior(pending.payload), pending.timestamp);
        }

        if periodic {
            if self.config.features.performance {
                let payload = self.performance.collect(&self.page);
                self.admit(EventPayload::Performance(payload), now);
            }
            // Keyed off the recorder, not the feature flag: replay can be
            // started explicitly through the API
            if self.replay.state() != RecorderState::Idle {
                if let Some(payload) = self.replay.take_payload(&self.page) {
                    self.admit(EventPayload::Replay(payload), now);
                }
            }
        }
    }

    fn admit(&self, payload: EventPayload, timestamp: u64) {
        let event = MonitorEvent {
            envelope: self.envelope(timestamp),
            payload,
        };

        // Sampling is decided here, once; admitted events are only ever
        // dropped again by queue overflow
        if !self.sampler.admit(&event) {
            return;
        }

        let kind = event.kind();
        self.queue.enqueue(event);
        self.admitted.fetch_add(1, Ordering::Relaxed);
        self.policy.lock().on_admit(kind, now_ms());
    }

    fn envelope(&self, timestamp: u64) -> Envelope {
        Envelope {
            event_id: ids::event_id(),
            app_id: self.config.app_id.clone(),
            session_id: self.session.session_id().to_string(),
            user_id: self.session.user_id(),
            timestamp,
            page_url: self.page.url(),
            user_agent: self.page.user_agent().to_string(),
            device_info: self.page.device_info(),
        }
    }

    /// Drain the queue and send. The drain happens before any await, so
    /// admissions during the POST land in the next batch.
    pub async fn flush(&self) {
        let events = self.queue.drain(None);
        self.policy.lock().clear();
        if events.is_empty() {
            return;
        }

        let report = self.sender.send(events).await;
        if !report.is_ok() {
            warn!(
                spilled = report.spilled,
                failures = report.failures.len(),
                "flush completed with failures"
            );
        }
    }

    /// Unload path: release gates, make a final collection pass, and hand
    /// the drained queue to the beacon. Failure is silent by contract.
    fn handle_unload(&self) {
        self.behavior.flush_gates();
        self.collect(true);
        let events = self.queue.drain(None);
        self.policy.lock().clear();
        let _ = self.beacon.send(&events);
    }

    // ---- public API surface ----

    /// Record an application-defined event.
    pub fn track(&self, name: &str, properties: Option<serde_json::Value>) {
        if !self.is_running() {
            warn!("track called before start");
            return;
        }
        self.behavior.track_custom(name, properties.clone());
        self.bus.emit(
            "track",
            &serde_json::json!({
                "name": name,
                "properties": properties.unwrap_or(serde_json::Value::Null),
            }),
        );
    }

    pub fn set_user(&self, id: &str, properties: Option<serde_json::Value>) {
        self.session.set_user(id, properties);
    }

    pub fn clear_user(&self) {
        self.session.clear_user();
    }

    /// Capture a caught exception on behalf of the application.
    pub fn capture_exception(
        &self,
        message: &str,
        stack: Option<&str>,
        context: Option<&serde_json::Value>,
        severity: Option<Severity>,
    ) {
        self.errors.capture_exception(message, stack, context, severity);
    }

    /// Capture a free-form message at a chosen level.
    pub fn capture_message(
        &self,
        message: &str,
        level: Option<Severity>,
        context: Option<&serde_json::Value>,
    ) {
        self.errors.capture_message(message, level, context);
    }

    pub fn mark(&self, name: &str) {
        self.performance.mark(&self.page, name);
    }

    pub fn measure(&self, name: &str, start: Option<&str>, end: Option<&str>) -> Result<f64> {
        self.performance.measure(&self.page, name, start, end)
    }

    pub fn start_replay(self: &Arc<Self>) -> Result<()> {
        self.replay.start(&self.page)
    }

    pub fn stop_replay(&self) {
        self.replay.stop(&self.page);
    }

    pub fn pause_replay(&self) {
        self.replay.pause();
    }

    pub fn resume_replay(&self) {
        self.replay.resume();
    }

    pub fn get_status(&self) -> MonitorStatus {
        let queue_stats = self.queue.stats();
        MonitorStatus {
            running: self.is_running(),
            session_id: self.session.session_id().to_string(),
            user_id: self.session.user_id(),
            queued: queue_stats.current_size,
            queue_dropped: queue_stats.drop_count,
            spilled: self.spill.len(),
            events_admitted: self.admitted.load(Ordering::Relaxed),
            errors_captured: self.errors.captured_count(),
            errors_deduped: self.errors.deduped_count(),
            replay_state: self.replay.state(),
        }
    }

    /// Install a plugin; duplicate names warn and no-op.
    pub fn use_plugin(self: &Arc<Self>, plugin: Arc<dyn Plugin>) -> bool {
        self.plugins.install(self, plugin)
    }

    /// Remove a plugin by name, running its uninstall hook.
    pub fn unuse_plugin(&self, name: &str) -> bool {
        self.plugins.remove(name)
    }

    pub fn on(&self, event: &str, handler: BusHandler) -> SubscriptionId {
        self.bus.on(event, handler)
    }

    pub fn off(&self, event: &str, subscription: Option<SubscriptionId>) {
        self.bus.off(event, subscription)
    }
}

fn host_of(url: &str) -> Option<&str> {
    let after_scheme = match url.find("://") {
        Some(at) => &url[at + 3..],
        None => url,
    };
    let host_port = after_scheme.split(['/', '?', '#']).next()?;
    let host = host_port.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
