// packages/sdk/src/replay/recorder.rs
//! Replay recorder
//!
//! An initial full snapshot plus an incremental mutation/interaction log,
//! bounded by record count (oldest-drop) and by recording duration (hard
//! stop). Recording only starts when the host exposes both mutation and
//! intersection observers. `paused` suspends admission but keeps every
//! observer installed; `stopped` resets the accumulated records.

use crate::capture::throttle::Throttle;
use crate::dom::{DomMutation, MutationKind, MutationObserverOptions, ObserverId};
use crate::event::types::{
    Coordinates, InteractionDelta, IntersectionDelta, MutationDelta, ReplayPayload, ReplayRecord,
    ReplayRecordData, ResizeDelta, ScrollDelta, Viewport,
};
use crate::host::page::{ListenerId, ListenerOptions, Page, PageEvent, PageEventDetail, Visibility};
use crate::replay::snapshot::{full_snapshot, is_sensitive_element, serialize_node, SnapshotOptions, MASKED_TEXT};
use crate::utils::errors::{MonitorError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum records per transmitted replay event.
pub const DEFAULT_MAX_RECORDS: usize = 1_000;

/// Maximum span between the first record and any later admission.
pub const DEFAULT_MAX_DURATION_MS: u64 = 60_000;

/// Recorder states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    Stopped,
}

/// Replay recorder tunables.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub max_records: usize,

    pub max_duration_ms: u64,

    pub scroll_throttle_ms: u64,

    pub mousemove_throttle_ms: u64,

    pub resize_throttle_ms: u64,

    /// Opt-in mouse movement records
    pub track_mouse_moves: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
            scroll_throttle_ms: 100,
            mousemove_throttle_ms: 50,
            resize_throttle_ms: 250,
            track_mouse_moves: false,
        }
    }
}

struct ReplayGates {
    scroll: Throttle,
    mousemove: Throttle,
    resize: Throttle,
}

#[derive(Default)]
struct ReplayInstalled {
    mutation_observer: Option<ObserverId>,
    intersection_observer: Option<ObserverId>,
    listeners: Vec<ListenerId>,
}

/// The replay recorder component.
pub struct ReplayRecorder {
    config: ReplayConfig,
    options: SnapshotOptions,
    state: Mutex<RecorderState>,
    records: Mutex<VecDeque<ReplayRecord>>,
    first_record_ts: Mutex<Option<u64>>,
    dropped: AtomicU64,
    gates: Mutex<ReplayGates>,
    installed: Mutex<ReplayInstalled>,
}

impl ReplayRecorder {
    pub fn new(config: ReplayConfig, options: SnapshotOptions) -> Self {
        let gates = ReplayGates {
            scroll: Throttle::new(config.scroll_throttle_ms),
            mousemove: Throttle::new(config.mousemove_throttle_ms),
            resize: Throttle::new(config.resize_throttle_ms),
        };
        Self {
            config,
            options,
            state: Mutex::new(RecorderState::Idle),
            records: Mutex::new(VecDeque::new()),
            first_record_ts: Mutex::new(None),
            dropped: AtomicU64::new(0),
            gates: Mutex::new(gates),
            installed: Mutex::new(ReplayInstalled::default()),
        }
    }

    pub fn state(&self) -> RecorderState {
        *self.state.lock()
    }

    /// Begin recording: snapshot the document, then observe deltas.
    pub fn start(self: &Arc<Self>, page: &Arc<Page>) -> Result<()> {
        let capabilities = page.capabilities();
        if !capabilities.mutation_observer || !capabilities.intersection_observer {
            return Err(MonitorError::ReplayFailed(
                "mutation and intersection observers are required".to_string(),
            ));
        }

        {
            let mut state = self.state.lock();
            match *state {
                RecorderState::Recording | RecorderState::Paused => {
                    warn!("replay recorder already running");
                    return Ok(());
                }
                RecorderState::Idle | RecorderState::Stopped => {
                    *state = RecorderState::Recording;
                }
            }
        }

        self.records.lock().clear();
        *self.first_record_ts.lock() = None;
        self.dropped.store(0, Ordering::Relaxed);

        // Base record: the full document serialization
        let (width, height) = page.viewport();
        let timestamp = crate::utils::ids::now_ms();
        if let Some(snapshot) = full_snapshot(
            page.document(),
            page.url(),
            Viewport { width, height },
            &self.options,
        ) {
            self.admit(ReplayRecord {
                timestamp,
                data: ReplayRecordData::Dom(snapshot),
            });
        }

        let mut installed = self.installed.lock();

        let recorder = Arc::downgrade(self);
        let weak_page = Arc::downgrade(page);
        installed.mutation_observer = Some(page.document().observe_mutations(
            MutationObserverOptions::default(),
            Arc::new(move |mutation| {
                if let (Some(recorder), Some(page)) = (recorder.upgrade(), weak_page.upgrade()) {
                    recorder.on_mutation(&page, mutation);
                }
            }),
        ));

        // Media elements present at start
        let media: Vec<crate::dom::NodeId> = page
            .document()
            .elements_by_tag("img")
            .into_iter()
            .chain(page.document().elements_by_tag("video"))
            .collect();
        let recorder = Arc::downgrade(self);
        installed.intersection_observer = Some(page.document().observe_intersections(
            media,
            Arc::new(move |change| {
                if let Some(recorder) = recorder.upgrade() {
                    recorder.admit(ReplayRecord {
                        timestamp: crate::utils::ids::now_ms(),
                        data: ReplayRecordData::Intersection(IntersectionDelta {
                            target_path: change.path.clone(),
                            ratio: change.ratio,
                            is_intersecting: change.is_intersecting,
                        }),
                    });
                }
            }),
        ));

        let mut kinds: Vec<(&str, ListenerOptions)> = vec![
            ("click", ListenerOptions::passive()),
            ("input", ListenerOptions::capture()),
            ("change", ListenerOptions::capture()),
            ("focus", ListenerOptions::capture()),
            ("blur", ListenerOptions::capture()),
            ("scroll", ListenerOptions::passive()),
            ("resize", ListenerOptions::passive()),
            ("visibilitychange", ListenerOptions::passive()),
        ];
        if self.config.track_mouse_moves {
            kinds.push(("mousemove", ListenerOptions::passive()));
        }
        for (kind, options) in kinds {
            let recorder = Arc::downgrade(self);
            let weak_page = Arc::downgrade(page);
            installed.listeners.push(page.add_listener(
                kind,
                options,
                Arc::new(move |event| {
                    if let (Some(recorder), Some(page)) = (recorder.upgrade(), weak_page.upgrade())
                    {
                        recorder.on_page_event(&page, event);
                    }
                }),
            ));
        }

        debug!("replay recording started");
        Ok(())
    }

    /// Suspend admission; observers stay installed.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if *state == RecorderState::Recording {
            *state = RecorderState::Paused;
            debug!("replay recording paused");
        }
    }

    /// Resume admission after a pause.
    pub fn resume(&self) {
        let mut state = self.state.lock();
        if *state == RecorderState::Paused {
            *state = RecorderState::Recording;
            debug!("replay recording resumed");
        }
    }

    /// Stop recording, tear down observers, and reset accumulated records.
    pub fn stop(&self, page: &Page) {
        {
            let mut state = self.state.lock();
            if matches!(*state, RecorderState::Idle | RecorderState::Stopped) {
                return;
            }
            *state = RecorderState::Stopped;
        }

        let mut installed = self.installed.lock();
        for id in installed.listeners.drain(..).rev() {
            page.remove_listener(id);
        }
        if let Some(id) = installed.intersection_observer.take() {
            page.document().disconnect_intersections(id);
        }
        if let Some(id) = installed.mutation_observer.take() {
            page.document().disconnect_mutations(id);
        }

        self.records.lock().clear();
        *self.first_record_ts.lock() = None;
        debug!("replay recording stopped");
    }

    // ---- record admission ----

    fn admit(&self, record: ReplayRecord) {
        {
            let state = self.state.lock();
            if *state != RecorderState::Recording {
                return;
            }
        }

        // Duration budget: a recording that outlives its window stops
        let mut first_ts = self.first_record_ts.lock();
        match *first_ts {
            None => *first_ts = Some(record.timestamp),
            Some(first) => {
                if record.timestamp.saturating_sub(first) > self.config.max_duration_ms {
                    drop(first_ts);
                    *self.state.lock() = RecorderState::Stopped;
                    warn!("replay duration budget exceeded, recording stopped");
                    return;
                }
            }
        }
        drop(first_ts);

        let mut records = self.records.lock();
        if records.len() >= self.config.max_records {
            records.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        records.push_back(record);
    }

    fn on_mutation(&self, page: &Page, mutation: &DomMutation) {
        let doc = page.document();
        let serialize =
            |nodes: &[crate::dom::NodeId]| -> Vec<crate::event::types::SerializedNode> {
                nodes
                    .iter()
                    .filter_map(|&n| serialize_node(doc, n, &self.options))
                    .collect()
            };

        let delta = MutationDelta {
            target_path: mutation.target_path.clone(),
            added: serialize(&mutation.added),
            removed: serialize(&mutation.removed),
            attribute_name: mutation.attribute_name.clone(),
            old_value: match mutation.kind {
                // Masked attributes must not leak through old values
                MutationKind::Attributes
                    if mutation
                        .attribute_name
                        .as_deref()
                        .is_some_and(|name| {
                            crate::replay::snapshot::SENSITIVE_ATTRIBUTES.contains(&name)
                        }) =>
                {
                    mutation.old_value.as_ref().map(|_| MASKED_TEXT.to_string())
                }
                _ => mutation.old_value.clone(),
            },
        };

        self.admit(ReplayRecord {
            timestamp: crate::utils::ids::now_ms(),
            data: ReplayRecordData::Mutation(delta),
        });
    }

    fn on_page_event(&self, page: &Page, event: &PageEvent) {
        let doc = page.document();
        let target_path = event.target.and_then(|t| doc.node_path(t));

        let data = match event.kind.as_str() {
            "scroll" => {
                if !self.gates.lock().scroll.allow(event.timestamp) {
                    return;
                }
                match event.detail {
                    PageEventDetail::Scroll { x, y } => {
                        ReplayRecordData::Scroll(ScrollDelta { x, y })
                    }
                    _ => return,
                }
            }
            "resize" => {
                if !self.gates.lock().resize.allow(event.timestamp) {
                    return;
                }
                match event.detail {
                    PageEventDetail::Resize { width, height } => {
                        ReplayRecordData::Resize(ResizeDelta { width, height })
                    }
                    _ => return,
                }
            }
            "mousemove" => {
                if !self.gates.lock().mousemove.allow(event.timestamp) {
                    return;
                }
                match event.detail {
                    PageEventDetail::Pointer { x, y } => {
                        ReplayRecordData::Input(InteractionDelta {
                            action: "mousemove".to_string(),
                            target_path,
                            coordinates: Some(Coordinates { x, y }),
                            value: None,
                        })
                    }
                    _ => return,
                }
            }
            "input" | "change" => {
                let value = match (&event.detail, event.target) {
                    (PageEventDetail::Input { value }, Some(target)) => {
                        if is_sensitive_element(doc, target, &self.options) {
                            Some(serde_json::Value::String(MASKED_TEXT.to_string()))
                        } else {
                            Some(serde_json::json!({
                                "length": value.chars().count(),
                                "isEmpty": value.is_empty(),
                            }))
                        }
                    }
                    _ => None,
                };
                ReplayRecordData::Input(InteractionDelta {
                    action: event.kind.clone(),
                    target_path,
                    coordinates: None,
                    value,
                })
            }
            "click" | "focus" | "blur" => {
                let coordinates = match event.detail {
                    PageEventDetail::Pointer { x, y } => Some(Coordinates { x, y }),
                    _ => None,
                };
                ReplayRecordData::Input(InteractionDelta {
                    action: event.kind.clone(),
                    target_path,
                    coordinates,
                    value: None,
                })
            }
            "visibilitychange" => {
                let state = match event.detail {
                    PageEventDetail::Visibility(Visibility::Hidden) => "hidden",
                    _ => "visible",
                };
                ReplayRecordData::Input(InteractionDelta {
                    action: "visibility".to_string(),
                    target_path: None,
                    coordinates: None,
                    value: Some(serde_json::Value::String(state.to_string())),
                })
            }
            _ => return,
        };

        self.admit(ReplayRecord {
            timestamp: event.timestamp,
            data,
        });
    }

    // ---- collection ----

    /// Drain accumulated records into one replay payload.
    ///
    /// The first record of any transmission is a full snapshot; when
    /// oldest-drop evicted the original base record, a fresh snapshot is
    /// taken and prepended.
    pub fn take_payload(&self, page: &Page) -> Option<ReplayPayload> {
        let mut records: Vec<ReplayRecord> = {
            let mut held = self.records.lock();
            if held.is_empty() {
                return None;
            }
            held.drain(..).collect()
        };

        if !records[0].is_snapshot() {
            let (width, height) = page.viewport();
            if let Some(snapshot) = full_snapshot(
                page.document(),
                page.url(),
                Viewport { width, height },
                &self.options,
            ) {
                records.insert(
                    0,
                    ReplayRecord {
                        timestamp: records[0].timestamp,
                        data: ReplayRecordData::Dom(snapshot),
                    },
                );
            }
        }

        Some(ReplayPayload { events: records })
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
