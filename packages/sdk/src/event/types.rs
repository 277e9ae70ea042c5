// packages/sdk/src/event/types.rs
//! Event records
//!
//! Events are a closed tagged union keyed by `type`: performance, error,
//! behavior, and replay. Every variant carries the common envelope plus a
//! kind-specific payload; handling is exhaustive everywhere.

use crate::event::envelope::Envelope;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Event kind discriminator, used for sampling and flush-policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Performance,
    Error,
    Behavior,
    Replay,
}

/// Error severity, totally ordered from `Low` to `Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Where an error originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Javascript,
    Network,
    Promise,
    Custom,
}

/// User interaction kinds recorded by behavior capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorAction {
    Click,
    Scroll,
    Input,
    Change,
    Navigate,
    Focus,
    Blur,
    Visibility,
    Resize,
    Custom,
}

/// Error event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_type: ErrorKind,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,

    pub severity: Severity,

    /// Free-form context, scrubbed before admission
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,

    /// Stable hash of (message, fileName, line, column); dedup key
    pub fingerprint: String,
}

/// Aggregated timing metrics for one collection cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lcp: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fid: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cls: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcp: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttfb: Option<f64>,

    pub page_load_time: f64,

    pub dom_ready_time: f64,

    pub resource_load_time: f64,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub custom_metrics: HashMap<String, f64>,
}

/// One resource timing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTiming {
    pub name: String,
    pub entry_type: String,
    pub start_time: f64,
    pub duration: f64,
    pub transfer_size: u64,
    pub encoded_body_size: u64,
    pub decoded_body_size: u64,
}

/// Performance event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformancePayload {
    pub metrics: PerformanceMetrics,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceTiming>,
}

/// Pointer coordinates for click-like interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
}

/// Behavior event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorPayload {
    pub action: BehaviorAction,

    /// CSS path of the interaction target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Action-specific value (masked or summarized for inputs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

/// A serialized document node, as shipped inside replay records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SerializedNode {
    #[serde(rename_all = "camelCase")]
    Element {
        tag_name: String,
        attributes: BTreeMap<String, String>,
        children: Vec<SerializedNode>,
    },
    #[serde(rename_all = "camelCase")]
    Text { text_content: String },
}

impl SerializedNode {
    /// Number of element children (text children excluded).
    pub fn element_child_count(&self) -> usize {
        match self {
            SerializedNode::Element { children, .. } => children
                .iter()
                .filter(|c| matches!(c, SerializedNode::Element { .. }))
                .count(),
            SerializedNode::Text { .. } => 0,
        }
    }
}

/// Viewport dimensions at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// The base record of a replay transmission: a full document serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDelta {
    pub full_snapshot: bool,
    pub node: SerializedNode,
    pub viewport: Viewport,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctype: Option<String>,
}

/// A DOM mutation delta keyed to the target's node path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationDelta {
    pub target_path: Vec<usize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<SerializedNode>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<SerializedNode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
}

/// An interaction delta (click, input, focus, blur, visibility, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionDelta {
    /// Which interaction produced this record
    pub action: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<Vec<usize>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// A scroll position delta.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScrollDelta {
    pub x: i32,
    pub y: i32,
}

/// A viewport resize delta.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResizeDelta {
    pub width: u32,
    pub height: u32,
}

/// An element visibility change from the intersection stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionDelta {
    pub target_path: Vec<usize>,
    pub ratio: f64,
    pub is_intersecting: bool,
}

/// Replay record kinds; a closed set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ReplayRecordData {
    Dom(SnapshotDelta),
    Input(InteractionDelta),
    Scroll(ScrollDelta),
    Mutation(MutationDelta),
    Resize(ResizeDelta),
    Intersection(IntersectionDelta),
}

/// One entry in a replay payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub timestamp: u64,

    #[serde(flatten)]
    pub data: ReplayRecordData,
}

impl ReplayRecord {
    /// Whether this record is a full-snapshot base record.
    pub fn is_snapshot(&self) -> bool {
        matches!(
            &self.data,
            ReplayRecordData::Dom(s) if s.full_snapshot
        )
    }
}

/// Replay event payload: a snapshot followed by deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayPayload {
    pub events: Vec<ReplayRecord>,
}

/// Kind-specific payload, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventPayload {
    Performance(PerformancePayload),
    Error(ErrorPayload),
    Behavior(BehaviorPayload),
    Replay(ReplayPayload),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Performance(_) => EventKind::Performance,
            EventPayload::Error(_) => EventKind::Error,
            EventPayload::Behavior(_) => EventKind::Behavior,
            EventPayload::Replay(_) => EventKind::Replay,
        }
    }
}

/// A complete event: envelope plus payload, flattened on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    #[serde(flatten)]
    pub envelope: Envelope,

    #[serde(flatten)]
    pub payload: EventPayload,
}

impl MonitorEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::envelope::DeviceInfo;

    fn test_envelope() -> Envelope {
        Envelope {
            event_id: "evt_1".to_string(),
            app_id: "app".to_string(),
            session_id: "s1".to_string(),
            user_id: Some("u1".to_string()),
            timestamp: 1000,
            page_url: "https://app.example/".to_string(),
            user_agent: "TestAgent/1.0".to_string(),
            device_info: DeviceInfo::default(),
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::High >= Severity::High);
    }

    #[test]
    fn test_error_event_wire_format() {
        let event = MonitorEvent {
            envelope: test_envelope(),
            payload: EventPayload::Error(ErrorPayload {
                error_type: ErrorKind::Javascript,
                message: "Boom".to_string(),
                stack_trace: None,
                file_name: Some("app.js".to_string()),
                line_number: Some(10),
                column_number: Some(3),
                severity: Severity::High,
                context: serde_json::Value::Null,
                fingerprint: "abcd".to_string(),
            }),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["errorType"], "javascript");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["lineNumber"], 10);
        assert_eq!(json["eventId"], "evt_1");

        let back: MonitorEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), EventKind::Error);
    }

    #[test]
    fn test_replay_record_wire_format() {
        let record = ReplayRecord {
            timestamp: 42,
            data: ReplayRecordData::Scroll(ScrollDelta { x: 0, y: 300 }),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "scroll");
        assert_eq!(json["timestamp"], 42);
        assert_eq!(json["data"]["y"], 300);
    }

    #[test]
    fn test_element_child_count_ignores_text() {
        let node = SerializedNode::Element {
            tag_name: "div".to_string(),
            attributes: BTreeMap::new(),
            children: vec![
                SerializedNode::Text {
                    text_content: "hello".to_string(),
                },
                SerializedNode::Element {
                    tag_name: "span".to_string(),
                    attributes: BTreeMap::new(),
                    children: vec![],
                },
            ],
        };

        assert_eq!(node.element_child_count(), 1);
    }

    #[test]
    fn test_behavior_event_kind() {
        let event = MonitorEvent {
            envelope: test_envelope(),
            payload: EventPayload::Behavior(BehaviorPayload {
                action: BehaviorAction::Click,
                target: Some("div#root > button.buy".to_string()),
                value: None,
                coordinates: Some(Coordinates { x: 10, y: 20 }),
                duration: None,
                context: None,
            }),
        };

        assert_eq!(event.kind(), EventKind::Behavior);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "click");
        assert_eq!(json["coordinates"]["x"], 10);
    }
}
