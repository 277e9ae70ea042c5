// packages/sdk/src/event/mod.rs
//! Event model
//!
//! - **Envelope**: common header carried by every record
//! - **Types**: the tagged event union and per-kind payloads
//! - **Fingerprint**: deterministic error dedup hash

pub mod envelope;
pub mod fingerprint;
pub mod types;

pub use envelope::{DeviceInfo, Envelope};
pub use fingerprint::fingerprint;
pub use types::{
    BehaviorAction, BehaviorPayload, Coordinates, ErrorKind, ErrorPayload, EventKind,
    EventPayload, InteractionDelta, IntersectionDelta, MonitorEvent, MutationDelta,
    PerformanceMetrics, PerformancePayload, ReplayPayload, ReplayRecord, ReplayRecordData,
    ResizeDelta, ResourceTiming, ScrollDelta, SerializedNode, Severity, SnapshotDelta,
    Viewport,
};
