// packages/sdk/src/replay/mod.rs
//! Session replay
//!
//! - **Snapshot**: masked serialization of the document tree
//! - **Recorder**: snapshot-plus-deltas log with time and record budgets
//!
//! A transmitted replay always begins with a full snapshot; every later
//! record is a delta keyed to node paths from the same path rule.

pub mod recorder;
pub mod snapshot;

pub use recorder::{RecorderState, ReplayConfig, ReplayRecorder};
pub use snapshot::{
    full_snapshot, is_sensitive_element, serialize_node, SnapshotOptions, MASKED_TEXT,
    SENSITIVE_ATTRIBUTES, SENSITIVE_SELECTORS,
};
