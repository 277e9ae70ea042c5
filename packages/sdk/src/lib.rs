// packages/sdk/src/lib.rs
//! Lookout SDK Core
//!
//! A host-embeddable monitoring core: it observes a running page, captures
//! errors, performance measurements, user interactions, and optional
//! replay traces, then ships them to a remote collector with bounded
//! memory, bounded bandwidth, and at-least-once delivery across unloads
//! and transient network failures.
//!
//! # Architecture
//!
//! - **event**: the common envelope and the tagged event union
//! - **pipeline**: queue, sampler, flush policy, batch sender, spill, beacon
//! - **host**: the observable page surface (hooks, listeners, timeline)
//! - **dom**: the observable document tree and element paths
//! - **capture**: error / performance / behavior capture with redaction
//! - **replay**: snapshot-plus-deltas session recording
//! - **runtime**: storage, identity, plugins, and the `Monitor` orchestrator
//!
//! ```text
//! host signals → capture → sample → queue → batch POST → collector
//!                                     │          └─ fail → spill → retry
//!                                     └─ unload → beacon
//! ```

pub mod capture;
pub mod dom;
pub mod event;
pub mod host;
pub mod pipeline;
pub mod replay;
pub mod runtime;
pub mod utils;

// Re-export the surface most embedders need
pub use event::{EventKind, MonitorEvent, Severity};
pub use host::{HostCapabilities, Page, PageInfo};
pub use runtime::{Monitor, MonitorBuilder, MonitorStatus, Plugin};
pub use utils::{MonitorConfig, MonitorError, Result};

/// SDK version, reported in every batch and beacon body.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
