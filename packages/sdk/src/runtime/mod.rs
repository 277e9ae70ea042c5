// packages/sdk/src/runtime/mod.rs
//! Core runtime
//!
//! Everything that outlives a single capture:
//!
//! - **Storage**: the two key/value store lifetimes with fallback
//! - **Session**: session and user identity
//! - **Bus**: named subscribe/emit surface
//! - **Plugin**: named extension registry
//! - **Monitor**: the orchestrator and public API of the core

pub mod bus;
pub mod monitor;
pub mod plugin;
pub mod session;
pub mod storage;

pub use bus::{BusHandler, EventBus, SubscriptionId};
pub use monitor::{Monitor, MonitorBuilder, MonitorStatus};
pub use plugin::{Plugin, PluginRegistry};
pub use session::{SessionManager, UserIdentity};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore, StorageHandle};
