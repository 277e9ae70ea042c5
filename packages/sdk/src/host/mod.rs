// packages/sdk/src/host/mod.rs
//! Host page surface
//!
//! The browser-facing boundary of the core, modeled explicitly so capture
//! stays deterministic under test:
//!
//! - **Hooks**: save-and-chain slots for global handlers and transports
//! - **Page**: URL/visibility/viewport state and the listener registry
//! - **Timeline**: buffered performance entries and observer streams
//!
//! The host embedding drives this surface; the SDK observes it and never
//! mutates the document.

pub mod hooks;
pub mod page;
pub mod timeline;

pub use hooks::{
    ErrorHandler, GlobalHooks, HistoryHandler, HookSlot, NetFailure, NetHandler, NetRequest,
    NetResponse, RejectionHandler, RejectionReason, RuntimeErrorInfo,
};
pub use page::{
    HostCapabilities, ListenerId, ListenerOptions, Page, PageEvent, PageEventDetail, PageInfo,
    PageListener, Visibility,
};
pub use timeline::{EntryCallback, NavigationTiming, PerformanceEntry, PerformanceTimeline};
