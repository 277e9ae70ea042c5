// packages/sdk/src/capture/mod.rs
//! Capture engine
//!
//! Transforms raw host signals into uniform event payloads:
//!
//! - **Errors**: global handler, rejections, resource failures, intercepted
//!   fetch/XHR, with fingerprint dedup and redaction
//! - **Performance**: navigation timing, web vitals, custom marks/measures
//! - **Behavior**: interactions with rate gates and input masking
//! - **Redaction**: PII scrubbing shared by all captures
//! - **Throttle**: clock-injected throttle/debounce gates
//!
//! Every installation chains the prior handler and is reverted on stop.

pub mod behavior;
pub mod errors;
pub mod performance;
pub mod redaction;
pub mod throttle;

pub use behavior::{BehaviorCapture, BehaviorConfig, PendingBehavior, MASKED_VALUE};
pub use errors::{derive_severity, ActivityNotifier, ErrorCapture, PendingError};
pub use performance::PerformanceCapture;
pub use redaction::Redactor;
pub use throttle::{Debounce, Throttle};
