// packages/sdk/src/pipeline/flush.rs
//! Flush scheduling policy
//!
//! Two admission-driven triggers on top of periodic collection:
//!
//! - **Debounced**: error admissions schedule a trailing flush; bursts
//!   coalesce because each admission pushes the deadline out again.
//! - **Throttled**: the first non-error admission anchors a window; the
//!   flush fires at the window's end no matter how many more arrive.
//!
//! The policy is a pure state machine over caller-supplied clocks; a
//! driver task owns the actual timers.

/// Default trailing delay after an error admission.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;

/// Default window for non-error admissions.
pub const DEFAULT_THROTTLE_MS: u64 = 5_000;

use crate::event::types::EventKind;

/// Admission-driven flush deadlines.
#[derive(Debug)]
pub struct FlushPolicy {
    debounce_ms: u64,
    throttle_ms: u64,
    debounce_deadline: Option<u64>,
    throttle_deadline: Option<u64>,
}

impl FlushPolicy {
    pub fn new(debounce_ms: u64, throttle_ms: u64) -> Self {
        Self {
            debounce_ms,
            throttle_ms,
            debounce_deadline: None,
            throttle_deadline: None,
        }
    }

    /// Note an admission at `now_ms` and update deadlines.
    pub fn on_admit(&mut self, kind: EventKind, now_ms: u64) {
        match kind {
            EventKind::Error => {
                self.debounce_deadline = Some(now_ms + self.debounce_ms);
            }
            _ => {
                if self.throttle_deadline.is_none() {
                    self.throttle_deadline = Some(now_ms + self.throttle_ms);
                }
            }
        }
    }

    /// The earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        match (self.debounce_deadline, self.throttle_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Whether a flush is due at `now_ms`; clears all deadlines when it is.
    ///
    /// A flush drains the whole queue, so both triggers are satisfied by
    /// one firing.
    pub fn take_due(&mut self, now_ms: u64) -> bool {
        let due = self.next_deadline().is_some_and(|d| d <= now_ms);
        if due {
            self.clear();
        }
        due
    }

    /// Drop all pending deadlines (used after an explicit flush).
    pub fn clear(&mut self) {
        self.debounce_deadline = None;
        self.throttle_deadline = None;
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_MS, DEFAULT_THROTTLE_MS)
    }
}
