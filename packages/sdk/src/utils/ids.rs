// packages/sdk/src/utils/ids.rs
//! Identifier generation and wall-clock helpers

use chrono::Utc;
use rand::Rng;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Generate a unique event identifier.
///
/// Millisecond timestamp plus 48 bits of entropy; unique within a session.
pub fn event_id() -> String {
    let entropy: u64 = rand::thread_rng().gen_range(0..(1u64 << 48));
    format!("evt_{}_{:012x}", now_ms(), entropy)
}

/// Generate a session identifier from the current time and random entropy.
pub fn session_id() -> String {
    let entropy: u32 = rand::thread_rng().gen();
    format!("{}-{:08x}", now_ms(), entropy)
}
