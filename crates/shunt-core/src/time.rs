//! Time utilities for shunt
//!
//! Heartbeat frames carry wall-clock timestamps so the relay can log the
//! control channel round-trip time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is set before the Unix epoch.
///
/// # Examples
/// ```
/// use shunt_core::time::current_time_millis;
///
/// let now = current_time_millis();
/// assert!(now > 0);
/// ```
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Milliseconds elapsed since `since`, or 0 if it lies in the future.
fn elapsed_millis(since: u64) -> u64 {
    current_time_millis().saturating_sub(since)
}

/// Round-trip time for a heartbeat stamped at `sent_at_millis`.
pub fn round_trip(sent_at_millis: u64) -> Duration {
    Duration::from_millis(elapsed_millis(sent_at_millis))
}
