//! Control channel health monitoring

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

use shunt_core::time::{current_time_millis, round_trip};
use shunt_protocol::Message;

/// Heartbeat schedule and liveness limit for a control channel
#[derive(Debug, Clone, Copy)]
pub struct HealthMonitor {
    /// Heartbeat interval
    pub interval: Duration,
    /// Drop the channel after this long without any frame from the agent
    pub timeout: Duration,
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Ticker for outgoing heartbeats; the first tick is one interval out
    pub fn ticker(&self) -> Interval {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Heartbeat stamped with the current time
    pub fn heartbeat(&self) -> Message {
        Message::Heartbeat {
            timestamp: current_time_millis(),
        }
    }

    /// Round-trip time for an acknowledged heartbeat
    pub fn ack_latency(&self, timestamp: u64) -> Duration {
        round_trip(timestamp)
    }
}
