//! Core runtime configuration shared by the producer and edge roles.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    BRIDGE_RECONNECT_DELAY_MS, DEFAULT_POLL_INTERVAL_SECS, EVENT_CHANNEL_CAPACITY,
    HEARTBEAT_TIMEOUT_SECS, POLL_BACKOFF_MAX_STEPS, POLL_BACKOFF_STEP_SECS,
};

/// Configuration for the distribution engine.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    // Polling
    /// Default interval between upstream fetches (seconds).
    pub poll_interval_secs: u64,

    /// Backoff step added to the interval after a failed fetch (seconds).
    pub poll_step_secs: u64,

    /// Maximum number of backoff steps above the default interval.
    pub poll_max_steps: u32,

    /// Capacity of the producer's event fan-out channel.
    pub event_channel_capacity: usize,

    // WebSocket
    /// Heartbeat window advertised to subscribers (seconds).
    pub heartbeat_timeout_secs: u64,

    // Bridge
    /// Delay before the edge reconnects to the producer (milliseconds).
    pub bridge_reconnect_delay_ms: u64,

    // HTTP
    /// Origin prefixes allowed by CORS. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            poll_step_secs: POLL_BACKOFF_STEP_SECS,
            poll_max_steps: POLL_BACKOFF_MAX_STEPS,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
            heartbeat_timeout_secs: HEARTBEAT_TIMEOUT_SECS,
            bridge_reconnect_delay_ms: BRIDGE_RECONNECT_DELAY_MS,
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_step(&self) -> Duration {
        Duration::from_secs(self.poll_step_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn bridge_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.bridge_reconnect_delay_ms)
    }
}
