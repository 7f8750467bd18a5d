//! Session engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CATALOG_RETRY_DELAYS_MS, MAX_VOLUME};

/// Configuration shared by every playback session.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// How long `join` waits for the transport to acknowledge (milliseconds).
    pub join_timeout_ms: u64,

    /// How long a connected session may sit idle before it is evicted (seconds).
    pub idle_timeout_secs: u64,

    /// Interval between idle sweeps (seconds).
    pub sweep_interval_secs: u64,

    /// Volume applied to new sessions (0-100).
    pub default_volume: u8,

    /// Backoff before each retry of a transiently failing catalog search
    /// (milliseconds). Empty disables retries.
    pub catalog_retry_delays_ms: Vec<u64>,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl SessionConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.join_timeout_ms == 0 {
            return Err("join_timeout_ms must be >= 1".to_string());
        }
        if self.idle_timeout_secs == 0 {
            return Err("idle_timeout_secs must be >= 1".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep_interval_secs must be >= 1 (interval panics on 0)".to_string());
        }
        if self.default_volume > MAX_VOLUME {
            return Err(format!("default_volume must be <= {}", MAX_VOLUME));
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        Ok(())
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: 5000,
            idle_timeout_secs: 300,
            sweep_interval_secs: 30,
            default_volume: 80,
            catalog_retry_delays_ms: DEFAULT_CATALOG_RETRY_DELAYS_MS.to_vec(),
            event_channel_capacity: 100,
        }
    }
}
