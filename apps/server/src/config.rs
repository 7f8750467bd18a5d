//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chorus_core::{SessionConfig, SimulatedTransportConfig, TrackCandidate};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `CHORUS_BIND_PORT`
    pub bind_port: u16,

    /// Session engine settings (timeouts, default volume, retry backoff).
    pub session: SessionConfig,

    /// Timing of the simulated transport.
    pub simulated: SimulatedSettings,

    /// Tracks served by the in-memory catalog.
    pub library: Vec<TrackCandidate>,
}

/// Simulated transport tunables as they appear in YAML.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulatedSettings {
    pub connect_delay_ms: u64,
    pub default_track_length_secs: u64,
}

impl Default for SimulatedSettings {
    fn default() -> Self {
        Self {
            connect_delay_ms: 50,
            default_track_length_secs: 180,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 49500,
            session: SessionConfig::default(),
            simulated: SimulatedSettings::default(),
            library: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CHORUS_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("CHORUS_IDLE_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.session.idle_timeout_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("CHORUS_DEFAULT_VOLUME") {
            if let Ok(volume) = val.parse() {
                self.session.default_volume = volume;
            }
        }
    }

    pub fn transport_config(&self) -> SimulatedTransportConfig {
        SimulatedTransportConfig {
            connect_delay: Duration::from_millis(self.simulated.connect_delay_ms),
            default_track_length: Duration::from_secs(self.simulated.default_track_length_secs),
        }
    }

    /// Known track lengths keyed by stream handle, for the simulated transport.
    ///
    /// The library catalog resolves a source to a handle with the same string.
    pub fn track_lengths(&self) -> HashMap<String, Duration> {
        self.library
            .iter()
            .filter_map(|t| t.duration.map(|d| (t.source.0.clone(), d)))
            .collect()
    }
}
