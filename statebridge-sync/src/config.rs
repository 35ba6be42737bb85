//! Bridge configuration.
//!
//! Every struct deserializes with `#[serde(default)]`, so a config file only
//! needs the keys it overrides.

use serde::{Deserialize, Serialize};
use statebridge_bus::BusConfig;
use statebridge_diagnostics::{DiagnosticsConfig, LogConfig, RetryPolicy};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-reconciler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Interval (ms) of the periodic dirty flush.
    pub tick_interval_ms: u64,
    /// How long (ms) a provenance marker suppresses the matching mutation.
    pub provenance_ttl_ms: u64,
    /// Maximum live provenance markers per reconciler.
    pub provenance_capacity: usize,
    /// Retry policy for store calls.
    pub retry: RetryPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 5_000,
            provenance_ttl_ms: 1_000,
            provenance_capacity: 1_024,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReconcilerConfig {
    /// Period of the background reconciliation flush.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// How long a provenance marker stays live.
    #[must_use]
    pub fn provenance_ttl(&self) -> Duration {
        Duration::from_millis(self.provenance_ttl_ms)
    }
}

/// Everything needed to run one side of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Source tag stamped on every event this side emits.
    pub source: String,
    pub log: LogConfig,
    pub bus: BusConfig,
    pub diagnostics: DiagnosticsConfig,
    pub reconciler: ReconcilerConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            source: "legacy".to_string(),
            log: LogConfig::default(),
            bus: BusConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            reconciler: ReconcilerConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Default configuration for the given source tag.
    pub fn for_source(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Checks the settings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.trim().is_empty() {
            return Err(ConfigError::Invalid("source must not be empty".to_string()));
        }
        if self.reconciler.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconciler.tick_interval_ms must be positive".to_string(),
            ));
        }
        self.bus
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
