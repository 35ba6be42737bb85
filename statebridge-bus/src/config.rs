//! Bus configuration.

use crate::error::{BusError, BusResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Queue length that triggers an immediate flush.
    pub max_batch_size: usize,
    /// Maximum time (ms) an event waits in the queue before a flush.
    pub batch_timeout_ms: u64,
    /// Number of events kept in the diagnostic history ring.
    pub history_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            batch_timeout_ms: 50,
            history_size: 100,
        }
    }
}

impl BusConfig {
    /// Returns the batch timeout as a `Duration`.
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Rejects configurations the dispatcher cannot run with.
    pub fn validate(&self) -> BusResult<()> {
        if self.max_batch_size == 0 {
            return Err(BusError::InvalidConfig(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
