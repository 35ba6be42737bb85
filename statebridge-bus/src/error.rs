//! Error types for the bus.

use thiserror::Error;

/// Result type for bus construction.
pub type BusResult<T> = Result<T, BusError>;

/// Errors that prevent the bus from being constructed.
///
/// These are the only fatal errors in the bridge: once a bus exists, every
/// later failure is isolated and logged instead.
#[derive(Debug, Error)]
pub enum BusError {
    /// No Tokio runtime is available to drive the batch timer.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),

    /// The configuration cannot be used.
    #[error("invalid bus configuration: {0}")]
    InvalidConfig(String),
}
