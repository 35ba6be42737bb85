//! Errors reported by state containers.

use statebridge_types::{BridgeError, ErrorCode};
use thiserror::Error;

/// Failure of a store operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached or was busy. Worth retrying.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// The store refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The target entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Wraps this error as a bridge failure with the given domain code,
    /// keeping it as the cause.
    pub fn into_bridge(self, code: ErrorCode, operation: &str) -> BridgeError {
        let recoverable = self.is_transient();
        BridgeError::new(code, format!("{operation} failed: {self}"))
            .with_detail("operation", operation)
            .recoverable(recoverable)
            .with_cause(self)
    }
}
