//! Error types for the diagnostics layer.

use thiserror::Error;

/// Result type for diagnostics setup.
pub type DiagnosticsResult<T> = Result<T, DiagnosticsError>;

/// Errors raised while setting up diagnostics.
#[derive(Debug, Error)]
pub enum DiagnosticsError {
    /// The log filter directive could not be parsed.
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    /// A global subscriber was already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}
