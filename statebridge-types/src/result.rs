//! The success/failure envelope used across the bridge boundary.
//!
//! `BridgeResult<T>` is a plain `Result`, so `map`, `and_then` (chain) and
//! `unwrap_or` come from std with the short-circuit semantics the bridge
//! relies on: chaining onto a failure hands back the original error
//! untouched. [`Outcome`] is the serializable, tagged form of the same value
//! for callers that need it on the wire or in logs.

use crate::error::{BridgeError, ErrorCode};
use serde::{Deserialize, Serialize};

/// Result type for every operation that crosses the bridge boundary.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Wraps `data` as a successful result.
pub fn success<T>(data: T) -> BridgeResult<T> {
    Ok(data)
}

/// Builds a failed result with the given code and message.
pub fn failure<T>(code: ErrorCode, message: impl Into<String>) -> BridgeResult<T> {
    Err(BridgeError::new(code, message))
}

/// Converts foreign errors into [`BridgeError`]s, keeping the original as
/// the cause.
pub trait ResultExt<T> {
    /// Maps the error to `code` with `message`, preserving the cause.
    fn or_code(self, code: ErrorCode, message: impl Into<String>) -> BridgeResult<T>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn or_code(self, code: ErrorCode, message: impl Into<String>) -> BridgeResult<T> {
        self.map_err(|e| BridgeError::new(code, message).with_cause(e))
    }
}

/// Tagged, serializable form of a [`BridgeResult`].
///
/// Serializes as `{"status":"success","data":...}` or
/// `{"status":"failure","error":{...}}`. Never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success { data: T },
    Failure { error: BridgeError },
}

impl<T> Outcome<T> {
    /// Returns true for the success variant.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Converts back into a `BridgeResult`.
    pub fn into_result(self) -> BridgeResult<T> {
        self.into()
    }
}

impl<T> From<BridgeResult<T>> for Outcome<T> {
    fn from(result: BridgeResult<T>) -> Self {
        match result {
            Ok(data) => Self::Success { data },
            Err(error) => Self::Failure { error },
        }
    }
}

impl<T> From<Outcome<T>> for BridgeResult<T> {
    fn from(outcome: Outcome<T>) -> Self {
        match outcome {
            Outcome::Success { data } => Ok(data),
            Outcome::Failure { error } => Err(error),
        }
    }
}
