//! Bounded retries for recoverable failures.

use serde::{Deserialize, Serialize};
use statebridge_types::{BridgeError, BridgeResult, ErrorCode};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Pause (ms) between attempts.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// A policy with `max_attempts` tries, `delay` apart. Zero is treated
    /// as one.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay_ms: 0,
        }
    }

    /// Pause between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Total attempts, at least one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Runs `op` until it succeeds, fails non-recoverably, or the policy's
/// attempts are used up.
///
/// Non-recoverable failures are returned as-is. Exhausting the attempts
/// yields `RetryLimitExceeded` with the last failure as its cause.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> BridgeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BridgeResult<T>>,
{
    let attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "operation recovered after retry");
                }
                return Ok(value);
            }
            Err(error) if !error.recoverable => return Err(error),
            Err(error) => error,
        };

        if attempt >= attempts {
            warn!(attempts, code = %error.code, "retry limit exceeded");
            return Err(BridgeError::new(
                ErrorCode::RetryLimitExceeded,
                format!("gave up after {attempts} attempts: {}", error.message),
            )
            .with_detail("attempts", attempts)
            .with_detail("lastCode", error.code.as_str())
            .recoverable(false)
            .with_cause(error));
        }

        debug!(attempt, attempts, code = %error.code, "recoverable failure, retrying");
        let delay = policy.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
