use pretty_assertions::assert_eq;
use statebridge_diagnostics::{with_retry, RetryPolicy};
use statebridge_types::{failure, success, BridgeError, BridgeResult, ErrorCode};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn policy(max_attempts: u32, delay_ms: u64) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay_ms,
    }
}

// ── Policy ───────────────────────────────────────────────────────

#[test]
fn default_policy() {
    let p = RetryPolicy::default();
    assert_eq!(p.max_attempts, 3);
    assert_eq!(p.delay(), Duration::from_millis(100));
    assert_eq!(RetryPolicy::no_retry().attempts(), 1);
    assert_eq!(policy(0, 0).attempts(), 1);
}

#[test]
fn policy_loads_from_partial_json() {
    let p: RetryPolicy = serde_json::from_str(r#"{"max_attempts":5}"#).unwrap();
    assert_eq!(p, policy(5, 100));
}

// ── Behavior ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn always_recoverable_failure_hits_the_bound() {
    let calls = Arc::new(AtomicU32::new(0));
    let started = Instant::now();

    let c = calls.clone();
    let result: BridgeResult<u32> = with_retry(&policy(3, 100), || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            failure(ErrorCode::Communication, "bus unreachable")
        }
    })
    .await;

    let error = result.unwrap_err();
    assert_eq!(error.code, ErrorCode::RetryLimitExceeded);
    assert!(!error.recoverable);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(200) && waited < Duration::from_millis(300));

    let cause = error.cause().unwrap();
    assert_eq!(cause.to_string(), "[COMMUNICATION] bus unreachable");

    // Nothing runs after the bound is reached.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn non_recoverable_failure_is_returned_immediately() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let result: BridgeResult<u32> = with_retry(&policy(5, 100), || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            failure(ErrorCode::SessionCreate, "rejected")
        }
    })
    .await;

    let error = result.unwrap_err();
    assert_eq!(error.code, ErrorCode::SessionCreate);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn recovers_when_a_later_attempt_succeeds() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let result = with_retry(&policy(3, 50), || {
        let c = c.clone();
        async move {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 2 {
                Err(BridgeError::new(ErrorCode::SyncFailed, "flaky"))
            } else {
                success(n)
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn explicitly_recoverable_errors_are_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let result: BridgeResult<()> = with_retry(&policy(2, 0), || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Err(BridgeError::new(ErrorCode::MessageSend, "busy").recoverable(true))
        }
    })
    .await;

    assert!(result.unwrap_err().is(ErrorCode::RetryLimitExceeded));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn zero_attempts_still_runs_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let result: BridgeResult<()> = with_retry(&policy(0, 10), || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            failure(ErrorCode::Timeout, "slow")
        }
    })
    .await;

    assert!(result.unwrap_err().is(ErrorCode::RetryLimitExceeded));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
