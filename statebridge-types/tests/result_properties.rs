//! Property-based tests for the result algebra.
//!
//! - Chaining onto a failure returns the original failure untouched.
//! - Mapping a success applies the function to the data.
//! - Converting through `Outcome` preserves the value.

use proptest::prelude::*;
use statebridge_types::{failure, success, BridgeError, BridgeResult, ErrorCode, Outcome};

fn code_strategy() -> impl Strategy<Value = ErrorCode> {
    prop::sample::select(vec![
        ErrorCode::Communication,
        ErrorCode::AuthLogin,
        ErrorCode::SessionCreate,
        ErrorCode::MessageSend,
        ErrorCode::SyncFailed,
        ErrorCode::UiToast,
        ErrorCode::Timeout,
        ErrorCode::RetryLimitExceeded,
    ])
}

proptest! {
    #[test]
    fn chain_on_failure_is_identity(code in code_strategy(), msg in "[a-z ]{0,40}", x in any::<i64>()) {
        let original: BridgeResult<i64> = failure(code, msg.clone());
        let expected = original.clone();
        let chained = original.and_then(|v| success(v.wrapping_add(x)));
        prop_assert_eq!(chained, expected);
    }

    #[test]
    fn chain_on_failure_never_calls_f(code in code_strategy()) {
        let mut called = false;
        let r: BridgeResult<i64> = failure(code, "x");
        let _ = r.and_then(|v| { called = true; success(v) });
        prop_assert!(!called);
    }

    #[test]
    fn map_on_success_applies_f(x in any::<i32>(), k in any::<i32>()) {
        let mapped = success(x).map(|v| i64::from(v) * i64::from(k));
        prop_assert_eq!(mapped, Ok(i64::from(x) * i64::from(k)));
    }

    #[test]
    fn unwrap_or_on_success_ignores_default(x in any::<u32>(), d in any::<u32>()) {
        prop_assert_eq!(success(x).unwrap_or(d), x);
    }

    #[test]
    fn outcome_preserves_value(x in any::<u64>(), code in code_strategy(), fail in any::<bool>()) {
        let result: BridgeResult<u64> = if fail {
            Err(BridgeError::new(code, "f"))
        } else {
            Ok(x)
        };
        let roundtrip: BridgeResult<u64> = Outcome::from(result.clone()).into();
        prop_assert_eq!(roundtrip, result);
    }
}
