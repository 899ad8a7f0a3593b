//! Attempt bookkeeping and the fixed retry schedule. `__attempt` is the sole
//! reserved field at the queue layer; every other field in an object payload
//! survives a retry untouched.

use serde_json::{json, Value};
use wfo_core::constants::BACKOFF_SCHEDULE_MS;

/// Reads the payload's current attempt number. Absent or non-object payloads
/// are treated as attempt 1.
pub fn current_attempt(payload: &Value) -> u64 {
    payload
        .as_object()
        .and_then(|m| m.get("__attempt"))
        .and_then(Value::as_u64)
        .unwrap_or(1)
}

/// Delay in milliseconds before the attempt *after* `attempt` runs, or
/// `None` once retries are exhausted (the job belongs in the DLQ).
pub fn next_delay_ms(attempt: u64) -> Option<u64> {
    let index = (attempt - 1) as usize;
    BACKOFF_SCHEDULE_MS.get(index).copied()
}

/// Builds the payload for a retried job: `__attempt` is set to
/// `next_attempt`, every other object field is preserved. Non-object
/// payloads are replaced outright with `{"__attempt": next_attempt}`.
pub fn with_attempt(payload: &Value, next_attempt: u64) -> Value {
    match payload.as_object() {
        Some(map) => {
            let mut map = map.clone();
            map.insert("__attempt".to_string(), json!(next_attempt));
            Value::Object(map)
        }
        None => json!({ "__attempt": next_attempt }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_attempt_defaults_to_one() {
        assert_eq!(current_attempt(&json!({"foo": "bar"})), 1);
    }

    #[test]
    fn non_object_payload_treated_as_attempt_one() {
        assert_eq!(current_attempt(&json!([1, 2, 3])), 1);
        assert_eq!(current_attempt(&json!("x")), 1);
    }

    #[test]
    fn schedule_matches_spec() {
        assert_eq!(next_delay_ms(1), Some(0));
        assert_eq!(next_delay_ms(2), Some(2_000));
        assert_eq!(next_delay_ms(3), Some(5_000));
        assert_eq!(next_delay_ms(4), Some(10_000));
        assert_eq!(next_delay_ms(5), None);
    }

    #[test]
    fn with_attempt_preserves_other_fields() {
        let p = json!({"runId": "r1", "stepId": "s1", "__attempt": 2});
        let retried = with_attempt(&p, 3);
        assert_eq!(retried["runId"], json!("r1"));
        assert_eq!(retried["stepId"], json!("s1"));
        assert_eq!(retried["__attempt"], json!(3));
    }

    #[test]
    fn with_attempt_replaces_non_object_payload() {
        let retried = with_attempt(&json!([1, 2]), 2);
        assert_eq!(retried, json!({"__attempt": 2}));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// For any object payload and any field set disjoint from `__attempt`,
        /// `with_attempt` round-trips through `current_attempt` and leaves
        /// every other field exactly as it was.
        #[test]
        fn with_attempt_round_trips_through_current_attempt(
            next_attempt in 1u64..1000,
            run_id in "[a-zA-Z0-9_-]{1,16}",
            step_id in "[a-zA-Z0-9_-]{1,16}",
        ) {
            let payload = json!({"runId": run_id, "stepId": step_id});
            let retried = with_attempt(&payload, next_attempt);
            prop_assert_eq!(current_attempt(&retried), next_attempt);
            prop_assert_eq!(&retried["runId"], &json!(run_id));
            prop_assert_eq!(&retried["stepId"], &json!(step_id));
        }

        /// The fixed backoff schedule is total on `1..=4` and exhausted from
        /// attempt 5 on, for every attempt number in a wide range.
        #[test]
        fn schedule_is_exhausted_exactly_after_four_attempts(attempt in 1u64..50) {
            match next_delay_ms(attempt) {
                Some(_) => prop_assert!(attempt <= 4),
                None => prop_assert!(attempt >= 5),
            }
        }
    }
}
