//! Property-style coverage for two dedupe guarantees: idempotent step
//! creation and inbox deduplication. Plain example-based tests already
//! cover the FS backend's everyday behavior (see `store_tests.rs`); these
//! tests instead range over arbitrary keys to pin the "for all (runId,
//! key)" / "for all key" universal quantifiers.

use proptest::prelude::*;
use serde_json::json;
use wfo_core::store::Store;
use wfo_store_fs::FsStore;

fn open_temp() -> (tempfile::TempDir, FsStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsStore::open(dir.path()).expect("open store");
    (dir, store)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Repeated `create_step` calls with the same non-empty idempotency key
    /// always yield exactly one row, and every call returns the same id.
    #[test]
    fn repeated_create_step_with_same_key_is_a_single_row(
        key in "[a-zA-Z0-9_-]{1,24}",
        repeats in 2usize..6,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (_dir, store) = open_temp();
            let run = store.create_run(None, None).await.unwrap();

            let mut ids = Vec::new();
            for i in 0..repeats {
                let step = store
                    .create_step(run.id, "work", "test:echo", json!({"attempt": i}), Some(key.as_str()))
                    .await
                    .unwrap();
                ids.push(step.id);
            }

            prop_assert!(ids.windows(2).all(|w| w[0] == w[1]));
            let steps = store.list_steps_by_run(run.id).await.unwrap();
            prop_assert_eq!(steps.len(), 1);
            Ok(())
        })?;
    }

    /// The first `inbox_mark_if_new` for any key returns true; every
    /// subsequent call returns false until `inbox_delete` runs.
    #[test]
    fn inbox_mark_if_new_is_true_exactly_once(
        key in "[a-zA-Z0-9_-]{1,24}",
        extra_checks in 1usize..5,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (_dir, store) = open_temp();

            prop_assert!(store.inbox_mark_if_new(&key).await.unwrap());
            for _ in 0..extra_checks {
                prop_assert!(!store.inbox_mark_if_new(&key).await.unwrap());
            }

            store.inbox_delete(&key).await.unwrap();
            prop_assert!(store.inbox_mark_if_new(&key).await.unwrap());
            Ok(())
        })?;
    }
}
