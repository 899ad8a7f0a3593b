use serde_json::json;
use wfo_core::model::{GatePatch, GateStatus, RunPatch, RunStatus, StepPatch, StepStatus};
use wfo_core::store::Store;
use wfo_store_fs::FsStore;

fn open_temp() -> (tempfile::TempDir, FsStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsStore::open(dir.path()).expect("open store");
    (dir, store)
}

#[tokio::test]
async fn create_step_with_same_idempotency_key_returns_existing_step() {
    let (_dir, store) = open_temp();
    let run = store.create_run(None, None).await.unwrap();

    let first = store.create_step(run.id, "build", "shell:run", json!({"cmd": "make"}), Some("build-key")).await.unwrap();
    let second = store.create_step(run.id, "build", "shell:run", json!({"cmd": "make again"}), Some("build-key")).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.inputs, json!({"cmd": "make"}));

    let steps = store.list_steps_by_run(run.id).await.unwrap();
    assert_eq!(steps.len(), 1);
}

#[tokio::test]
async fn create_step_without_idempotency_key_never_dedupes() {
    let (_dir, store) = open_temp();
    let run = store.create_run(None, None).await.unwrap();

    let first = store.create_step(run.id, "log", "test:echo", json!({}), None).await.unwrap();
    let second = store.create_step(run.id, "log", "test:echo", json!({}), None).await.unwrap();

    assert_ne!(first.id, second.id);
    let steps = store.list_steps_by_run(run.id).await.unwrap();
    assert_eq!(steps.len(), 2);
}

#[tokio::test]
async fn events_are_listed_in_chronological_order() {
    let (_dir, store) = open_temp();
    let run = store.create_run(None, None).await.unwrap();

    store.record_event(run.id, "step.started", json!({"n": 1}), None).await.unwrap();
    store.record_event(run.id, "step.finished", json!({"n": 2}), None).await.unwrap();
    store.record_event(run.id, "gate.created", json!({"n": 3}), None).await.unwrap();

    let events = store.list_events(run.id).await.unwrap();
    let ns: Vec<i64> = events.iter().map(|e| e.payload["n"].as_i64().unwrap()).collect();
    assert_eq!(ns, vec![1, 2, 3]);
}

#[tokio::test]
async fn list_runs_orders_newest_first_and_respects_limit() {
    let (_dir, store) = open_temp();
    for _ in 0..5 {
        store.create_run(None, None).await.unwrap();
    }

    let page = store.list_runs(2, None).await.unwrap();
    assert_eq!(page.len(), 2);
    assert!(page[0].created_at >= page[1].created_at);
}

#[tokio::test]
async fn list_runs_filters_by_project_id() {
    let (_dir, store) = open_temp();
    store.create_run(None, Some("alpha".to_string())).await.unwrap();
    store.create_run(None, Some("beta".to_string())).await.unwrap();

    let alpha_runs = store.list_runs(10, Some("alpha")).await.unwrap();
    assert_eq!(alpha_runs.len(), 1);
    assert_eq!(alpha_runs[0].project_id, "alpha");
}

#[tokio::test]
async fn get_latest_gate_returns_most_recently_created_gate_for_step() {
    let (_dir, store) = open_temp();
    let run = store.create_run(None, None).await.unwrap();
    let step = store.create_step(run.id, "deploy", "manual:approve", json!({}), None).await.unwrap();

    let first = store.create_or_get_gate(run.id, step.id, "approval").await.unwrap();
    store.update_gate(first.id, GatePatch { status: Some(GateStatus::Rejected), approved_by: Some("alice".into()) }).await.unwrap();

    // A fresh pending gate request after the first was resolved creates a
    // new row rather than returning the resolved one.
    let second = store.create_or_get_gate(run.id, step.id, "approval").await.unwrap();
    assert_ne!(first.id, second.id);

    let latest = store.get_latest_gate(run.id, step.id).await.unwrap().unwrap();
    assert_eq!(latest.id, second.id);
    assert_eq!(latest.status, GateStatus::Pending);
}

#[tokio::test]
async fn create_or_get_gate_returns_existing_pending_gate_instead_of_duplicating() {
    let (_dir, store) = open_temp();
    let run = store.create_run(None, None).await.unwrap();
    let step = store.create_step(run.id, "deploy", "manual:approve", json!({}), None).await.unwrap();

    let first = store.create_or_get_gate(run.id, step.id, "approval").await.unwrap();
    let second = store.create_or_get_gate(run.id, step.id, "approval").await.unwrap();
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn inbox_mark_if_new_is_true_exactly_once_per_key() {
    let (_dir, store) = open_temp();
    assert!(store.inbox_mark_if_new("msg-1").await.unwrap());
    assert!(!store.inbox_mark_if_new("msg-1").await.unwrap());

    store.inbox_delete("msg-1").await.unwrap();
    assert!(store.inbox_mark_if_new("msg-1").await.unwrap());
}

#[tokio::test]
async fn outbox_list_unsent_excludes_sent_messages() {
    let (_dir, store) = open_temp();
    let m1 = store.outbox_add("run.updated", json!({"id": 1})).await.unwrap();
    store.outbox_add("run.updated", json!({"id": 2})).await.unwrap();

    store.outbox_mark_sent(m1.id).await.unwrap();
    let unsent = store.outbox_list_unsent(10).await.unwrap();
    assert_eq!(unsent.len(), 1);
    assert_eq!(unsent[0].payload, json!({"id": 2}));
}

#[tokio::test]
async fn update_run_sets_ended_at_on_terminal_transition() {
    let (_dir, store) = open_temp();
    let run = store.create_run(None, None).await.unwrap();
    assert!(run.ended_at.is_none());

    let updated = store.update_run(run.id, RunPatch { status: Some(RunStatus::Succeeded), ..Default::default() }).await.unwrap();
    assert!(updated.ended_at.is_some());
}

#[tokio::test]
async fn update_step_sets_ended_at_on_terminal_transition() {
    let (_dir, store) = open_temp();
    let run = store.create_run(None, None).await.unwrap();
    let step = store.create_step(run.id, "log", "test:echo", json!({}), None).await.unwrap();

    let updated = store.update_step(step.id, StepPatch { status: Some(StepStatus::Failed), ..Default::default() }).await.unwrap();
    assert!(updated.ended_at.is_some());
}

#[tokio::test]
async fn add_artifact_joins_step_name_in_list_artifacts_by_run() {
    let (_dir, store) = open_temp();
    let run = store.create_run(None, None).await.unwrap();
    let step = store.create_step(run.id, "build", "shell:run", json!({}), None).await.unwrap();
    store.add_artifact(step.id, "text/x-diff", "runs/x/diff.patch", None).await.unwrap();

    let artifacts = store.list_artifacts_by_run(run.id).await.unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].step_name, "build");
}

#[tokio::test]
async fn reset_run_returns_to_queued_and_clears_ended_at() {
    let (_dir, store) = open_temp();
    let run = store.create_run(None, None).await.unwrap();
    store.update_run(run.id, RunPatch { status: Some(RunStatus::Failed), ..Default::default() }).await.unwrap();

    let reset = store.reset_run(run.id).await.unwrap();
    assert_eq!(reset.status, RunStatus::Queued);
    assert!(reset.ended_at.is_none());
}

#[tokio::test]
async fn count_remaining_steps_excludes_succeeded_and_cancelled() {
    let (_dir, store) = open_temp();
    let run = store.create_run(None, None).await.unwrap();
    let a = store.create_step(run.id, "a", "test:echo", json!({}), None).await.unwrap();
    let b = store.create_step(run.id, "b", "test:echo", json!({}), None).await.unwrap();
    store.create_step(run.id, "c", "test:echo", json!({}), None).await.unwrap();

    store.update_step(a.id, StepPatch { status: Some(StepStatus::Succeeded), ..Default::default() }).await.unwrap();
    store.update_step(b.id, StepPatch { status: Some(StepStatus::Cancelled), ..Default::default() }).await.unwrap();

    assert_eq!(store.count_remaining_steps(run.id).await.unwrap(), 1);
}
