use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use wfo_core::errors::CoreResult;
use wfo_core::handler::HandlerRegistry;
use wfo_core::metrics::TracingMetricSink;
use wfo_core::model::{GatePatch, GateStatus, StepStatus};
use wfo_core::queue::{EnqueueOptions, Queue};
use wfo_core::store::Store;
use wfo_queue::InMemoryQueue;
use wfo_store_fs::FsStore;
use wfo_worker::{StepReadyPayload, Worker};

fn open_store() -> (tempfile::TempDir, Arc<FsStore>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(FsStore::open(dir.path()).expect("open store"));
    (dir, store)
}

async fn start_worker(store: Arc<FsStore>, registry: HandlerRegistry) -> (Arc<InMemoryQueue>, Arc<Worker>) {
    let queue = Arc::new(InMemoryQueue::new(4, Arc::new(TracingMetricSink)));
    let store: Arc<dyn Store> = store;
    let queue_dyn: Arc<dyn Queue> = queue.clone();
    let worker = Arc::new(Worker::new(store, queue_dyn, Arc::new(registry), Arc::new(TracingMetricSink)));
    worker.subscribe().await;
    (queue, worker)
}

async fn enqueue_step(queue: &InMemoryQueue, run_id: uuid::Uuid, step_id: uuid::Uuid) -> CoreResult<()> {
    let payload = serde_json::to_value(StepReadyPayload { run_id, step_id }).unwrap();
    queue.enqueue("step.ready", payload, EnqueueOptions::default()).await
}

#[tokio::test]
async fn scenario_2_echo_step_succeeds_with_ordered_events() {
    let (_dir, store) = open_store();
    let run = store.create_run(Some(json!({"goal": "Write README"})), None).await.unwrap();
    let step = store.create_step(run.id, "say hi", "test:echo", json!({"msg": "hi"}), None).await.unwrap();

    let (queue, _worker) = start_worker(store.clone(), wfo_worker::handlers::builtin_registry()).await;
    enqueue_step(&queue, run.id, step.id).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let refreshed = store.get_step(step.id).await.unwrap().unwrap();
        if refreshed.status == StepStatus::Succeeded {
            assert_eq!(refreshed.outputs, Some(json!({"echo": {"msg": "hi"}})));
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("step never succeeded; status = {:?}", refreshed.status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let events = store.list_events(run.id).await.unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, vec!["step.started", "step.finished"]);
}

#[tokio::test]
async fn scenario_3_fail_step_retries_then_reaches_dlq() {
    let (_dir, store) = open_store();
    let run = store.create_run(None, None).await.unwrap();
    let step = store.create_step(run.id, "always fails", "test:fail", json!({}), None).await.unwrap();

    let (queue, _worker) = start_worker(store.clone(), wfo_worker::handlers::builtin_registry()).await;
    enqueue_step(&queue, run.id, step.id).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        if queue.list_dlq("step.dlq").await.len() == 1 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job never reached step.dlq");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let counts = queue.get_counts("step.ready").await;
    assert_eq!(counts.failed, 5);
}

#[tokio::test]
async fn scenario_4_manual_gate_waits_then_resolves_on_approval() {
    let (_dir, store) = open_store();
    let run = store.create_run(None, None).await.unwrap();
    let step = store.create_step(run.id, "approve release", "manual:approve", json!({}), None).await.unwrap();

    let (queue, _worker) = start_worker(store.clone(), wfo_worker::handlers::builtin_registry()).await;
    enqueue_step(&queue, run.id, step.id).await.unwrap();

    // First dispatch creates a pending gate and re-enqueues with a delay;
    // give it a moment to land.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let gate = loop {
        if let Some(gate) = store.get_latest_gate(run.id, step.id).await.unwrap() {
            break gate;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("gate was never created");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(gate.status, GateStatus::Pending);

    let events = store.list_events(run.id).await.unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, vec!["gate.created", "gate.waiting"]);

    let refreshed_step = store.get_step(step.id).await.unwrap().unwrap();
    assert_eq!(refreshed_step.status, StepStatus::Running);

    store.update_gate(gate.id, GatePatch { status: Some(GateStatus::Approved), approved_by: Some("alice".to_string()) }).await.unwrap();

    // Directly re-drive the worker rather than waiting out the 5s
    // GATE_CHECK_DELAY_MS re-enqueue.
    enqueue_step(&queue, run.id, step.id).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let refreshed = store.get_step(step.id).await.unwrap().unwrap();
        if refreshed.status == StepStatus::Succeeded {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("step never succeeded after approval; status = {:?}", refreshed.status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn no_handler_matches_fails_the_step_without_retry() {
    let (_dir, store) = open_store();
    let run = store.create_run(None, None).await.unwrap();
    let step = store.create_step(run.id, "mystery", "nonexistent:tool", json!({}), None).await.unwrap();

    let (queue, _worker) = start_worker(store.clone(), wfo_worker::handlers::builtin_registry()).await;
    enqueue_step(&queue, run.id, step.id).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let refreshed = store.get_step(step.id).await.unwrap().unwrap();
        if refreshed.status == StepStatus::Failed {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("step never failed");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let events = store.list_events(run.id).await.unwrap();
    assert!(events.iter().any(|e| e.kind == "step.failed" && e.payload["error"] == "no_handler"));
}
