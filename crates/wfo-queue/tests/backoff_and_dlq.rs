use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wfo_core::errors::{CoreError, CoreResult};
use wfo_core::metrics::TracingMetricSink;
use wfo_core::queue::{EnqueueOptions, JobHandler, Queue};
use wfo_queue::InMemoryQueue;

struct AlwaysFails {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl JobHandler for AlwaysFails {
    async fn handle(&self, _payload: Value) -> CoreResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CoreError::Internal("boom".into()))
    }
}

#[tokio::test]
async fn scenario_3_backoff_then_dlq() {
    let queue = InMemoryQueue::new(4, Arc::new(TracingMetricSink));
    let attempts = Arc::new(AtomicUsize::new(0));
    queue.subscribe("step.ready", Arc::new(AlwaysFails { attempts: attempts.clone() })).await;
    queue.enqueue("step.ready", json!({"runId": "r1", "stepId": "s1"}), EnqueueOptions::default()).await.unwrap();

    // Poll until exactly one job lands in the DLQ (5th attempt exhausts the
    // schedule {0, 2000, 5000, 10000}).
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let dlq = queue.list_dlq("step.dlq").await;
        if dlq.len() == 1 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job never reached the DLQ; attempts so far = {}", attempts.load(Ordering::SeqCst));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(attempts.load(Ordering::SeqCst), 5);
    let counts = queue.get_counts("step.ready").await;
    assert_eq!(counts.failed, 5);
}

#[tokio::test]
async fn dlq_naming_reserved_vs_generic_topic() {
    let queue = InMemoryQueue::new(4, Arc::new(TracingMetricSink));
    let attempts = Arc::new(AtomicUsize::new(0));
    queue.subscribe("foo.bar", Arc::new(AlwaysFails { attempts: attempts.clone() })).await;
    queue.enqueue("foo.bar", json!({"x": 1}), EnqueueOptions::default()).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let dlq = queue.list_dlq("foo.bar.dlq").await;
        if dlq.len() == 1 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job never reached foo.bar.dlq");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn rehydrate_resets_attempt_and_preserves_fields() {
    let queue = InMemoryQueue::new(4, Arc::new(TracingMetricSink));
    let attempts = Arc::new(AtomicUsize::new(0));
    queue.subscribe("step.ready", Arc::new(AlwaysFails { attempts: attempts.clone() })).await;
    queue.enqueue("step.ready", json!({"runId": "r9", "stepId": "s9"}), EnqueueOptions::default()).await.unwrap();

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

    let moved = queue.rehydrate_dlq("step.dlq", 10).await;
    assert_eq!(moved, 1);
    assert_eq!(queue.list_dlq("step.dlq").await.len(), 0);

    // Rehydrated onto step.ready's sibling naming ("step.ready" for the
    // reserved topic), with __attempt reset and other fields intact.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let counts = queue.get_counts("step.ready").await;
        if counts.waiting + counts.active + counts.delayed > 0 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("rehydrated job never appeared on step.ready");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
