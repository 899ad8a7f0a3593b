use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wfo_core::errors::CoreResult;
use wfo_core::metrics::TracingMetricSink;
use wfo_core::queue::{EnqueueOptions, JobHandler, Queue};
use wfo_queue::InMemoryQueue;

struct SlowHandler {
    active: Arc<AtomicI64>,
    max_observed: Arc<AtomicI64>,
    completed: Arc<AtomicUsize>,
}

#[async_trait]
impl JobHandler for SlowHandler {
    async fn handle(&self, _payload: Value) -> CoreResult<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn at_most_k_handlers_in_flight() {
    const K: usize = 3;
    const M: usize = 12;

    let active = Arc::new(AtomicI64::new(0));
    let max_observed = Arc::new(AtomicI64::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let queue = InMemoryQueue::new(K, Arc::new(TracingMetricSink));
    queue
        .subscribe(
            "work",
            Arc::new(SlowHandler { active: active.clone(), max_observed: max_observed.clone(), completed: completed.clone() }),
        )
        .await;

    for i in 0..M {
        queue.enqueue("work", json!({"i": i}), EnqueueOptions::default()).await.unwrap();
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while completed.load(Ordering::SeqCst) < M {
        if tokio::time::Instant::now() >= deadline {
            panic!("not all jobs completed; completed={}", completed.load(Ordering::SeqCst));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(max_observed.load(Ordering::SeqCst) <= K as i64, "observed more than {K} handlers in flight");
    let counts = queue.get_counts("work").await;
    assert_eq!(counts.completed, M as u64);
    assert_eq!(counts.active, 0);
}
