//! In-memory, topic-addressed job queue: delayed delivery, bounded
//! concurrency per topic, exponential backoff, and a dead-letter queue.
//!
//! A per-topic ready `VecDeque`, a per-topic min-heap of delayed jobs keyed
//! by run-at instant, and a counter-guarded admission path serialized by the
//! topic's own state mutex. The mutex only ever guards bookkeeping (popping
//! ready jobs, incrementing `active`); handler execution happens in a
//! detached task outside the lock, so up to `max_concurrent` handlers run
//! concurrently per topic.

pub mod backoff;
pub mod config;
pub mod naming;

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use wfo_core::metrics::MetricSink;
use wfo_core::queue::{EnqueueOptions, JobHandler, Queue, QueueCounts};

#[derive(Clone)]
struct Job {
    id: Uuid,
    payload: Value,
}

struct DelayedJob {
    run_at: Instant,
    job: Job,
}

impl PartialEq for DelayedJob {
    fn eq(&self, other: &Self) -> bool {
        self.run_at == other.run_at
    }
}
impl Eq for DelayedJob {}
impl PartialOrd for DelayedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DelayedJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.run_at.cmp(&other.run_at)
    }
}

struct ReadyEntry {
    job: Job,
    ready_since: Instant,
}

#[derive(Default)]
struct TopicCounters {
    completed: u64,
    failed: u64,
}

struct TopicState {
    ready: VecDeque<ReadyEntry>,
    delayed: BinaryHeap<Reverse<DelayedJob>>,
    dlq: VecDeque<Job>,
    active: u64,
    counters: TopicCounters,
    handler: Option<Arc<dyn JobHandler>>,
}

impl TopicState {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            delayed: BinaryHeap::new(),
            dlq: VecDeque::new(),
            active: 0,
            counters: TopicCounters::default(),
            handler: None,
        }
    }

    /// Moves every delayed job whose `run_at` has elapsed into the ready
    /// queue. Must be called with the topic's state mutex held.
    fn promote_due_delayed(&mut self) {
        let now = Instant::now();
        while let Some(Reverse(top)) = self.delayed.peek() {
            if top.run_at > now {
                break;
            }
            let Reverse(due) = self.delayed.pop().unwrap();
            self.ready.push_back(ReadyEntry { job: due.job, ready_since: now });
        }
    }
}

struct Inner {
    topics: AsyncMutex<HashMap<String, Arc<AsyncMutex<TopicState>>>>,
    max_concurrent: usize,
    metrics: Arc<dyn MetricSink>,
}

/// In-memory implementation of `wfo_core::queue::Queue`. Cheap to clone (an
/// `Arc` internally) so the drain loop can hand a handle to spawned tasks
/// without the `Queue` trait needing `Arc<Self>` receivers.
#[derive(Clone)]
pub struct InMemoryQueue(Arc<Inner>);

impl InMemoryQueue {
    pub fn new(max_concurrent: usize, metrics: Arc<dyn MetricSink>) -> Self {
        InMemoryQueue(Arc::new(Inner {
            topics: AsyncMutex::new(HashMap::new()),
            max_concurrent: max_concurrent.max(1),
            metrics,
        }))
    }

    async fn topic(&self, topic: &str) -> Arc<AsyncMutex<TopicState>> {
        let mut topics = self.0.topics.lock().await;
        topics.entry(topic.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(TopicState::new()))).clone()
    }

    fn publish_gauges(&self, topic: &str, state: &TopicState) {
        let labels = [("topic", topic)];
        self.0.metrics.gauge("wfo_queue_dlq_size", &labels, state.dlq.len() as f64);
        let oldest = state.ready.front().map(|e| e.ready_since.elapsed().as_millis() as f64).unwrap_or(0.0);
        self.0.metrics.gauge("wfo_queue_oldest_ready_ms", &labels, oldest);
    }

    /// Pops as many ready jobs as the concurrency budget allows and spawns a
    /// detached task per job. Only bookkeeping happens under the lock.
    async fn drain(&self, topic: &str) {
        let state_arc = self.topic(topic).await;
        let mut dispatch = Vec::new();
        {
            let mut state = state_arc.lock().await;
            state.promote_due_delayed();
            if let Some(handler) = state.handler.clone() {
                while state.active < self.0.max_concurrent as u64 {
                    let Some(entry) = state.ready.pop_front() else { break };
                    state.active += 1;
                    dispatch.push((entry.job, handler.clone()));
                }
            }
            self.publish_gauges(topic, &state);
        }

        for (job, handler) in dispatch {
            let this = self.clone();
            let topic = topic.to_string();
            tokio::spawn(async move {
                let result = handler.handle(job.payload.clone()).await;
                this.on_job_finished(&topic, job, result).await;
            });
        }
    }

    async fn on_job_finished(&self, topic: &str, job: Job, result: wfo_core::errors::CoreResult<()>) {
        let state_arc = self.topic(topic).await;
        match result {
            Ok(()) => {
                let mut state = state_arc.lock().await;
                state.active -= 1;
                state.counters.completed += 1;
                self.publish_gauges(topic, &state);
            }
            Err(err) => {
                tracing::warn!(topic, job_id = %job.id, error = %err, "job handler failed");
                let attempt = backoff::current_attempt(&job.payload);
                let mut state = state_arc.lock().await;
                state.active -= 1;
                state.counters.failed += 1;
                match backoff::next_delay_ms(attempt) {
                    Some(delay_ms) => {
                        let retried = Job { id: job.id, payload: backoff::with_attempt(&job.payload, attempt + 1) };
                        if delay_ms == 0 {
                            state.ready.push_back(ReadyEntry { job: retried, ready_since: Instant::now() });
                        } else {
                            let run_at = Instant::now() + std::time::Duration::from_millis(delay_ms);
                            state.delayed.push(Reverse(DelayedJob { run_at, job: retried }));
                        }
                        self.publish_gauges(topic, &state);
                        drop(state);
                        if delay_ms > 0 {
                            self.schedule_wakeup(topic.to_string(), delay_ms);
                        }
                    }
                    None => {
                        let dead = Job { id: Uuid::new_v4(), payload: job.payload };
                        state.dlq.push_back(dead);
                        self.publish_gauges(topic, &state);
                    }
                }
            }
        }
        self.drain(topic).await;
    }

    fn schedule_wakeup(&self, topic: String, delay_ms: u64) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            this.drain(&topic).await;
        });
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(&self, topic: &str, payload: Value, opts: EnqueueOptions) -> wfo_core::errors::CoreResult<()> {
        let state_arc = self.topic(topic).await;
        let job = Job { id: Uuid::new_v4(), payload };
        {
            let mut state = state_arc.lock().await;
            if opts.delay_ms == 0 {
                state.ready.push_back(ReadyEntry { job, ready_since: Instant::now() });
            } else {
                let run_at = Instant::now() + std::time::Duration::from_millis(opts.delay_ms);
                state.delayed.push(Reverse(DelayedJob { run_at, job }));
            }
            self.publish_gauges(topic, &state);
        }
        self.drain(topic).await;
        if opts.delay_ms > 0 {
            self.schedule_wakeup(topic.to_string(), opts.delay_ms);
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn JobHandler>) {
        let state_arc = self.topic(topic).await;
        {
            let mut state = state_arc.lock().await;
            if state.handler.is_none() {
                state.handler = Some(handler);
            }
        }
        self.drain(topic).await;
    }

    async fn get_counts(&self, topic: &str) -> QueueCounts {
        let state_arc = self.topic(topic).await;
        let state = state_arc.lock().await;
        QueueCounts {
            waiting: state.ready.len() as u64,
            active: state.active,
            completed: state.counters.completed,
            failed: state.counters.failed,
            delayed: state.delayed.len() as u64,
            paused: 0,
        }
    }

    async fn has_subscribers(&self, topic: &str) -> bool {
        let state_arc = self.topic(topic).await;
        let has = state_arc.lock().await.handler.is_some();
        has
    }

    async fn list_dlq(&self, topic: &str) -> Vec<Value> {
        let state_arc = self.topic(topic).await;
        state_arc.lock().await.dlq.iter().map(|j| j.payload.clone()).collect()
    }

    async fn rehydrate_dlq(&self, topic: &str, max: usize) -> usize {
        let ready_topic = naming::ready_sibling_for_dlq(topic);
        let state_arc = self.topic(topic).await;
        let mut moved = Vec::new();
        {
            let mut state = state_arc.lock().await;
            for _ in 0..max {
                let Some(job) = state.dlq.pop_front() else { break };
                moved.push(job);
            }
            self.publish_gauges(topic, &state);
        }
        let count = moved.len();
        for job in moved {
            let payload = backoff::with_attempt(&job.payload, 1);
            let _ = self.enqueue(&ready_topic, payload, EnqueueOptions::default()).await;
        }
        count
    }

    async fn get_oldest_age_ms(&self, topic: &str) -> Option<u64> {
        let state_arc = self.topic(topic).await;
        let mut state = state_arc.lock().await;
        state.promote_due_delayed();
        state.ready.front().map(|e| e.ready_since.elapsed().as_millis() as u64)
    }
}
