//! The queue contract the worker and handlers depend on. `wfo-queue` is the
//! in-memory implementation authoritative for this spec; a broker-backed
//! queue can implement the same trait without the worker noticing.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::CoreResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub paused: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    /// Delay in milliseconds before the job becomes ready.
    pub delay_ms: u64,
}

/// An async job handler invoked by the queue's drain loop for a topic.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> CoreResult<()>;
}

#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(&self, topic: &str, payload: Value, opts: EnqueueOptions) -> CoreResult<()>;

    /// Registers the handler for `topic`. Only the first subscriber per topic
    /// is used for dispatch; later calls are accepted but ignored.
    async fn subscribe(&self, topic: &str, handler: std::sync::Arc<dyn JobHandler>);

    async fn get_counts(&self, topic: &str) -> QueueCounts;
    async fn has_subscribers(&self, topic: &str) -> bool;
    async fn list_dlq(&self, topic: &str) -> Vec<Value>;

    /// Moves up to `max` items from `topic`'s DLQ back onto its ready
    /// sibling topic, resetting `__attempt` to 1. Returns the count moved.
    async fn rehydrate_dlq(&self, topic: &str, max: usize) -> usize;

    /// Age in milliseconds of the oldest ready (non-delayed) job on `topic`,
    /// or `None` if the topic has no ready jobs.
    async fn get_oldest_age_ms(&self, topic: &str) -> Option<u64>;
}
