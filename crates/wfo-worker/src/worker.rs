//! Subscribes to `step.ready` and dispatches each message to the first
//! matching handler in the registry. The worker owns exactly two decisions
//! a handler never makes: "this step no longer exists" (ack, don't retry)
//! and "no handler matches this tool" (fail the step, don't retry).
//! Everything else — lifecycle transitions, events, retryable failure —
//! belongs to the handler or the queue.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use wfo_core::errors::{CoreError, CoreResult};
use wfo_core::handler::{HandlerContext, HandlerRegistry};
use wfo_core::metrics::MetricSink;
use wfo_core::model::event::kinds;
use wfo_core::model::step::StepPatch;
use wfo_core::model::StepStatus;
use wfo_core::queue::{JobHandler, Queue};
use wfo_core::store::Store;

use crate::events;

/// The `step.ready` job payload. Only `run_id`/`step_id` identify the work;
/// `__attempt` (the queue's own reserved field) is never read here — retry
/// bookkeeping is entirely the queue's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReadyPayload {
    #[serde(rename = "runId")]
    pub run_id: Uuid,
    #[serde(rename = "stepId")]
    pub step_id: Uuid,
}

/// Kept identical to `wfo_queue::naming::STEP_READY_TOPIC`; declared locally
/// rather than depending on `wfo-queue` (the worker only needs the topic
/// name, not the in-memory queue implementation).
pub const STEP_READY_TOPIC: &str = "step.ready";

pub struct Worker {
    store: Arc<dyn Store>,
    queue: Arc<dyn Queue>,
    registry: Arc<HandlerRegistry>,
    metrics: Arc<dyn MetricSink>,
}

impl Worker {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn Queue>, registry: Arc<HandlerRegistry>, metrics: Arc<dyn MetricSink>) -> Self {
        Self { store, queue, registry, metrics }
    }

    /// Registers this worker as the (sole) `step.ready` subscriber.
    pub async fn subscribe(self: &Arc<Self>) {
        let handler: Arc<dyn JobHandler> = self.clone();
        self.queue.subscribe(STEP_READY_TOPIC, handler).await;
    }

    async fn dispatch(&self, payload: StepReadyPayload) -> CoreResult<()> {
        let Some(step) = self.store.get_step(payload.step_id).await? else {
            tracing::warn!(step_id = %payload.step_id, "step.ready referenced a step that no longer exists; acknowledging");
            return Ok(());
        };

        let Some(handler) = self.registry.resolve(&step.tool) else {
            tracing::warn!(step_id = %step.id, tool = %step.tool, "no handler registered for tool");
            self.store
                .update_step(step.id, StepPatch { status: Some(StepStatus::Failed), ..Default::default() })
                .await?;
            events::record(
                &self.store,
                payload.run_id,
                kinds::STEP_FAILED,
                serde_json::json!({ "error": "no_handler", "tool": step.tool }),
                Some(step.id),
            )
            .await?;
            return Ok(());
        };

        let tool = step.tool.clone();
        let step_id = step.id;
        let span = tracing::info_span!("step_handler", tool = %tool, step_id = %step_id);
        let _enter = span.enter();

        let ctx = HandlerContext { run_id: payload.run_id, step, store: self.store.clone(), queue: self.queue.clone() };
        let started = Instant::now();
        let result = handler.run(ctx).await;
        let elapsed_ms = started.elapsed().as_millis() as f64;
        self.metrics.histogram("wfo_worker_handler_duration_ms", &[("tool", tool.as_str())], elapsed_ms);

        result
    }
}

#[async_trait]
impl JobHandler for Worker {
    async fn handle(&self, payload: Value) -> CoreResult<()> {
        let parsed: StepReadyPayload =
            serde_json::from_value(payload).map_err(|err| CoreError::Internal(format!("malformed step.ready payload: {err}")))?;
        self.dispatch(parsed).await
    }
}
