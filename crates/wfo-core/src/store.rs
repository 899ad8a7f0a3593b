//! The single operation set shared by every storage backend. `wfo-store-fs`
//! and `wfo-store-pg` each implement this trait once; callers never branch on
//! which backend they're talking to.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::CoreResult;
use crate::model::{
    Artifact, ArtifactWithStepName, Event, Gate, GatePatch, OutboxMessage, Run, RunPatch, RunSummary, Step, StepPatch,
};

/// Async contract for run/step/event/gate/artifact/inbox/outbox persistence.
/// Implementations must normalize driver-specific errors into `CoreError`
/// before returning (see `errors.rs`).
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_run(&self, plan: Option<Value>, project_id: Option<String>) -> CoreResult<Run>;
    async fn get_run(&self, id: Uuid) -> CoreResult<Run>;
    async fn update_run(&self, id: Uuid, patch: RunPatch) -> CoreResult<Run>;
    async fn reset_run(&self, id: Uuid) -> CoreResult<Run>;
    async fn list_runs(&self, limit: usize, project_id: Option<&str>) -> CoreResult<Vec<RunSummary>>;

    async fn create_step(
        &self,
        run_id: Uuid,
        name: &str,
        tool: &str,
        inputs: Value,
        idempotency_key: Option<&str>,
    ) -> CoreResult<Step>;
    async fn get_step(&self, id: Uuid) -> CoreResult<Option<Step>>;
    async fn get_step_by_idempotency_key(&self, run_id: Uuid, key: &str) -> CoreResult<Option<Step>>;
    async fn update_step(&self, id: Uuid, patch: StepPatch) -> CoreResult<Step>;
    async fn reset_step(&self, id: Uuid) -> CoreResult<Step>;
    async fn list_steps_by_run(&self, run_id: Uuid) -> CoreResult<Vec<Step>>;
    async fn count_remaining_steps(&self, run_id: Uuid) -> CoreResult<usize>;

    async fn record_event(&self, run_id: Uuid, kind: &str, payload: Value, step_id: Option<Uuid>) -> CoreResult<Event>;
    async fn list_events(&self, run_id: Uuid) -> CoreResult<Vec<Event>>;

    async fn create_or_get_gate(&self, run_id: Uuid, step_id: Uuid, gate_type: &str) -> CoreResult<Gate>;
    async fn get_latest_gate(&self, run_id: Uuid, step_id: Uuid) -> CoreResult<Option<Gate>>;
    async fn update_gate(&self, gate_id: Uuid, patch: GatePatch) -> CoreResult<Gate>;

    async fn add_artifact(&self, step_id: Uuid, kind: &str, path: &str, metadata: Option<Value>) -> CoreResult<Artifact>;
    async fn list_artifacts_by_run(&self, run_id: Uuid) -> CoreResult<Vec<ArtifactWithStepName>>;

    async fn inbox_mark_if_new(&self, key: &str) -> CoreResult<bool>;
    async fn inbox_delete(&self, key: &str) -> CoreResult<()>;

    async fn outbox_add(&self, topic: &str, payload: Value) -> CoreResult<OutboxMessage>;
    async fn outbox_list_unsent(&self, limit: usize) -> CoreResult<Vec<OutboxMessage>>;
    async fn outbox_mark_sent(&self, id: Uuid) -> CoreResult<()>;
}
