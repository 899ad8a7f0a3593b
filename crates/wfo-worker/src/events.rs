//! Thin wrapper over `Store::record_event`. The event recorder adds nothing
//! behavioral beyond the store operation itself — it exists so handlers
//! record events through one narrow call instead of depending on the full
//! `Store` trait's surface.

use std::sync::Arc;
use uuid::Uuid;

use serde_json::Value;
use wfo_core::errors::CoreResult;
use wfo_core::model::event::kinds;
use wfo_core::store::Store;

/// Appends an event for `run_id` (and optionally `step_id`). Retrieval order
/// is chronological ascending, enforced by the store, not here.
pub async fn record(store: &Arc<dyn Store>, run_id: Uuid, kind: &str, payload: Value, step_id: Option<Uuid>) -> CoreResult<()> {
    store.record_event(run_id, kind, payload, step_id).await?;
    Ok(())
}

pub async fn step_started(store: &Arc<dyn Store>, run_id: Uuid, step_id: Uuid) -> CoreResult<()> {
    record(store, run_id, kinds::STEP_STARTED, Value::Object(Default::default()), Some(step_id)).await
}

pub async fn step_finished(store: &Arc<dyn Store>, run_id: Uuid, step_id: Uuid, outputs: Value) -> CoreResult<()> {
    record(store, run_id, kinds::STEP_FINISHED, outputs, Some(step_id)).await
}

pub async fn step_failed(store: &Arc<dyn Store>, run_id: Uuid, step_id: Uuid, error: Value) -> CoreResult<()> {
    record(store, run_id, kinds::STEP_FAILED, error, Some(step_id)).await
}

pub async fn gate_created(store: &Arc<dyn Store>, run_id: Uuid, step_id: Uuid, gate_type: &str) -> CoreResult<()> {
    // COVERAGE_THRESHOLD is an opaque passthrough to whatever external
    // collaborator evaluates this gate; the core neither parses nor enforces
    // it (spec.md §6).
    let mut payload = serde_json::json!({ "gate_type": gate_type });
    if let Ok(threshold) = std::env::var("COVERAGE_THRESHOLD") {
        payload["coverage_threshold"] = Value::String(threshold);
    }
    record(store, run_id, kinds::GATE_CREATED, payload, Some(step_id)).await
}

pub async fn gate_waiting(store: &Arc<dyn Store>, run_id: Uuid, step_id: Uuid, gate_type: &str) -> CoreResult<()> {
    record(store, run_id, kinds::GATE_WAITING, serde_json::json!({ "gate_type": gate_type }), Some(step_id)).await
}
