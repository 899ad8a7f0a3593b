//! Append-only journal entries describing a state change or notable
//! occurrence. `kind` is a plain string rather than a closed enum: callers
//! (handlers, gate transitions, external collaborators) are free to record
//! any type string, and the exact literal values the core itself emits must
//! round-trip unchanged through storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(run_id: Uuid, kind: impl Into<String>, payload: Value, step_id: Option<Uuid>) -> Self {
        Self { id: Uuid::new_v4(), run_id, step_id, kind: kind.into(), payload, created_at: Utc::now() }
    }
}

/// The literal event-type strings the core itself emits. Handlers and other
/// external collaborators are free to record additional types.
pub mod kinds {
    pub const STEP_STARTED: &str = "step.started";
    pub const STEP_FINISHED: &str = "step.finished";
    pub const STEP_FAILED: &str = "step.failed";
    pub const GATE_CREATED: &str = "gate.created";
    pub const GATE_WAITING: &str = "gate.waiting";
    pub const CODEGEN_COMPLETED: &str = "codegen.completed";
    pub const CODEGEN_FAILED: &str = "codegen.failed";
    pub const LLM_USAGE: &str = "llm.usage";
    pub const COST_ALERT: &str = "cost.alert";
}
