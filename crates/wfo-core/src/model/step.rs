//! One unit of work within a run, dispatched to a handler by `tool`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self,
                 StepStatus::Succeeded | StepStatus::Failed | StepStatus::Cancelled | StepStatus::TimedOut)
    }

    /// Steps in these statuses do not count against `count_remaining_steps`.
    pub fn counts_as_remaining(self) -> bool {
        !matches!(self, StepStatus::Succeeded | StepStatus::Cancelled)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Queued => "queued",
            StepStatus::Running => "running",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Cancelled => "cancelled",
            StepStatus::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub run_id: Uuid,
    pub name: String,
    pub tool: String,
    pub inputs: Value,
    pub outputs: Option<Value>,
    pub status: StepStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
}

impl Step {
    pub fn new(run_id: Uuid, name: impl Into<String>, tool: impl Into<String>, inputs: Value,
               idempotency_key: Option<String>)
               -> Self {
        Self { id: Uuid::new_v4(),
               run_id,
               name: name.into(),
               tool: tool.into(),
               inputs,
               outputs: None,
               status: StepStatus::Queued,
               created_at: Utc::now(),
               started_at: None,
               ended_at: None,
               idempotency_key: idempotency_key.filter(|k| !k.is_empty()) }
    }
}

/// Partial update applied by `Store::update_step`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepPatch {
    pub status: Option<StepStatus>,
    pub outputs: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}
