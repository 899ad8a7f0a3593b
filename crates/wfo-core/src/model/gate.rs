//! A durable approval record blocking a step's completion until resolved
//! externally. The passing/failing vocabulary is collapsed to two sets:
//! `{approved, skipped}` pass, `{rejected, failed}` fail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pending,
    Approved,
    Rejected,
    Failed,
    Succeeded,
    Cancelled,
    Skipped,
}

impl GateStatus {
    /// `approved`/`skipped` resolve the blocked step as succeeded.
    pub fn is_passing(self) -> bool {
        matches!(self, GateStatus::Approved | GateStatus::Skipped)
    }

    /// `rejected`/`failed` resolve the blocked step as failed.
    pub fn is_denying(self) -> bool {
        matches!(self, GateStatus::Rejected | GateStatus::Failed)
    }
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateStatus::Pending => "pending",
            GateStatus::Approved => "approved",
            GateStatus::Rejected => "rejected",
            GateStatus::Failed => "failed",
            GateStatus::Succeeded => "succeeded",
            GateStatus::Cancelled => "cancelled",
            GateStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: Uuid,
    pub gate_type: String,
    pub status: GateStatus,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl Gate {
    pub fn new_pending(run_id: Uuid, step_id: Uuid, gate_type: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(),
               run_id,
               step_id,
               gate_type: gate_type.into(),
               status: GateStatus::Pending,
               created_at: Utc::now(),
               approved_by: None,
               approved_at: None }
    }
}

/// Partial update applied by `Store::update_gate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatePatch {
    pub status: Option<GateStatus>,
    pub approved_by: Option<String>,
}
