//! A single execution of a plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::DEFAULT_PROJECT_ID;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Blocked,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// A run in one of these statuses will never observe another transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Blocked => "blocked",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub status: RunStatus,
    pub plan: Option<Value>,
    #[serde(default = "default_project_id")]
    pub project_id: String,
    pub user_id: Option<String>,
    #[serde(default = "Value::default")]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

fn default_project_id() -> String {
    DEFAULT_PROJECT_ID.to_string()
}

impl Run {
    /// A freshly created run: `queued`, no timestamps beyond `created_at`.
    pub fn new(plan: Option<Value>, project_id: Option<String>) -> Self {
        let now = Utc::now();
        Self { id: Uuid::new_v4(),
               status: RunStatus::Queued,
               plan,
               project_id: project_id.unwrap_or_else(default_project_id),
               user_id: None,
               metadata: Value::Object(Default::default()),
               created_at: now,
               started_at: None,
               ended_at: None }
    }
}

/// Partial update applied by `Store::update_run`. Every field is optional;
/// absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub plan: Option<Value>,
    pub user_id: Option<String>,
    pub metadata: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Summary row returned by `Store::list_runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub title: String,
    /// Carried so `listRuns(limit, projectId?)` can filter without a second
    /// lookup per row.
    pub project_id: String,
}

impl RunSummary {
    /// `title` derives from `plan.goal` when that field is a JSON string,
    /// otherwise it is empty.
    pub fn title_from_plan(plan: &Option<Value>) -> String {
        plan.as_ref()
            .and_then(|p| p.get("goal"))
            .and_then(|g| g.as_str())
            .map(str::to_string)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn title_from_plan_uses_goal_string() {
        let plan = Some(json!({"goal": "Write README"}));
        assert_eq!(RunSummary::title_from_plan(&plan), "Write README");
    }

    #[test]
    fn title_from_plan_empty_when_goal_missing_or_not_a_string() {
        assert_eq!(RunSummary::title_from_plan(&None), "");
        assert_eq!(RunSummary::title_from_plan(&Some(json!({}))), "");
        assert_eq!(RunSummary::title_from_plan(&Some(json!({"goal": 3}))), "");
    }

    #[test]
    fn new_run_is_queued_with_only_created_at_set() {
        let run = Run::new(None, None);
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(run.project_id, "default");
        assert!(run.started_at.is_none());
        assert!(run.ended_at.is_none());
    }

    #[test]
    fn terminal_statuses() {
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Blocked.is_terminal());
    }
}
