//! Row <-> domain-model conversions, plus the string<->status-enum bridge
//! shared by every table. Status columns are plain `Text`; the exact literal
//! is produced by the same `#[serde(rename_all = "snake_case")]` the
//! in-memory model already carries, so storage and wire representation never
//! drift apart.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use wfo_core::errors::{CoreError, CoreResult};
use wfo_core::model::{Artifact, ArtifactWithStepName, Event, Gate, Run, RunStatus, Step};

pub fn status_to_text<T: Serialize>(status: T) -> String {
    match serde_json::to_value(status) {
        Ok(Value::String(s)) => s,
        other => unreachable!("status enums always serialize to a string: {other:?}"),
    }
}

pub fn text_to_status<T: DeserializeOwned>(raw: &str) -> CoreResult<T> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|err| CoreError::Internal(format!("unrecognized status {raw:?}: {err}")))
}

#[derive(Queryable, Debug, Clone)]
pub struct RunRow {
    pub id: Uuid,
    pub status: String,
    pub plan: Option<Value>,
    pub project_id: String,
    pub user_id: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunRow {
    pub fn into_model(self) -> CoreResult<Run> {
        Ok(Run {
            id: self.id,
            status: text_to_status::<RunStatus>(&self.status)?,
            plan: self.plan,
            project_id: self.project_id,
            user_id: self.user_id,
            metadata: self.metadata,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at.or(self.completed_at),
        })
    }
}

#[derive(Queryable, Debug, Clone)]
pub struct StepRow {
    pub id: Uuid,
    pub run_id: Uuid,
    pub name: String,
    pub tool: String,
    pub inputs: Value,
    pub outputs: Option<Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
}

impl StepRow {
    pub fn into_model(self) -> CoreResult<Step> {
        Ok(Step {
            id: self.id,
            run_id: self.run_id,
            name: self.name,
            tool: self.tool,
            inputs: self.inputs,
            outputs: self.outputs,
            status: text_to_status(&self.status)?,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at.or(self.completed_at),
            idempotency_key: self.idempotency_key,
        })
    }
}

#[derive(Queryable, Debug, Clone)]
pub struct EventRow {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: Option<Uuid>,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    pub fn into_model(self) -> Event {
        Event { id: self.id, run_id: self.run_id, step_id: self.step_id, kind: self.event_type, payload: self.payload,
                created_at: self.created_at }
    }
}

#[derive(Queryable, Debug, Clone)]
pub struct GateRow {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_id: Uuid,
    pub gate_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl GateRow {
    pub fn into_model(self) -> CoreResult<Gate> {
        Ok(Gate { id: self.id,
                  run_id: self.run_id,
                  step_id: self.step_id,
                  gate_type: self.gate_type,
                  status: text_to_status(&self.status)?,
                  created_at: self.created_at,
                  approved_by: self.approved_by,
                  approved_at: self.approved_at })
    }
}

#[derive(Queryable, Debug, Clone)]
pub struct ArtifactRow {
    pub id: Uuid,
    pub step_id: Uuid,
    pub artifact_type: String,
    pub path: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl ArtifactRow {
    pub fn into_model(self) -> Artifact {
        Artifact { id: self.id, step_id: self.step_id, kind: self.artifact_type, path: self.path,
                   metadata: self.metadata, created_at: self.created_at }
    }

    pub fn into_model_with_step_name(self, step_name: String) -> ArtifactWithStepName {
        ArtifactWithStepName { artifact: self.into_model(), step_name }
    }
}

#[derive(Queryable, Debug, Clone)]
pub struct OutboxRow {
    pub id: Uuid,
    pub topic: String,
    pub payload: Value,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl OutboxRow {
    pub fn into_model(self) -> wfo_core::model::OutboxMessage {
        wfo_core::model::OutboxMessage { id: self.id, topic: self.topic, payload: self.payload, sent: self.sent,
                                          created_at: self.created_at, sent_at: self.sent_at }
    }
}
