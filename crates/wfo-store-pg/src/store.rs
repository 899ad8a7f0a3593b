//! PostgreSQL `Store` implementation. Diesel's blocking API is bridged into
//! async with `tokio::task::spawn_blocking`, reusing the task-local
//! transaction connection from `tx` when one is active.

use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::ConnectionManager;
use serde_json::Value;
use uuid::Uuid;

use wfo_core::errors::{CoreError, CoreResult};
use wfo_core::model::{
    Artifact, ArtifactWithStepName, Event, Gate, GatePatch, GateStatus, OutboxMessage, Run, RunPatch, RunStatus,
    RunSummary, Step, StepPatch, StepStatus,
};
use wfo_core::store::Store;

use crate::convert::{status_to_text, ArtifactRow, EventRow, GateRow, OutboxRow, RunRow, StepRow};
use crate::error::PersistenceError;
use crate::schema::{artifacts, events, gates, inbox, outbox, runs, steps};
use crate::tx::{current_tx_conn, PgPool};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn with_conn<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, PersistenceError> + Send + 'static,
        T: Send + 'static,
    {
        if let Some(shared) = current_tx_conn() {
            return tokio::task::spawn_blocking(move || {
                let mut conn = shared.lock().expect("tx connection mutex poisoned");
                f(&mut conn)
            })
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
            .map_err(CoreError::from);
        }

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn: diesel::r2d2::PooledConnection<ConnectionManager<PgConnection>> = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?
        .map_err(CoreError::from)
    }

    /// Sets the run's terminal timestamp column, preferring `ended_at` and
    /// falling back to `completed_at` if the canonical column is absent from
    /// a legacy schema.
    fn set_run_terminal_ts(conn: &mut PgConnection, id: Uuid, ts: chrono::DateTime<Utc>) -> Result<(), PersistenceError> {
        let result = diesel::update(runs::table.filter(runs::id.eq(id)))
            .set(runs::ended_at.eq(ts))
            .execute(conn);
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let persisted: PersistenceError = err.into();
                if persisted.is_missing_column() {
                    diesel::update(runs::table.filter(runs::id.eq(id)))
                        .set(runs::completed_at.eq(ts))
                        .execute(conn)
                        .map(|_| ())
                        .map_err(PersistenceError::from)
                } else {
                    Err(persisted)
                }
            }
        }
    }

    fn set_step_terminal_ts(conn: &mut PgConnection, id: Uuid, ts: chrono::DateTime<Utc>) -> Result<(), PersistenceError> {
        let result = diesel::update(steps::table.filter(steps::id.eq(id)))
            .set(steps::ended_at.eq(ts))
            .execute(conn);
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let persisted: PersistenceError = err.into();
                if persisted.is_missing_column() {
                    diesel::update(steps::table.filter(steps::id.eq(id)))
                        .set(steps::completed_at.eq(ts))
                        .execute(conn)
                        .map(|_| ())
                        .map_err(PersistenceError::from)
                } else {
                    Err(persisted)
                }
            }
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_run(&self, plan: Option<Value>, project_id: Option<String>) -> CoreResult<Run> {
        let project_id = project_id.unwrap_or_else(|| "default".to_string());
        self.with_conn(move |conn| {
            let id = Uuid::new_v4();
            let now = Utc::now();
            diesel::insert_into(runs::table)
                .values((
                    runs::id.eq(id),
                    runs::status.eq(status_to_text(RunStatus::Queued)),
                    runs::plan.eq(&plan),
                    runs::project_id.eq(&project_id),
                    runs::metadata.eq(Value::Object(Default::default())),
                    runs::created_at.eq(now),
                ))
                .execute(conn)?;
            let row: RunRow = runs::table.filter(runs::id.eq(id)).first(conn)?;
            row.into_model().map_err(|e| PersistenceError::Unknown(e.to_string()))
        })
        .await
    }

    async fn get_run(&self, id: Uuid) -> CoreResult<Run> {
        self.with_conn(move |conn| {
            let row: RunRow = runs::table.filter(runs::id.eq(id)).first(conn)?;
            row.into_model().map_err(|e| PersistenceError::Unknown(e.to_string()))
        })
        .await
    }

    async fn update_run(&self, id: Uuid, patch: RunPatch) -> CoreResult<Run> {
        self.with_conn(move |conn| {
            if let Some(status) = patch.status {
                diesel::update(runs::table.filter(runs::id.eq(id))).set(runs::status.eq(status_to_text(status))).execute(conn)?;
                if status.is_terminal() {
                    let existing: RunRow = runs::table.filter(runs::id.eq(id)).first(conn)?;
                    if existing.ended_at.is_none() && existing.completed_at.is_none() {
                        Self::set_run_terminal_ts(conn, id, Utc::now())?;
                    }
                }
            }
            if let Some(plan) = patch.plan {
                diesel::update(runs::table.filter(runs::id.eq(id))).set(runs::plan.eq(Some(plan))).execute(conn)?;
            }
            if let Some(user_id) = patch.user_id {
                diesel::update(runs::table.filter(runs::id.eq(id))).set(runs::user_id.eq(Some(user_id))).execute(conn)?;
            }
            if let Some(metadata) = patch.metadata {
                diesel::update(runs::table.filter(runs::id.eq(id))).set(runs::metadata.eq(metadata)).execute(conn)?;
            }
            if let Some(started_at) = patch.started_at {
                diesel::update(runs::table.filter(runs::id.eq(id))).set(runs::started_at.eq(Some(started_at))).execute(conn)?;
            }
            if let Some(ended_at) = patch.ended_at {
                Self::set_run_terminal_ts(conn, id, ended_at)?;
            }
            let row: RunRow = runs::table.filter(runs::id.eq(id)).first(conn)?;
            row.into_model().map_err(|e| PersistenceError::Unknown(e.to_string()))
        })
        .await
    }

    async fn reset_run(&self, id: Uuid) -> CoreResult<Run> {
        self.with_conn(move |conn| {
            diesel::update(runs::table.filter(runs::id.eq(id)))
                .set((
                    runs::status.eq(status_to_text(RunStatus::Queued)),
                    runs::ended_at.eq(None::<chrono::DateTime<Utc>>),
                    runs::completed_at.eq(None::<chrono::DateTime<Utc>>),
                ))
                .execute(conn)?;
            let row: RunRow = runs::table.filter(runs::id.eq(id)).first(conn)?;
            row.into_model().map_err(|e| PersistenceError::Unknown(e.to_string()))
        })
        .await
    }

    async fn list_runs(&self, limit: usize, project_id: Option<&str>) -> CoreResult<Vec<RunSummary>> {
        let project_id = project_id.map(str::to_string);
        self.with_conn(move |conn| {
            let mut query = runs::table.into_boxed();
            if let Some(pid) = &project_id {
                query = query.filter(runs::project_id.eq(pid.clone()));
            }
            let rows: Vec<RunRow> = query.order(runs::created_at.desc()).limit(limit as i64).load(conn)?;
            rows.into_iter()
                .map(|row| {
                    let run = row.clone().into_model().map_err(|e| PersistenceError::Unknown(e.to_string()))?;
                    Ok(RunSummary {
                        id: run.id,
                        status: run.status,
                        created_at: run.created_at,
                        title: RunSummary::title_from_plan(&run.plan),
                        project_id: run.project_id,
                    })
                })
                .collect()
        })
        .await
    }

    async fn create_step(
        &self,
        run_id: Uuid,
        name: &str,
        tool: &str,
        inputs: Value,
        idempotency_key: Option<&str>,
    ) -> CoreResult<Step> {
        let name = name.to_string();
        let tool = tool.to_string();
        let idempotency_key = idempotency_key.map(str::to_string).filter(|k| !k.is_empty());
        self.with_conn(move |conn| {
            if let Some(key) = &idempotency_key {
                let existing: Option<StepRow> = steps::table
                    .filter(steps::run_id.eq(run_id))
                    .filter(steps::idempotency_key.eq(key))
                    .first(conn)
                    .optional()?;
                if let Some(row) = existing {
                    return row.into_model().map_err(|e| PersistenceError::Unknown(e.to_string()));
                }
            }
            let id = Uuid::new_v4();
            let now = Utc::now();
            diesel::insert_into(steps::table)
                .values((
                    steps::id.eq(id),
                    steps::run_id.eq(run_id),
                    steps::name.eq(&name),
                    steps::tool.eq(&tool),
                    steps::inputs.eq(&inputs),
                    steps::status.eq(status_to_text(StepStatus::Queued)),
                    steps::created_at.eq(now),
                    steps::idempotency_key.eq(&idempotency_key),
                ))
                .execute(conn)?;
            let row: StepRow = steps::table.filter(steps::id.eq(id)).first(conn)?;
            row.into_model().map_err(|e| PersistenceError::Unknown(e.to_string()))
        })
        .await
    }

    async fn get_step(&self, id: Uuid) -> CoreResult<Option<Step>> {
        self.with_conn(move |conn| {
            let row: Option<StepRow> = steps::table.filter(steps::id.eq(id)).first(conn).optional()?;
            row.map(|r| r.into_model().map_err(|e| PersistenceError::Unknown(e.to_string())))
                .transpose()
        })
        .await
    }

    async fn get_step_by_idempotency_key(&self, run_id: Uuid, key: &str) -> CoreResult<Option<Step>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let row: Option<StepRow> = steps::table
                .filter(steps::run_id.eq(run_id))
                .filter(steps::idempotency_key.eq(key))
                .first(conn)
                .optional()?;
            row.map(|r| r.into_model().map_err(|e| PersistenceError::Unknown(e.to_string())))
                .transpose()
        })
        .await
    }

    async fn update_step(&self, id: Uuid, patch: StepPatch) -> CoreResult<Step> {
        self.with_conn(move |conn| {
            if let Some(status) = patch.status {
                diesel::update(steps::table.filter(steps::id.eq(id))).set(steps::status.eq(status_to_text(status))).execute(conn)?;
                if status.is_terminal() {
                    let existing: StepRow = steps::table.filter(steps::id.eq(id)).first(conn)?;
                    if existing.ended_at.is_none() && existing.completed_at.is_none() {
                        Self::set_step_terminal_ts(conn, id, Utc::now())?;
                    }
                }
            }
            if let Some(outputs) = patch.outputs {
                diesel::update(steps::table.filter(steps::id.eq(id))).set(steps::outputs.eq(Some(outputs))).execute(conn)?;
            }
            if let Some(started_at) = patch.started_at {
                diesel::update(steps::table.filter(steps::id.eq(id))).set(steps::started_at.eq(Some(started_at))).execute(conn)?;
            }
            if let Some(ended_at) = patch.ended_at {
                Self::set_step_terminal_ts(conn, id, ended_at)?;
            }
            let row: StepRow = steps::table.filter(steps::id.eq(id)).first(conn)?;
            row.into_model().map_err(|e| PersistenceError::Unknown(e.to_string()))
        })
        .await
    }

    async fn reset_step(&self, id: Uuid) -> CoreResult<Step> {
        self.with_conn(move |conn| {
            diesel::update(steps::table.filter(steps::id.eq(id)))
                .set((
                    steps::status.eq(status_to_text(StepStatus::Queued)),
                    steps::started_at.eq(None::<chrono::DateTime<Utc>>),
                    steps::ended_at.eq(None::<chrono::DateTime<Utc>>),
                    steps::completed_at.eq(None::<chrono::DateTime<Utc>>),
                    steps::outputs.eq(Some(Value::Object(Default::default()))),
                ))
                .execute(conn)?;
            let row: StepRow = steps::table.filter(steps::id.eq(id)).first(conn)?;
            row.into_model().map_err(|e| PersistenceError::Unknown(e.to_string()))
        })
        .await
    }

    async fn list_steps_by_run(&self, run_id: Uuid) -> CoreResult<Vec<Step>> {
        self.with_conn(move |conn| {
            let rows: Vec<StepRow> = steps::table.filter(steps::run_id.eq(run_id)).order(steps::created_at.asc()).load(conn)?;
            rows.into_iter()
                .map(|r| r.into_model().map_err(|e| PersistenceError::Unknown(e.to_string())))
                .collect()
        })
        .await
    }

    async fn count_remaining_steps(&self, run_id: Uuid) -> CoreResult<usize> {
        self.with_conn(move |conn| {
            let remaining = [status_to_text(StepStatus::Succeeded), status_to_text(StepStatus::Cancelled)];
            let count: i64 = steps::table
                .filter(steps::run_id.eq(run_id))
                .filter(steps::status.ne_all(remaining))
                .select(count_star())
                .get_result(conn)?;
            Ok(count as usize)
        })
        .await
    }

    async fn record_event(&self, run_id: Uuid, kind: &str, payload: Value, step_id: Option<Uuid>) -> CoreResult<Event> {
        let kind = kind.to_string();
        self.with_conn(move |conn| {
            let id = Uuid::new_v4();
            let now = Utc::now();
            diesel::insert_into(events::table)
                .values((
                    events::id.eq(id),
                    events::run_id.eq(run_id),
                    events::step_id.eq(step_id),
                    events::event_type.eq(&kind),
                    events::payload.eq(&payload),
                    events::created_at.eq(now),
                ))
                .execute(conn)?;
            let row: EventRow = events::table.filter(events::id.eq(id)).first(conn)?;
            Ok(row.into_model())
        })
        .await
    }

    async fn list_events(&self, run_id: Uuid) -> CoreResult<Vec<Event>> {
        self.with_conn(move |conn| {
            let rows: Vec<EventRow> = events::table.filter(events::run_id.eq(run_id)).order(events::created_at.asc()).load(conn)?;
            Ok(rows.into_iter().map(EventRow::into_model).collect())
        })
        .await
    }

    async fn create_or_get_gate(&self, run_id: Uuid, step_id: Uuid, gate_type: &str) -> CoreResult<Gate> {
        let gate_type = gate_type.to_string();
        self.with_conn(move |conn| {
            let existing: Option<GateRow> = gates::table
                .filter(gates::run_id.eq(run_id))
                .filter(gates::step_id.eq(step_id))
                .filter(gates::gate_type.eq(&gate_type))
                .filter(gates::status.eq(status_to_text(GateStatus::Pending)))
                .order(gates::created_at.desc())
                .first(conn)
                .optional()?;
            if let Some(row) = existing {
                return row.into_model().map_err(|e| PersistenceError::Unknown(e.to_string()));
            }

            let id = Uuid::new_v4();
            let now = Utc::now();
            let insert_result = diesel::insert_into(gates::table)
                .values((
                    gates::id.eq(id),
                    gates::run_id.eq(run_id),
                    gates::step_id.eq(step_id),
                    gates::gate_type.eq(&gate_type),
                    gates::status.eq(status_to_text(GateStatus::Pending)),
                    gates::created_at.eq(now),
                ))
                .execute(conn);

            match insert_result {
                Ok(_) => {
                    let row: GateRow = gates::table.filter(gates::id.eq(id)).first(conn)?;
                    row.into_model().map_err(|e| PersistenceError::Unknown(e.to_string()))
                }
                Err(diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _)) => {
                    // Lost the race against a concurrent createOrGet; the winner's
                    // row is now the latest pending gate.
                    let row: GateRow = gates::table
                        .filter(gates::run_id.eq(run_id))
                        .filter(gates::step_id.eq(step_id))
                        .filter(gates::gate_type.eq(&gate_type))
                        .order(gates::created_at.desc())
                        .first(conn)?;
                    row.into_model().map_err(|e| PersistenceError::Unknown(e.to_string()))
                }
                Err(other) => Err(other),
            }
        })
        .await
    }

    async fn get_latest_gate(&self, run_id: Uuid, step_id: Uuid) -> CoreResult<Option<Gate>> {
        self.with_conn(move |conn| {
            let row: Option<GateRow> = gates::table
                .filter(gates::run_id.eq(run_id))
                .filter(gates::step_id.eq(step_id))
                .order(gates::created_at.desc())
                .first(conn)
                .optional()?;
            row.map(|r| r.into_model().map_err(|e| PersistenceError::Unknown(e.to_string())))
                .transpose()
        })
        .await
    }

    async fn update_gate(&self, gate_id: Uuid, patch: GatePatch) -> CoreResult<Gate> {
        self.with_conn(move |conn| {
            if let Some(status) = patch.status {
                diesel::update(gates::table.filter(gates::id.eq(gate_id))).set(gates::status.eq(status_to_text(status))).execute(conn)?;
            }
            if let Some(approved_by) = patch.approved_by {
                let existing: GateRow = gates::table.filter(gates::id.eq(gate_id)).first(conn)?;
                diesel::update(gates::table.filter(gates::id.eq(gate_id))).set(gates::approved_by.eq(Some(&approved_by))).execute(conn)?;
                if existing.approved_by.is_none() && existing.approved_at.is_none() {
                    diesel::update(gates::table.filter(gates::id.eq(gate_id))).set(gates::approved_at.eq(Some(Utc::now()))).execute(conn)?;
                }
            }
            let row: GateRow = gates::table.filter(gates::id.eq(gate_id)).first(conn)?;
            row.into_model().map_err(|e| PersistenceError::Unknown(e.to_string()))
        })
        .await
    }

    async fn add_artifact(&self, step_id: Uuid, kind: &str, path: &str, metadata: Option<Value>) -> CoreResult<Artifact> {
        let kind = kind.to_string();
        let path = path.to_string();
        self.with_conn(move |conn| {
            let id = Uuid::new_v4();
            let now = Utc::now();
            diesel::insert_into(artifacts::table)
                .values((
                    artifacts::id.eq(id),
                    artifacts::step_id.eq(step_id),
                    artifacts::artifact_type.eq(&kind),
                    artifacts::path.eq(&path),
                    artifacts::metadata.eq(metadata.unwrap_or_default()),
                    artifacts::created_at.eq(now),
                ))
                .execute(conn)?;
            let row: ArtifactRow = artifacts::table.filter(artifacts::id.eq(id)).first(conn)?;
            Ok(row.into_model())
        })
        .await
    }

    async fn list_artifacts_by_run(&self, run_id: Uuid) -> CoreResult<Vec<ArtifactWithStepName>> {
        self.with_conn(move |conn| {
            let rows: Vec<(ArtifactRow, String)> = artifacts::table
                .inner_join(steps::table)
                .filter(steps::run_id.eq(run_id))
                .select((artifacts::all_columns, steps::name))
                .load(conn)?;
            Ok(rows.into_iter().map(|(row, step_name)| row.into_model_with_step_name(step_name)).collect())
        })
        .await
    }

    async fn inbox_mark_if_new(&self, key: &str) -> CoreResult<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let inserted = diesel::insert_into(inbox::table)
                .values((inbox::key.eq(&key), inbox::created_at.eq(Utc::now())))
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn inbox_delete(&self, key: &str) -> CoreResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            diesel::delete(inbox::table.filter(inbox::key.eq(key))).execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn outbox_add(&self, topic: &str, payload: Value) -> CoreResult<OutboxMessage> {
        let topic = topic.to_string();
        self.with_conn(move |conn| {
            let id = Uuid::new_v4();
            let now = Utc::now();
            diesel::insert_into(outbox::table)
                .values((
                    outbox::id.eq(id),
                    outbox::topic.eq(&topic),
                    outbox::payload.eq(&payload),
                    outbox::sent.eq(false),
                    outbox::created_at.eq(now),
                ))
                .execute(conn)?;
            let row: OutboxRow = outbox::table.filter(outbox::id.eq(id)).first(conn)?;
            Ok(row.into_model())
        })
        .await
    }

    async fn outbox_list_unsent(&self, limit: usize) -> CoreResult<Vec<OutboxMessage>> {
        self.with_conn(move |conn| {
            let rows: Vec<OutboxRow> =
                outbox::table.filter(outbox::sent.eq(false)).order(outbox::created_at.asc()).limit(limit as i64).load(conn)?;
            Ok(rows.into_iter().map(OutboxRow::into_model).collect())
        })
        .await
    }

    async fn outbox_mark_sent(&self, id: Uuid) -> CoreResult<()> {
        self.with_conn(move |conn| {
            diesel::update(outbox::table.filter(outbox::id.eq(id)))
                .set((outbox::sent.eq(true), outbox::sent_at.eq(Some(Utc::now()))))
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
