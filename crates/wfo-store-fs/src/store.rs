//! Filesystem `Store` implementation rooted at `local_data/`. Every run gets
//! its own directory; events/gates/artifacts/outbox are each a single JSON
//! array file rewritten in full on every mutation. This backend targets
//! local development — it tolerates coarser guarantees than the relational
//! backend (a single process-wide write lock instead of per-row locking),
//! and its inbox is explicitly not durable across restarts.

use async_trait::async_trait;
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use wfo_core::errors::{CoreError, CoreResult};
use wfo_core::model::{
    Artifact, ArtifactWithStepName, Event, Gate, GatePatch, GateStatus, OutboxMessage, Run, RunPatch, RunStatus,
    RunSummary, Step, StepPatch, StepStatus,
};
use wfo_core::store::Store;

use crate::json_file::{read_optional, read_or_default, write_json};

const INDEX_CAP: usize = 100;

pub struct FsStore {
    dir: Arc<Dir>,
    /// Serializes every mutating operation. The FS backend is best-effort
    /// single-writer-per-file; a process-wide lock is the simplest way to
    /// honor that without per-path lock bookkeeping.
    write_lock: AsyncMutex<()>,
    /// Not durable across restarts — an acknowledged limitation of this backend.
    inbox: StdMutex<HashSet<String>>,
}

impl FsStore {
    pub fn open(root: impl AsRef<Path>) -> CoreResult<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|err| CoreError::StorageUnavailable(format!("{root:?}: {err}")))?;
        let dir = Dir::open_ambient_dir(root, ambient_authority())
            .map_err(|err| CoreError::StorageUnavailable(format!("{root:?}: {err}")))?;
        Ok(Self { dir: Arc::new(dir), write_lock: AsyncMutex::new(()), inbox: StdMutex::new(HashSet::new()) })
    }

    async fn blocking<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Dir) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || f(&dir)).await.map_err(|e| CoreError::Internal(e.to_string()))?
    }

    fn run_json_path(run_id: Uuid) -> String {
        format!("runs/{run_id}/run.json")
    }
    fn step_json_path(run_id: Uuid, step_id: Uuid) -> String {
        format!("runs/{run_id}/steps/{step_id}.json")
    }
    fn steps_dir_path(run_id: Uuid) -> String {
        format!("runs/{run_id}/steps")
    }
    fn events_json_path(run_id: Uuid) -> String {
        format!("runs/{run_id}/events.json")
    }
    fn gates_json_path(run_id: Uuid) -> String {
        format!("runs/{run_id}/gates.json")
    }
    fn artifacts_json_path(run_id: Uuid) -> String {
        format!("runs/{run_id}/artifacts.json")
    }
    const INDEX_JSON_PATH: &'static str = "runs/index.json";
    const OUTBOX_JSON_PATH: &'static str = "outbox.json";

    fn load_run(dir: &Dir, run_id: Uuid) -> CoreResult<Run> {
        read_optional::<Run>(dir, &Self::run_json_path(run_id))?.ok_or_else(|| CoreError::NotFound(run_id.to_string()))
    }

    fn load_steps(dir: &Dir, run_id: Uuid) -> CoreResult<Vec<Step>> {
        let steps_dir = Self::steps_dir_path(run_id);
        if !dir.exists(&steps_dir) {
            return Ok(Vec::new());
        }
        let mut steps = Vec::new();
        let entries = dir
            .read_dir(&steps_dir)
            .map_err(|err| CoreError::StorageUnavailable(format!("{steps_dir}: {err}")))?;
        for entry in entries {
            let entry = entry.map_err(|err| CoreError::StorageUnavailable(err.to_string()))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(".json") {
                continue;
            }
            let rel = format!("{steps_dir}/{name}");
            if let Some(step) = read_optional::<Step>(dir, &rel)? {
                steps.push(step);
            }
        }
        steps.sort_by_key(|s| s.created_at);
        Ok(steps)
    }

    fn touch_index(dir: &Dir, run: &Run) -> CoreResult<()> {
        let mut index: Vec<RunSummary> = read_or_default(dir, Self::INDEX_JSON_PATH)?;
        index.retain(|r| r.id != run.id);
        index.push(RunSummary {
            id: run.id,
            status: run.status,
            created_at: run.created_at,
            title: RunSummary::title_from_plan(&run.plan),
            project_id: run.project_id.clone(),
        });
        index.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        index.truncate(INDEX_CAP);
        write_json(dir, Self::INDEX_JSON_PATH, &index)
    }

    fn apply_run_patch(run: &mut Run, patch: RunPatch) {
        if let Some(status) = patch.status {
            run.status = status;
            if status.is_terminal() && run.ended_at.is_none() {
                run.ended_at = Some(Utc::now());
            }
        }
        if let Some(plan) = patch.plan {
            run.plan = Some(plan);
        }
        if let Some(user_id) = patch.user_id {
            run.user_id = Some(user_id);
        }
        if let Some(metadata) = patch.metadata {
            run.metadata = metadata;
        }
        if let Some(started_at) = patch.started_at {
            run.started_at = Some(started_at);
        }
        if let Some(ended_at) = patch.ended_at {
            run.ended_at = Some(ended_at);
        }
    }

    fn apply_step_patch(step: &mut Step, patch: StepPatch) {
        if let Some(status) = patch.status {
            step.status = status;
            if status.is_terminal() && step.ended_at.is_none() {
                step.ended_at = Some(Utc::now());
            }
        }
        if let Some(outputs) = patch.outputs {
            step.outputs = Some(outputs);
        }
        if let Some(started_at) = patch.started_at {
            step.started_at = Some(started_at);
        }
        if let Some(ended_at) = patch.ended_at {
            step.ended_at = Some(ended_at);
        }
    }
}

#[async_trait]
impl Store for FsStore {
    async fn create_run(&self, plan: Option<Value>, project_id: Option<String>) -> CoreResult<Run> {
        let _guard = self.write_lock.lock().await;
        self.blocking(move |dir| {
            let run = Run::new(plan, project_id);
            write_json(dir, &Self::run_json_path(run.id), &run)?;
            Self::touch_index(dir, &run)?;
            Ok(run)
        })
        .await
    }

    async fn get_run(&self, id: Uuid) -> CoreResult<Run> {
        self.blocking(move |dir| Self::load_run(dir, id)).await
    }

    async fn update_run(&self, id: Uuid, patch: RunPatch) -> CoreResult<Run> {
        let _guard = self.write_lock.lock().await;
        self.blocking(move |dir| {
            let mut run = Self::load_run(dir, id)?;
            Self::apply_run_patch(&mut run, patch);
            write_json(dir, &Self::run_json_path(run.id), &run)?;
            Self::touch_index(dir, &run)?;
            Ok(run)
        })
        .await
    }

    async fn reset_run(&self, id: Uuid) -> CoreResult<Run> {
        let _guard = self.write_lock.lock().await;
        self.blocking(move |dir| {
            let mut run = Self::load_run(dir, id)?;
            run.status = RunStatus::Queued;
            run.ended_at = None;
            write_json(dir, &Self::run_json_path(run.id), &run)?;
            Self::touch_index(dir, &run)?;
            Ok(run)
        })
        .await
    }

    async fn list_runs(&self, limit: usize, project_id: Option<&str>) -> CoreResult<Vec<RunSummary>> {
        let project_id = project_id.map(str::to_string);
        self.blocking(move |dir| {
            let mut index: Vec<RunSummary> = read_or_default(dir, Self::INDEX_JSON_PATH)?;
            index.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            if let Some(pid) = &project_id {
                index.retain(|r| &r.project_id == pid);
            }
            index.truncate(limit);
            Ok(index)
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
        let _guard = self.write_lock.lock().await;
        let name = name.to_string();
        let tool = tool.to_string();
        let idempotency_key = idempotency_key.map(str::to_string);
        self.blocking(move |dir| {
            if let Some(key) = idempotency_key.as_deref().filter(|k| !k.is_empty()) {
                let steps = Self::load_steps(dir, run_id)?;
                if let Some(existing) = steps.into_iter().find(|s| s.idempotency_key.as_deref() == Some(key)) {
                    return Ok(existing);
                }
            }
            let step = Step::new(run_id, name, tool, inputs, idempotency_key);
            write_json(dir, &Self::step_json_path(run_id, step.id), &step)?;
            Ok(step)
        })
        .await
    }

    async fn get_step(&self, id: Uuid) -> CoreResult<Option<Step>> {
        // Steps are keyed by (run_id, step_id) on disk; without the run_id
        // we scan every run directory. Acceptable for the FS backend's
        // local-development scope.
        self.blocking(move |dir| {
            if !dir.exists("runs") {
                return Ok(None);
            }
            let entries = dir.read_dir("runs").map_err(|err| CoreError::StorageUnavailable(err.to_string()))?;
            for entry in entries {
                let entry = entry.map_err(|err| CoreError::StorageUnavailable(err.to_string()))?;
                let run_name = entry.file_name();
                let run_name = run_name.to_string_lossy();
                let Ok(run_id) = run_name.parse::<Uuid>() else { continue };
                let rel = Self::step_json_path(run_id, id);
                if let Some(step) = read_optional::<Step>(dir, &rel)? {
                    return Ok(Some(step));
                }
            }
            Ok(None)
        })
        .await
    }

    async fn get_step_by_idempotency_key(&self, run_id: Uuid, key: &str) -> CoreResult<Option<Step>> {
        let key = key.to_string();
        self.blocking(move |dir| {
            let steps = Self::load_steps(dir, run_id)?;
            Ok(steps.into_iter().find(|s| s.idempotency_key.as_deref() == Some(key.as_str())))
        })
        .await
    }

    async fn update_step(&self, id: Uuid, patch: StepPatch) -> CoreResult<Step> {
        let _guard = self.write_lock.lock().await;
        self.blocking(move |dir| {
            let entries = dir.read_dir("runs").map_err(|err| CoreError::StorageUnavailable(err.to_string()))?;
            for entry in entries {
                let entry = entry.map_err(|err| CoreError::StorageUnavailable(err.to_string()))?;
                let run_name = entry.file_name();
                let run_name = run_name.to_string_lossy();
                let Ok(run_id) = run_name.parse::<Uuid>() else { continue };
                let rel = Self::step_json_path(run_id, id);
                if let Some(mut step) = read_optional::<Step>(dir, &rel)? {
                    Self::apply_step_patch(&mut step, patch);
                    write_json(dir, &rel, &step)?;
                    return Ok(step);
                }
            }
            Err(CoreError::NotFound(id.to_string()))
        })
        .await
    }

    async fn reset_step(&self, id: Uuid) -> CoreResult<Step> {
        let _guard = self.write_lock.lock().await;
        self.blocking(move |dir| {
            let entries = dir.read_dir("runs").map_err(|err| CoreError::StorageUnavailable(err.to_string()))?;
            for entry in entries {
                let entry = entry.map_err(|err| CoreError::StorageUnavailable(err.to_string()))?;
                let run_name = entry.file_name();
                let run_name = run_name.to_string_lossy();
                let Ok(run_id) = run_name.parse::<Uuid>() else { continue };
                let rel = Self::step_json_path(run_id, id);
                if let Some(mut step) = read_optional::<Step>(dir, &rel)? {
                    step.status = StepStatus::Queued;
                    step.started_at = None;
                    step.ended_at = None;
                    step.outputs = Some(Value::Object(Default::default()));
                    write_json(dir, &rel, &step)?;
                    return Ok(step);
                }
            }
            Err(CoreError::NotFound(id.to_string()))
        })
        .await
    }

    async fn list_steps_by_run(&self, run_id: Uuid) -> CoreResult<Vec<Step>> {
        self.blocking(move |dir| Self::load_steps(dir, run_id)).await
    }

    async fn count_remaining_steps(&self, run_id: Uuid) -> CoreResult<usize> {
        self.blocking(move |dir| {
            let steps = Self::load_steps(dir, run_id)?;
            Ok(steps.into_iter().filter(|s| s.status.counts_as_remaining()).count())
        })
        .await
    }

    async fn record_event(&self, run_id: Uuid, kind: &str, payload: Value, step_id: Option<Uuid>) -> CoreResult<Event> {
        let _guard = self.write_lock.lock().await;
        let kind = kind.to_string();
        self.blocking(move |dir| {
            let mut events: Vec<Event> = read_or_default(dir, &Self::events_json_path(run_id))?;
            let event = Event::new(run_id, kind, payload, step_id);
            events.push(event.clone());
            write_json(dir, &Self::events_json_path(run_id), &events)?;
            Ok(event)
        })
        .await
    }

    async fn list_events(&self, run_id: Uuid) -> CoreResult<Vec<Event>> {
        self.blocking(move |dir| {
            let mut events: Vec<Event> = read_or_default(dir, &Self::events_json_path(run_id))?;
            events.sort_by_key(|e| e.created_at);
            Ok(events)
        })
        .await
    }

    async fn create_or_get_gate(&self, run_id: Uuid, step_id: Uuid, gate_type: &str) -> CoreResult<Gate> {
        let _guard = self.write_lock.lock().await;
        let gate_type = gate_type.to_string();
        self.blocking(move |dir| {
            let mut gates: Vec<Gate> = read_or_default(dir, &Self::gates_json_path(run_id))?;
            if let Some(existing) = gates
                .iter()
                .filter(|g| g.step_id == step_id && g.gate_type == gate_type && g.status == GateStatus::Pending)
                .max_by_key(|g| g.created_at)
            {
                return Ok(existing.clone());
            }
            let gate = Gate::new_pending(run_id, step_id, gate_type);
            gates.push(gate.clone());
            write_json(dir, &Self::gates_json_path(run_id), &gates)?;
            Ok(gate)
        })
        .await
    }

    async fn get_latest_gate(&self, run_id: Uuid, step_id: Uuid) -> CoreResult<Option<Gate>> {
        self.blocking(move |dir| {
            let gates: Vec<Gate> = read_or_default(dir, &Self::gates_json_path(run_id))?;
            Ok(gates.into_iter().filter(|g| g.step_id == step_id).max_by_key(|g| g.created_at))
        })
        .await
    }

    async fn update_gate(&self, gate_id: Uuid, patch: GatePatch) -> CoreResult<Gate> {
        let _guard = self.write_lock.lock().await;
        self.blocking(move |dir| {
            if !dir.exists("runs") {
                return Err(CoreError::NotFound(gate_id.to_string()));
            }
            let entries = dir.read_dir("runs").map_err(|err| CoreError::StorageUnavailable(err.to_string()))?;
            for entry in entries {
                let entry = entry.map_err(|err| CoreError::StorageUnavailable(err.to_string()))?;
                let run_name = entry.file_name();
                let run_name = run_name.to_string_lossy();
                let Ok(run_id) = run_name.parse::<Uuid>() else { continue };
                let rel = Self::gates_json_path(run_id);
                let mut gates: Vec<Gate> = read_or_default(dir, &rel)?;
                if let Some(gate) = gates.iter_mut().find(|g| g.id == gate_id) {
                    if let Some(status) = patch.status {
                        gate.status = status;
                    }
                    if let Some(approved_by) = patch.approved_by {
                        let was_unset = gate.approved_by.is_none();
                        gate.approved_by = Some(approved_by);
                        if was_unset && gate.approved_at.is_none() {
                            gate.approved_at = Some(Utc::now());
                        }
                    }
                    let updated = gate.clone();
                    write_json(dir, &rel, &gates)?;
                    return Ok(updated);
                }
            }
            Err(CoreError::NotFound(gate_id.to_string()))
        })
        .await
    }

    async fn add_artifact(&self, step_id: Uuid, kind: &str, path: &str, metadata: Option<Value>) -> CoreResult<Artifact> {
        let _guard = self.write_lock.lock().await;
        let kind = kind.to_string();
        let path = path.to_string();
        self.blocking(move |dir| {
            let run_id = Self::find_run_for_step(dir, step_id)?;
            let mut artifacts: Vec<Artifact> = read_or_default(dir, &Self::artifacts_json_path(run_id))?;
            let artifact = Artifact {
                id: Uuid::new_v4(),
                step_id,
                kind,
                path,
                metadata: metadata.unwrap_or_default(),
                created_at: Utc::now(),
            };
            artifacts.push(artifact.clone());
            write_json(dir, &Self::artifacts_json_path(run_id), &artifacts)?;
            Ok(artifact)
        })
        .await
    }

    async fn list_artifacts_by_run(&self, run_id: Uuid) -> CoreResult<Vec<ArtifactWithStepName>> {
        self.blocking(move |dir| {
            let artifacts: Vec<Artifact> = read_or_default(dir, &Self::artifacts_json_path(run_id))?;
            let steps = Self::load_steps(dir, run_id)?;
            Ok(artifacts
                .into_iter()
                .map(|artifact| {
                    let step_name =
                        steps.iter().find(|s| s.id == artifact.step_id).map(|s| s.name.clone()).unwrap_or_default();
                    ArtifactWithStepName { artifact, step_name }
                })
                .collect())
        })
        .await
    }

    async fn inbox_mark_if_new(&self, key: &str) -> CoreResult<bool> {
        let mut inbox = self.inbox.lock().unwrap();
        Ok(inbox.insert(key.to_string()))
    }

    async fn inbox_delete(&self, key: &str) -> CoreResult<()> {
        let mut inbox = self.inbox.lock().unwrap();
        inbox.remove(key);
        Ok(())
    }

    async fn outbox_add(&self, topic: &str, payload: Value) -> CoreResult<OutboxMessage> {
        let _guard = self.write_lock.lock().await;
        let topic = topic.to_string();
        self.blocking(move |dir| {
            let mut outbox: Vec<OutboxMessage> = read_or_default(dir, Self::OUTBOX_JSON_PATH)?;
            let message = OutboxMessage::new(topic, payload);
            outbox.push(message.clone());
            write_json(dir, Self::OUTBOX_JSON_PATH, &outbox)?;
            Ok(message)
        })
        .await
    }

    async fn outbox_list_unsent(&self, limit: usize) -> CoreResult<Vec<OutboxMessage>> {
        self.blocking(move |dir| {
            let mut outbox: Vec<OutboxMessage> = read_or_default(dir, Self::OUTBOX_JSON_PATH)?;
            outbox.retain(|m| !m.sent);
            outbox.sort_by_key(|m| m.created_at);
            outbox.truncate(limit);
            Ok(outbox)
        })
        .await
    }

    async fn outbox_mark_sent(&self, id: Uuid) -> CoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.blocking(move |dir| {
            let mut outbox: Vec<OutboxMessage> = read_or_default(dir, Self::OUTBOX_JSON_PATH)?;
            if let Some(message) = outbox.iter_mut().find(|m| m.id == id) {
                message.sent = true;
                message.sent_at = Some(Utc::now());
            }
            write_json(dir, Self::OUTBOX_JSON_PATH, &outbox)
        })
        .await
    }
}

impl FsStore {
    fn find_run_for_step(dir: &Dir, step_id: Uuid) -> CoreResult<Uuid> {
        if !dir.exists("runs") {
            return Err(CoreError::NotFound(step_id.to_string()));
        }
        let entries = dir.read_dir("runs").map_err(|err| CoreError::StorageUnavailable(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| CoreError::StorageUnavailable(err.to_string()))?;
            let run_name = entry.file_name();
            let run_name = run_name.to_string_lossy();
            let Ok(run_id) = run_name.parse::<Uuid>() else { continue };
            if dir.exists(&Self::step_json_path(run_id, step_id)) {
                return Ok(run_id);
            }
        }
        Err(CoreError::NotFound(step_id.to_string()))
    }
}
