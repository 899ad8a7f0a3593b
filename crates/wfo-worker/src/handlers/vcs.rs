//! `vcs:commit` — the version-control-commit handler. Embeds the
//! manual-gate pattern (default gate type `manual:git_pr`) ahead of its own
//! work: the first visit creates the gate and short-circuits, a later visit
//! sees a terminal gate and proceeds. Does not shell out to `git` — actual
//! VCS operations are an external collaborator out of this core's scope;
//! this handler only records an `Artifact` whose `path` is a
//! caller-supplied URI.

use async_trait::async_trait;
use serde_json::json;

use wfo_core::errors::CoreResult;
use wfo_core::handler::{HandlerContext, StepHandler};
use wfo_core::model::event::kinds;
use wfo_core::model::step::StepPatch;
use wfo_core::model::StepStatus;

use crate::events;
use crate::handlers::gate::{run_gate_cycle, GateOutcome};

const DEFAULT_GATE_TYPE: &str = "manual:git_pr";

pub struct VcsCommitHandler;

#[async_trait]
impl StepHandler for VcsCommitHandler {
    fn matches(&self, tool: &str) -> bool {
        tool == "vcs:commit"
    }

    async fn run(&self, ctx: HandlerContext) -> CoreResult<()> {
        if ctx.step.status != StepStatus::Running {
            ctx.store.update_step(ctx.step.id, StepPatch { status: Some(StepStatus::Running), ..Default::default() }).await?;
        }

        let gate_type = ctx.step.inputs.get("gate_type").and_then(|v| v.as_str()).unwrap_or(DEFAULT_GATE_TYPE);

        match run_gate_cycle(&ctx, gate_type).await? {
            GateOutcome::Waiting => Ok(()),
            GateOutcome::Passed => {
                let base_branch = std::env::var("GIT_DEFAULT_BASE").unwrap_or_else(|_| "main".to_string());
                let path = ctx
                    .step
                    .inputs
                    .get("artifact_path")
                    .and_then(|v| v.as_str())
                    .unwrap_or("pr://pending")
                    .to_string();
                let artifact_type = ctx.step.inputs.get("artifact_type").and_then(|v| v.as_str()).unwrap_or("text/x-diff");

                let artifact = ctx
                    .store
                    .add_artifact(ctx.step.id, artifact_type, &path, Some(json!({ "base_branch": base_branch })))
                    .await?;

                let outputs = json!({ "artifact_id": artifact.id, "path": artifact.path });
                ctx.store
                    .update_step(ctx.step.id, StepPatch { status: Some(StepStatus::Succeeded), outputs: Some(outputs.clone()), ..Default::default() })
                    .await?;
                events::record(&ctx.store, ctx.run_id, kinds::CODEGEN_COMPLETED, outputs.clone(), Some(ctx.step.id)).await?;
                events::step_finished(&ctx.store, ctx.run_id, ctx.step.id, outputs).await?;
                Ok(())
            }
        }
    }
}
