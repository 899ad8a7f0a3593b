//! `test:echo` — deterministic handler exercising the full `running` →
//! `succeeded` lifecycle. Used by the test suite, not meant to represent a
//! real collaborator.

use async_trait::async_trait;
use serde_json::json;

use wfo_core::errors::CoreResult;
use wfo_core::handler::{HandlerContext, StepHandler};
use wfo_core::model::step::StepPatch;
use wfo_core::model::StepStatus;

use crate::events;

pub struct EchoHandler;

#[async_trait]
impl StepHandler for EchoHandler {
    fn matches(&self, tool: &str) -> bool {
        tool == "test:echo"
    }

    async fn run(&self, ctx: HandlerContext) -> CoreResult<()> {
        ctx.store.update_step(ctx.step.id, StepPatch { status: Some(StepStatus::Running), ..Default::default() }).await?;
        events::step_started(&ctx.store, ctx.run_id, ctx.step.id).await?;

        let outputs = json!({ "echo": ctx.step.inputs.clone() });
        ctx.store
            .update_step(ctx.step.id, StepPatch { status: Some(StepStatus::Succeeded), outputs: Some(outputs.clone()), ..Default::default() })
            .await?;
        events::step_finished(&ctx.store, ctx.run_id, ctx.step.id, outputs).await?;
        Ok(())
    }
}
