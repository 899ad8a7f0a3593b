//! `test:fail` — deterministic always-failing handler exercising the
//! backoff schedule and DLQ path. Every invocation marks the step `running`
//! (idempotent across retries) and then returns an error; the job-level
//! retry/DLQ outcome is entirely the queue's concern, not reflected in the
//! step row here.

use async_trait::async_trait;

use wfo_core::errors::{CoreError, CoreResult};
use wfo_core::handler::{HandlerContext, StepHandler};
use wfo_core::model::step::StepPatch;
use wfo_core::model::StepStatus;

use crate::events;

pub struct FailHandler;

#[async_trait]
impl StepHandler for FailHandler {
    fn matches(&self, tool: &str) -> bool {
        tool == "test:fail"
    }

    async fn run(&self, ctx: HandlerContext) -> CoreResult<()> {
        if ctx.step.status != StepStatus::Running {
            ctx.store.update_step(ctx.step.id, StepPatch { status: Some(StepStatus::Running), ..Default::default() }).await?;
            events::step_started(&ctx.store, ctx.run_id, ctx.step.id).await?;
        }
        Err(CoreError::Internal("test:fail always fails".to_string()))
    }
}
