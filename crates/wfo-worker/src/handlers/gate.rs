//! The manual-approval gate pattern: create-or-observe a `Gate` row,
//! cooperatively re-enqueue the step while it is pending, and resolve the
//! step to `succeeded`/`failed` once the gate reaches a terminal status.
//!
//! Exposed two ways: `ManualGateHandler` is the generic `manual:*` handler
//! (the gate type is the tool string itself); `run_gate_cycle` is the same
//! state machine factored out so a handler like `vcs:commit` can embed it
//! ahead of its own work (an "embedded manual gate" pattern).

use async_trait::async_trait;
use serde_json::Value;

use wfo_core::constants::GATE_CHECK_DELAY_MS;
use wfo_core::errors::{CoreError, CoreResult};
use wfo_core::handler::{HandlerContext, StepHandler};
use wfo_core::model::gate::GateStatus;
use wfo_core::model::step::StepPatch;
use wfo_core::model::StepStatus;
use wfo_core::queue::EnqueueOptions;

use crate::events;
use crate::worker::{StepReadyPayload, STEP_READY_TOPIC};

/// The outcome of one pass through the gate state machine. `Waiting` means
/// the caller should return without doing any further work this attempt;
/// `Passed` means the caller's actual work (or, for the bare `manual:*`
/// handler, nothing further) may proceed.
pub enum GateOutcome {
    Waiting,
    Passed,
}

async fn requeue_self(ctx: &HandlerContext) -> CoreResult<()> {
    let payload = StepReadyPayload { run_id: ctx.run_id, step_id: ctx.step.id };
    let payload = serde_json::to_value(payload).map_err(|err| CoreError::Internal(err.to_string()))?;
    ctx.queue.enqueue(STEP_READY_TOPIC, payload, EnqueueOptions { delay_ms: GATE_CHECK_DELAY_MS }).await
}

/// Runs one pass of the gate state machine for `gate_type` against the
/// step in `ctx`. On denial, resolves the step to `failed`, emits
/// `step.failed`, and returns `Err(CoreError::GateDenied)` — the caller
/// should propagate this, not swallow it.
pub async fn run_gate_cycle(ctx: &HandlerContext, gate_type: &str) -> CoreResult<GateOutcome> {
    let latest = ctx.store.get_latest_gate(ctx.run_id, ctx.step.id).await?;

    let gate = match latest {
        None => {
            let gate = ctx.store.create_or_get_gate(ctx.run_id, ctx.step.id, gate_type).await?;
            events::gate_created(&ctx.store, ctx.run_id, ctx.step.id, gate_type).await?;
            gate
        }
        Some(gate) => gate,
    };

    if gate.status == GateStatus::Pending {
        requeue_self(ctx).await?;
        events::gate_waiting(&ctx.store, ctx.run_id, ctx.step.id, gate_type).await?;
        return Ok(GateOutcome::Waiting);
    }

    if gate.status.is_passing() {
        return Ok(GateOutcome::Passed);
    }

    // rejected/failed (and, defensively, cancelled): a non-pending,
    // non-passing gate denies the step.
    ctx.store.update_step(ctx.step.id, StepPatch { status: Some(StepStatus::Failed), ..Default::default() }).await?;
    events::step_failed(
        &ctx.store,
        ctx.run_id,
        ctx.step.id,
        serde_json::json!({ "error": "gate_denied", "gate_type": gate_type, "gate_status": gate.status.to_string() }),
    )
    .await?;
    Err(CoreError::GateDenied(format!("{gate_type} gate resolved as {}", gate.status)))
}

/// The generic `manual:*` handler: the tool string itself is the gate type.
pub struct ManualGateHandler;

#[async_trait]
impl StepHandler for ManualGateHandler {
    fn matches(&self, tool: &str) -> bool {
        tool.starts_with("manual:")
    }

    async fn run(&self, ctx: HandlerContext) -> CoreResult<()> {
        if ctx.step.status != StepStatus::Running {
            ctx.store.update_step(ctx.step.id, StepPatch { status: Some(StepStatus::Running), ..Default::default() }).await?;
        }

        let gate_type = ctx.step.tool.clone();
        match run_gate_cycle(&ctx, &gate_type).await? {
            GateOutcome::Waiting => Ok(()),
            GateOutcome::Passed => {
                ctx.store
                    .update_step(ctx.step.id, StepPatch { status: Some(StepStatus::Succeeded), outputs: Some(Value::Object(Default::default())), ..Default::default() })
                    .await?;
                events::step_finished(&ctx.store, ctx.run_id, ctx.step.id, Value::Object(Default::default())).await?;
                Ok(())
            }
        }
    }
}
