//! `shell:run` — spawns `inputs.command` under `/bin/sh -c`, bounded by
//! `inputs.timeout` (default `DEFAULT_SHELL_TIMEOUT_MS`). On exceedance the
//! child is sent a polite stop signal (SIGTERM on Unix via the `nix` crate;
//! `Child::kill` on other platforms) before the step is resolved
//! `timed_out`. Grounded in `oddjobs`' process-spawning idiom, simplified to
//! a single blocking-timeout contract rather than a full shell grammar.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use wfo_core::constants::DEFAULT_SHELL_TIMEOUT_MS;
use wfo_core::errors::{CoreError, CoreResult};
use wfo_core::handler::{HandlerContext, StepHandler};
use wfo_core::model::step::StepPatch;
use wfo_core::model::StepStatus;

use crate::events;

pub struct ShellHandler;

fn timeout_ms(inputs: &serde_json::Value) -> u64 {
    inputs.get("timeout").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_SHELL_TIMEOUT_MS)
}

#[cfg(unix)]
async fn terminate_politely(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGTERM);
        if tokio::time::timeout(Duration::from_millis(500), child.wait()).await.is_err() {
            let _ = child.kill().await;
        }
    } else {
        let _ = child.kill().await;
    }
}

#[cfg(not(unix))]
async fn terminate_politely(child: &mut Child) {
    let _ = child.kill().await;
}

#[async_trait]
impl StepHandler for ShellHandler {
    fn matches(&self, tool: &str) -> bool {
        tool == "shell:run"
    }

    async fn run(&self, ctx: HandlerContext) -> CoreResult<()> {
        ctx.store.update_step(ctx.step.id, StepPatch { status: Some(StepStatus::Running), ..Default::default() }).await?;
        events::step_started(&ctx.store, ctx.run_id, ctx.step.id).await?;

        let command = ctx
            .step
            .inputs
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::Validation("shell:run requires inputs.command".to_string()))?
            .to_string();
        let cwd = ctx.step.inputs.get("cwd").and_then(|v| v.as_str()).map(str::to_string);
        let timeout_ms = timeout_ms(&ctx.step.inputs);

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(&command);
        if let Some(cwd) = &cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|err| CoreError::Internal(format!("spawn failed: {err}")))?;
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        // Drain both pipes concurrently with the wait, not after it — a
        // child writing more than a pipe buffer before exit would otherwise
        // block on a full pipe while we're still waiting for it to exit.
        let drain_and_wait = async {
            let mut stdout = String::new();
            let mut stderr = String::new();
            let (_, _, status) = tokio::join!(
                async {
                    if let Some(pipe) = stdout_pipe.as_mut() {
                        let _ = pipe.read_to_string(&mut stdout).await;
                    }
                },
                async {
                    if let Some(pipe) = stderr_pipe.as_mut() {
                        let _ = pipe.read_to_string(&mut stderr).await;
                    }
                },
                child.wait(),
            );
            (stdout, stderr, status)
        };

        let wait_result = tokio::time::timeout(Duration::from_millis(timeout_ms), drain_and_wait).await;

        match wait_result {
            Ok((stdout, stderr, Ok(status))) => {
                let outputs = json!({ "stdout": stdout, "stderr": stderr, "exit_code": status.code() });

                if status.success() {
                    ctx.store
                        .update_step(ctx.step.id, StepPatch { status: Some(StepStatus::Succeeded), outputs: Some(outputs.clone()), ..Default::default() })
                        .await?;
                    events::step_finished(&ctx.store, ctx.run_id, ctx.step.id, outputs).await?;
                    Ok(())
                } else {
                    ctx.store
                        .update_step(ctx.step.id, StepPatch { status: Some(StepStatus::Failed), outputs: Some(outputs.clone()), ..Default::default() })
                        .await?;
                    events::step_failed(&ctx.store, ctx.run_id, ctx.step.id, outputs).await?;
                    Err(CoreError::Internal(format!("command exited with {:?}", status.code())))
                }
            }
            Ok((_, _, Err(err))) => Err(CoreError::Internal(format!("command wait failed: {err}"))),
            Err(_elapsed) => {
                terminate_politely(&mut child).await;
                let error = json!({ "error": "timed_out", "timeout_ms": timeout_ms });
                ctx.store
                    .update_step(ctx.step.id, StepPatch { status: Some(StepStatus::TimedOut), outputs: Some(error.clone()), ..Default::default() })
                    .await?;
                events::step_failed(&ctx.store, ctx.run_id, ctx.step.id, error).await?;
                Err(CoreError::Timeout(format!("shell command exceeded {timeout_ms}ms")))
            }
        }
    }
}
