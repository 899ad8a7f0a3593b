//! Engine-wide constants shared across the store, queue, and worker crates.

/// Delay (ms) before a `manual:` gate handler re-enqueues its step while the
/// gate is still pending.
pub const GATE_CHECK_DELAY_MS: u64 = 5_000;

/// Default shell-handler timeout (ms) when `inputs.timeout` is absent.
pub const DEFAULT_SHELL_TIMEOUT_MS: u64 = 30_000;

/// Default project id assigned to a run when the caller does not supply one.
pub const DEFAULT_PROJECT_ID: &str = "default";

/// Queue backoff schedule, indexed by the job's current `__attempt` (1-based).
/// `schedule[attempt - 1]` gives the delay before the next attempt; an
/// attempt past the end of the slice diverts to the dead-letter queue.
pub const BACKOFF_SCHEDULE_MS: &[u64] = &[0, 2_000, 5_000, 10_000];

/// Default per-topic concurrency limit for the queue, overridable by
/// `WORKER_CONCURRENCY` / `NOFX_WORKER_CONCURRENCY`.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;
