//! wfo-worker: the `step.ready` consumer and its built-in reference handlers.
//!
//! The worker itself is dispatch plumbing: load the step, resolve a handler
//! from the registry, invoke it, and let failures propagate to the queue
//! layer so retry/DLQ logic applies. Handlers own their own lifecycle
//! transitions and events — the worker never double-transitions a step.

pub mod events;
pub mod handlers;
pub mod worker;

pub use worker::{StepReadyPayload, Worker};
