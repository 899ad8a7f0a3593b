//! wfo-core: the durable workflow orchestrator's execution substrate.
//!
//! This crate owns the backend-agnostic domain model (`Run`, `Step`,
//! `Event`, `Gate`, `Artifact`, inbox/outbox records), the `Store` trait both
//! storage backends implement, the `Queue` trait the in-memory and
//! broker-backed queues implement, the `StepHandler`/`HandlerRegistry`
//! dispatch table, and the error taxonomy every crate normalizes into.
//!
//! Nothing in this crate talks to Postgres, the filesystem, or a subprocess
//! directly — those live in `wfo-store-pg`, `wfo-store-fs`, and
//! `wfo-worker`'s built-in handlers respectively.

pub mod constants;
pub mod errors;
pub mod handler;
pub mod metrics;
pub mod model;
pub mod queue;
pub mod store;

pub use errors::{CoreError, CoreResult};
pub use handler::{HandlerContext, HandlerRegistry, StepHandler};
pub use metrics::{MetricSink, TracingMetricSink};
pub use queue::{EnqueueOptions, JobHandler, Queue, QueueCounts};
pub use store::Store;
