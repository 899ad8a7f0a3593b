//! A dynamic, ordered dispatch table keyed by a step's `tool` string.
//! Handlers are external collaborators from the core's point of view: the
//! registry only knows how to pick one and hand it a context.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::CoreResult;
use crate::model::Step;
use crate::queue::Queue;
use crate::store::Store;

/// Everything a handler needs to do its work and record its own transitions.
/// `queue` is the same `step.ready` queue the worker drains; handlers that
/// implement the manual-gate pattern re-enqueue the current step on it
/// directly rather than going through the worker.
pub struct HandlerContext {
    pub run_id: Uuid,
    pub step: Step,
    pub store: Arc<dyn Store>,
    pub queue: Arc<dyn Queue>,
}

/// `match` decides whether this handler owns a tool string; `run` performs
/// the step's actual work, including its own lifecycle transitions and
/// events. The worker never double-transitions a step a handler already
/// moved to a terminal state.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Pure predicate: must not have side effects.
    fn matches(&self, tool: &str) -> bool;

    async fn run(&self, ctx: HandlerContext) -> CoreResult<()>;
}

/// First-match-wins ordered list of handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register(&mut self, handler: Arc<dyn StepHandler>) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    /// Returns the first registered handler whose `matches` accepts `tool`.
    pub fn resolve(&self, tool: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.iter().find(|h| h.matches(tool)).cloned()
    }
}
