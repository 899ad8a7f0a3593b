//! Built-in reference handlers. These exist so the worker loop, gate
//! subsystem, and lifecycle are exercisable end-to-end without a real
//! LLM/codegen/VCS collaborator wired in; a deployment would register its
//! own handlers ahead of (or instead of) these in the registry.

pub mod echo;
pub mod fail;
pub mod gate;
pub mod shell;
pub mod vcs;

use std::sync::Arc;

use wfo_core::handler::HandlerRegistry;

/// Builds a registry carrying every built-in handler, in an order where the
/// more specific tool-string matchers naturally don't collide (`manual:*`
/// is a prefix match but no other handler's tool starts with `manual:`, so
/// registration order does not matter among these five).
pub fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(echo::EchoHandler));
    registry.register(Arc::new(fail::FailHandler));
    registry.register(Arc::new(gate::ManualGateHandler));
    registry.register(Arc::new(shell::ShellHandler));
    registry.register(Arc::new(vcs::VcsCommitHandler));
    registry
}
