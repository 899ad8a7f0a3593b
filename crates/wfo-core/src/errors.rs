//! The error taxonomy every other crate normalizes into at its public
//! boundary: `Store` implementations translate driver/IO errors into
//! `CoreError` before returning; the worker and queue propagate it verbatim.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("path traversal: {0}")]
    PathTraversal(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("gate denied: {0}")]
    GateDenied(String),

    #[error("no handler for tool {0:?}")]
    NoHandler(String),

    #[error("exhausted retries on topic {0:?}")]
    Exhausted(String),

    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Storage errors classified as transient/retryable by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::StorageUnavailable(_) | CoreError::Timeout(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
