//! Diesel/connection error normalization, converted onward into
//! `wfo_core::CoreError` at the `Store` trait boundary.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;
use wfo_core::errors::CoreError;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl PersistenceError {
    /// Best-effort detection of "column X does not exist" driver errors, used
    /// by the dual `ended_at`/`completed_at` column tolerance.
    pub fn is_missing_column(&self) -> bool {
        match self {
            PersistenceError::Unknown(msg) => {
                let m = msg.to_lowercase();
                m.contains("column") && m.contains("does not exist")
            }
            _ => false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PersistenceError::SerializationConflict | PersistenceError::TransientIo(_))
    }
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                other => Self::Unknown(format!("db error kind {other:?}: {}", info.message())),
            },
            DieselError::DeserializationError(e) => Self::Unknown(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
                Self::Unknown(format!("rollback={rollback_error}; commit={commit_error}"))
            }
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<r2d2::Error> for PersistenceError {
    fn from(err: r2d2::Error) -> Self {
        Self::TransientIo(format!("pool error: {err}"))
    }
}

impl From<PersistenceError> for CoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound => CoreError::NotFound("row not found".to_string()),
            PersistenceError::UniqueViolation(msg) => CoreError::Conflict(msg),
            PersistenceError::CheckViolation(msg) => CoreError::Validation(msg),
            PersistenceError::ForeignKeyViolation(msg) => CoreError::Validation(msg),
            PersistenceError::SerializationConflict => CoreError::StorageUnavailable("serialization conflict".into()),
            PersistenceError::TransientIo(msg) => CoreError::StorageUnavailable(msg),
            PersistenceError::Unknown(msg) => CoreError::Internal(msg),
        }
    }
}
