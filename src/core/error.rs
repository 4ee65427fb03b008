//! Error taxonomy for pipeline operations.

use thiserror::Error;

use crate::domain::{FieldError, JobId, Role, Stage};
use crate::store::DatabaseError;

/// Errors returned by the engine, the desk and the task board
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A request field is missing or unacceptable; fix the request
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The job number is already taken; retry only with a different key
    #[error("Job number already exists: {0}")]
    DuplicateJobNumber(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Role {role} may not {action}")]
    Forbidden { role: Role, action: String },

    /// Storage failure; the operation was rolled back and may be retried
    #[error("Persistence error: {0}")]
    Persistence(#[source] DatabaseError),

    /// The operation ran past its deadline and was rolled back
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl PipelineError {
    pub fn job_not_found(id: JobId) -> Self {
        Self::NotFound {
            entity: "Job",
            id: id.to_string(),
        }
    }

    pub fn forbidden(role: Role, action: impl Into<String>) -> Self {
        Self::Forbidden {
            role,
            action: action.into(),
        }
    }

    pub fn stage_forbidden(role: Role, stage: Stage) -> Self {
        Self::forbidden(role, format!("update {stage} data"))
    }

    /// Whether repeating the same request can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Timeout { .. })
    }

    /// Map a storage error, attaching the operation timeout for deadline
    /// failures.
    pub(crate) fn from_store(err: DatabaseError, timeout_ms: u64) -> Self {
        match err {
            DatabaseError::DeadlineExceeded => Self::Timeout { timeout_ms },
            DatabaseError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Persistence(other),
        }
    }
}

impl From<FieldError> for PipelineError {
    fn from(err: FieldError) -> Self {
        Self::Validation(err.to_string())
    }
}
