// Service errors
//
// Wraps the engine's error types and adds the request-level failures the
// services detect themselves.

use jobflow_engine::{ErrorKind, RunnerError, StoreError, WorkflowError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// Malformed request that passed deserialization
    #[error("{0}")]
    Validation(String),

    /// Change refused because other records still reference the target
    #[error("{0}")]
    InUse(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(e) => e.kind(),
            Self::Workflow(e) => e.kind(),
            Self::Runner(e) => e.kind(),
            Self::Validation(_) | Self::InUse(_) => ErrorKind::Precondition,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
