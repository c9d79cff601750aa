//! Error classification shared by every layer of the engine

use serde::{Deserialize, Serialize};

/// Coarse class of a failure.
///
/// Callers use this to decide between "fix the request" (`Precondition`,
/// `NotFound`) and "something downstream broke" (`Executor`, `Persistence`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Wrong status for the transition or a rule of the flow forbids it
    Precondition,
    /// Unknown job, task, flow or executor
    NotFound,
    /// The executor itself failed
    Executor,
    /// The store failed
    Persistence,
    /// The run was cancelled or hit its deadline
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Precondition => write!(f, "precondition"),
            Self::NotFound => write!(f, "not_found"),
            Self::Executor => write!(f, "executor"),
            Self::Persistence => write!(f, "persistence"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
