//! Executor trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ExecutionContext;
use crate::model::{JobContext, TaskResult};

/// Input handed to an executor: job context entries overlaid with task config defaults
pub type TaskInput = Map<String, Value>;

/// Error type for executor failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorError {
    /// Error message
    pub message: String,

    /// Error type/code for programmatic handling
    pub error_type: Option<String>,

    /// Additional error details (for debugging)
    pub details: Option<Value>,
}

impl ExecutorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            details: None,
        }
    }

    /// Required input key is absent or has the wrong shape
    pub fn missing_input(key: &str) -> Self {
        Self::new(format!("missing required input: {key}")).with_type("MISSING_INPUT")
    }

    /// Set the error type
    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    /// Add error details
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExecutorError {}

/// Pluggable capability that performs the work of an automated task
///
/// An executor receives the merged input (job context first, task config
/// filling in absent keys) plus the raw job context. Every key of the
/// returned map is written back into the job context.
///
/// # Example
///
/// ```ignore
/// use jobflow_engine::prelude::*;
///
/// struct Uppercase;
///
/// #[async_trait]
/// impl Executor for Uppercase {
///     fn name(&self) -> &str {
///         "uppercase"
///     }
///
///     async fn execute(
///         &self,
///         _ctx: &ExecutionContext,
///         input: TaskInput,
///         _job_context: &JobContext,
///     ) -> Result<TaskResult, ExecutorError> {
///         let text = input
///             .get("text")
///             .and_then(|v| v.as_str())
///             .ok_or_else(|| ExecutorError::missing_input("text"))?;
///         let mut out = TaskResult::new();
///         out.insert("text".into(), text.to_uppercase().into());
///         Ok(out)
///     }
/// }
/// ```
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Stable name used in task configuration (`executor` key)
    fn name(&self) -> &str;

    /// One-line summary shown in executor listings
    fn description(&self) -> &str {
        ""
    }

    /// Run the executor
    ///
    /// Long-running executors may poll `ctx.is_cancelled()` to stop early;
    /// the orchestrator never aborts a running executor.
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        input: TaskInput,
        job_context: &JobContext,
    ) -> Result<TaskResult, ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_error_builders() {
        let error = ExecutorError::new("upstream returned 503")
            .with_type("HTTP_ERROR")
            .with_details(serde_json::json!({"status": 503}));

        assert_eq!(error.to_string(), "upstream returned 503");
        assert_eq!(error.error_type.as_deref(), Some("HTTP_ERROR"));
        assert!(error.details.is_some());
    }

    #[test]
    fn test_missing_input() {
        let error = ExecutorError::missing_input("video_url");
        assert_eq!(error.message, "missing required input: video_url");
        assert_eq!(error.error_type.as_deref(), Some("MISSING_INPUT"));
    }
}
