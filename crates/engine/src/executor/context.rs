//! Executor execution context

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Context provided to executors during execution
///
/// Carries the identity of the step being run and the cancellation token
/// of the surrounding run. Cancellation is advisory: the orchestrator only
/// checks it between steps, an executor may check it to stop early.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Job that owns the step
    pub job_id: Uuid,

    /// Job task being executed
    pub job_task_id: Uuid,

    /// Sequence of the step within the job
    pub sequence: i32,

    /// Name of the task definition
    pub task_name: String,

    cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(
        job_id: Uuid,
        job_task_id: Uuid,
        sequence: i32,
        task_name: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id,
            job_task_id,
            sequence,
            task_name: task_name.into(),
            cancel,
        }
    }

    /// Whether the surrounding run has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token of the surrounding run, for `select!` against long waits
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
