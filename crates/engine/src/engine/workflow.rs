//! Job and job task state machine
//!
//! The `WorkflowEngine` owns every status transition of jobs and job tasks:
//! - Creating jobs from active flows
//! - Starting, completing, failing and skipping job tasks
//! - Advancing the job's current sequence pointer
//! - Rolling a job back to an earlier step
//!
//! "Next task" is always recomputed from the stored job tasks, so a rollback
//! that reopens earlier steps is picked up without any cached pointer.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::model::{
    Job, JobStatus, JobTask, JobTaskLog, JobTaskStatus, JobWithTasks, LogAction, TaskResult,
};
use crate::persistence::{StoreError, WorkflowStore};

/// Errors from engine operations
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Flow is deactivated
    #[error("flow {0} is not active")]
    FlowInactive(Uuid),

    /// Flow has no steps
    #[error("flow {0} has no tasks")]
    FlowEmpty(Uuid),

    /// Job is in the wrong status for the transition
    #[error("job {id} is {actual}, expected {expected}")]
    InvalidJobStatus {
        id: Uuid,
        expected: JobStatus,
        actual: JobStatus,
    },

    /// Job task is in the wrong status for the transition
    #[error("job task {id} is {actual}, expected {expected}")]
    InvalidTaskStatus {
        id: Uuid,
        expected: JobTaskStatus,
        actual: JobTaskStatus,
    },

    /// Skip requested on a required step
    #[error("job task {0} is not optional and cannot be skipped")]
    NotOptional(Uuid),

    /// Rollback requested from a step that forbids it
    #[error("job task {0} does not allow rollback")]
    RollbackNotAllowed(Uuid),

    /// Rollback target is not before the issuing step
    #[error("rollback target sequence {target} must be before current sequence {current}")]
    InvalidRollbackTarget { target: i32, current: i32 },

    /// No job task at the requested sequence
    #[error("job {job_id} has no task at sequence {sequence}")]
    SequenceNotFound { job_id: Uuid, sequence: i32 },

    /// Job has not started yet
    #[error("job {0} has no current task")]
    NoCurrentTask(Uuid),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(e) => e.kind(),
            _ => ErrorKind::Precondition,
        }
    }
}

/// Workflow state machine over a [`WorkflowStore`]
///
/// Every transition checks its precondition before writing, so a rejected
/// call leaves the store untouched. Each applied transition also appends a
/// [`JobTaskLog`] entry; a failed log write is reported and otherwise ignored.
///
/// # Example
///
/// ```ignore
/// use jobflow_engine::prelude::*;
///
/// let engine = WorkflowEngine::new(Arc::new(InMemoryWorkflowStore::new()));
/// let job = engine.create_job(flow_id, "onboarding #42", operator_id).await?;
/// engine.start_job(job.job.id).await?;
/// ```
pub struct WorkflowEngine<S: WorkflowStore + ?Sized> {
    store: Arc<S>,
}

impl<S: WorkflowStore + ?Sized> Clone for WorkflowEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: WorkflowStore + ?Sized> WorkflowEngine<S> {
    /// Create a new engine over the given store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Instantiate a flow as a new pending job with one pending task per step
    #[instrument(skip(self, name))]
    pub async fn create_job(
        &self,
        flow_id: Uuid,
        name: &str,
        created_by: i64,
    ) -> Result<JobWithTasks, WorkflowError> {
        let (flow, flow_tasks) = self.store.get_flow_with_tasks(flow_id).await?;

        if !flow.is_active {
            return Err(WorkflowError::FlowInactive(flow_id));
        }
        if flow_tasks.is_empty() {
            return Err(WorkflowError::FlowEmpty(flow_id));
        }

        let job = Job::new(flow_id, name, created_by);
        let tasks: Vec<JobTask> = flow_tasks
            .iter()
            .map(|ft| JobTask::from_flow_task(job.id, ft))
            .collect();

        self.store.create_job(&job, &tasks).await?;

        info!(job_id = %job.id, tasks = tasks.len(), "created job");
        Ok(JobWithTasks { job, tasks })
    }

    /// Move a pending job to running and point it at sequence 1
    #[instrument(skip(self))]
    pub async fn start_job(&self, job_id: Uuid) -> Result<Job, WorkflowError> {
        let mut job = self.store.get_job(job_id).await?;

        if job.status != JobStatus::Pending {
            return Err(WorkflowError::InvalidJobStatus {
                id: job_id,
                expected: JobStatus::Pending,
                actual: job.status,
            });
        }

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        job.current_task_seq = Some(1);
        self.store.update_job(&job).await?;

        info!(%job_id, "started job");
        Ok(job)
    }

    /// Move a pending job task to running on behalf of `executor_id`
    ///
    /// The write is a compare-and-swap against `pending`, so two callers
    /// racing for the same task cannot both start it.
    #[instrument(skip(self))]
    pub async fn start_task(
        &self,
        job_task_id: Uuid,
        executor_id: i64,
    ) -> Result<JobTask, WorkflowError> {
        let mut job_task = self.store.get_job_task(job_task_id).await?;
        ensure_task_status(&job_task, JobTaskStatus::Pending)?;
        let mut job = self.open_job(job_task.job_id).await?;

        job_task.status = JobTaskStatus::Running;
        job_task.started_at = Some(Utc::now());
        job_task.executor_id = Some(executor_id);
        self.store
            .update_job_task(&job_task, JobTaskStatus::Pending)
            .await?;

        if job.current_task_seq != Some(job_task.sequence) {
            job.current_task_seq = Some(job_task.sequence);
            self.store.update_job(&job).await?;
        }

        self.record(
            JobTaskLog::new(job_task_id, LogAction::Start, "task started")
                .with_operator(executor_id),
        )
        .await;

        debug!(job_id = %job_task.job_id, sequence = job_task.sequence, "started task");
        Ok(job_task)
    }

    /// Complete a running job task and advance the job
    #[instrument(skip(self, result))]
    pub async fn complete_task(
        &self,
        job_task_id: Uuid,
        result: TaskResult,
    ) -> Result<JobTask, WorkflowError> {
        let mut job_task = self.store.get_job_task(job_task_id).await?;
        ensure_task_status(&job_task, JobTaskStatus::Running)?;

        job_task.status = JobTaskStatus::Completed;
        job_task.completed_at = Some(Utc::now());
        job_task.result = Some(result);
        self.store
            .update_job_task(&job_task, JobTaskStatus::Running)
            .await?;

        self.record(JobTaskLog::new(
            job_task_id,
            LogAction::Complete,
            "task completed",
        ))
        .await;

        self.advance(job_task.job_id).await?;
        Ok(job_task)
    }

    /// Fail a running job task; the owning job fails with it
    #[instrument(skip(self, message))]
    pub async fn fail_task(
        &self,
        job_task_id: Uuid,
        message: &str,
    ) -> Result<JobTask, WorkflowError> {
        let mut job_task = self.store.get_job_task(job_task_id).await?;
        ensure_task_status(&job_task, JobTaskStatus::Running)?;

        job_task.status = JobTaskStatus::Failed;
        job_task.completed_at = Some(Utc::now());
        job_task.error_message = Some(message.to_string());
        self.store
            .update_job_task(&job_task, JobTaskStatus::Running)
            .await?;

        // A cancelled job keeps its status; the step itself is still closed out
        let job = self.store.get_job(job_task.job_id).await?;
        if job.status != JobStatus::Cancelled {
            self.store
                .update_job_status(job_task.job_id, JobStatus::Failed)
                .await?;
        }

        self.record(JobTaskLog::new(job_task_id, LogAction::Fail, message))
            .await;

        warn!(job_id = %job_task.job_id, sequence = job_task.sequence, error = %message, "task failed");
        Ok(job_task)
    }

    /// Stop a job that has not reached a terminal status
    ///
    /// Job tasks keep their status; a running step is left to finish or fail.
    #[instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<Job, WorkflowError> {
        let mut job = self.store.get_job(job_id).await?;

        if job.status.is_terminal() {
            return Err(WorkflowError::InvalidJobStatus {
                id: job_id,
                expected: JobStatus::Running,
                actual: job.status,
            });
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        self.store.update_job(&job).await?;

        info!(%job_id, "cancelled job");
        Ok(job)
    }

    /// Skip a pending optional job task and advance the job
    #[instrument(skip(self))]
    pub async fn skip_task(
        &self,
        job_task_id: Uuid,
        operator_id: i64,
    ) -> Result<JobTask, WorkflowError> {
        let mut job_task = self.store.get_job_task(job_task_id).await?;
        ensure_task_status(&job_task, JobTaskStatus::Pending)?;

        self.open_job(job_task.job_id).await?;

        let flow_task = self.store.get_flow_task(job_task.flow_task_id).await?;
        if !flow_task.is_optional {
            return Err(WorkflowError::NotOptional(job_task_id));
        }

        job_task.status = JobTaskStatus::Skipped;
        job_task.is_skipped = true;
        job_task.executor_id = Some(operator_id);
        job_task.completed_at = Some(Utc::now());
        self.store
            .update_job_task(&job_task, JobTaskStatus::Pending)
            .await?;

        self.record(
            JobTaskLog::new(job_task_id, LogAction::Skip, "task skipped")
                .with_operator(operator_id),
        )
        .await;

        self.advance(job_task.job_id).await?;
        Ok(job_task)
    }

    /// Send a job back to `target_sequence`, reopening every step from there on
    ///
    /// The issuing task is marked `rolled_back` and then, being inside the
    /// reset range, returns to `pending` with the others in one batch.
    /// Job context is left as it is.
    #[instrument(skip(self))]
    pub async fn rollback_task(
        &self,
        job_task_id: Uuid,
        operator_id: i64,
        target_sequence: i32,
    ) -> Result<Job, WorkflowError> {
        let job_task = self.store.get_job_task(job_task_id).await?;

        let flow_task = self.store.get_flow_task(job_task.flow_task_id).await?;
        if !flow_task.allow_rollback {
            return Err(WorkflowError::RollbackNotAllowed(job_task_id));
        }

        if target_sequence >= job_task.sequence {
            return Err(WorkflowError::InvalidRollbackTarget {
                target: target_sequence,
                current: job_task.sequence,
            });
        }

        let job_id = job_task.job_id;
        if self
            .store
            .get_job_task_by_sequence(job_id, target_sequence)
            .await?
            .is_none()
        {
            return Err(WorkflowError::SequenceNotFound {
                job_id,
                sequence: target_sequence,
            });
        }

        let mut job = self.store.get_job(job_id).await?;
        let previous_status = job_task.status;

        let mut rolled_back = job_task.clone();
        rolled_back.status = JobTaskStatus::RolledBack;
        rolled_back.executor_id = Some(operator_id);

        let mut batch = vec![rolled_back];
        for mut jt in self.store.list_job_tasks(job_id).await? {
            if jt.sequence >= target_sequence {
                jt.reset();
                batch.push(jt);
            }
        }
        let reset_count = batch.len() - 1;
        self.store.update_job_tasks(&batch).await?;

        job.current_task_seq = Some(target_sequence);
        job.status = JobStatus::Running;
        job.completed_at = None;
        self.store.update_job(&job).await?;

        self.record(
            JobTaskLog::new(
                job_task_id,
                LogAction::Rollback,
                format!("rolled back to sequence {target_sequence}"),
            )
            .with_operator(operator_id)
            .with_metadata(json!({
                "from_sequence": job_task.sequence,
                "target_sequence": target_sequence,
                "previous_status": previous_status,
                "reset_tasks": reset_count,
            })),
        )
        .await;

        info!(%job_id, from = job_task.sequence, to = target_sequence, "rolled back job");
        Ok(job)
    }

    /// Lowest-sequence pending job task, if any
    pub async fn get_next_task(&self, job_id: Uuid) -> Result<Option<JobTask>, WorkflowError> {
        let tasks = self.store.list_job_tasks(job_id).await?;
        Ok(tasks
            .into_iter()
            .find(|jt| jt.status == JobTaskStatus::Pending))
    }

    /// Job task at the job's current sequence
    pub async fn get_current_task(&self, job_id: Uuid) -> Result<JobTask, WorkflowError> {
        let job = self.store.get_job(job_id).await?;
        let sequence = job
            .current_task_seq
            .ok_or(WorkflowError::NoCurrentTask(job_id))?;

        self.store
            .get_job_task_by_sequence(job_id, sequence)
            .await?
            .ok_or(WorkflowError::SequenceNotFound { job_id, sequence })
    }

    /// Point the job at its next pending task, or complete it when none is left
    async fn advance(&self, job_id: Uuid) -> Result<(), WorkflowError> {
        let next = self.get_next_task(job_id).await?;
        let mut job = self.store.get_job(job_id).await?;

        if job.status.is_terminal() {
            debug!(%job_id, status = %job.status, "job already closed, not advancing");
            return Ok(());
        }

        match next {
            Some(next) => {
                job.current_task_seq = Some(next.sequence);
                debug!(%job_id, sequence = next.sequence, "advanced job");
            }
            None => {
                job.status = JobStatus::Completed;
                job.completed_at = Some(Utc::now());
                info!(%job_id, "job completed");
            }
        }

        self.store.update_job(&job).await?;
        Ok(())
    }

    /// Load a job that still accepts new work on its steps
    async fn open_job(&self, job_id: Uuid) -> Result<Job, WorkflowError> {
        let job = self.store.get_job(job_id).await?;
        if job.status.is_terminal() {
            return Err(WorkflowError::InvalidJobStatus {
                id: job_id,
                expected: JobStatus::Running,
                actual: job.status,
            });
        }
        Ok(job)
    }

    async fn record(&self, log: JobTaskLog) {
        if let Err(e) = self.store.append_job_task_log(&log).await {
            warn!(job_task_id = %log.job_task_id, action = %log.action, error = %e, "failed to write job task log");
        }
    }
}

fn ensure_task_status(job_task: &JobTask, expected: JobTaskStatus) -> Result<(), WorkflowError> {
    if job_task.status != expected {
        return Err(WorkflowError::InvalidTaskStatus {
            id: job_task.id,
            expected,
            actual: job_task.status,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Flow, FlowTask, Task, TaskType};
    use crate::persistence::InMemoryWorkflowStore;

    struct Fixture {
        engine: WorkflowEngine<InMemoryWorkflowStore>,
        store: Arc<InMemoryWorkflowStore>,
        flow: Flow,
    }

    /// Flow with `steps` manual steps; `optional` and `no_rollback` list sequences
    async fn fixture(steps: i32, optional: &[i32], no_rollback: &[i32]) -> Fixture {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let flow = Flow::new("fixture", 1);
        let mut flow_tasks = Vec::new();
        for seq in 1..=steps {
            let task = Task::new(format!("step {seq}"), TaskType::Manual);
            store.create_task(&task).await.unwrap();
            flow_tasks.push(
                FlowTask::new(flow.id, task.id, seq)
                    .optional(optional.contains(&seq))
                    .rollback(!no_rollback.contains(&seq)),
            );
        }
        store.create_flow(&flow, &flow_tasks).await.unwrap();
        Fixture {
            engine: WorkflowEngine::new(store.clone()),
            store,
            flow,
        }
    }

    #[tokio::test]
    async fn test_create_job_rejects_inactive_flow() {
        let fx = fixture(2, &[], &[]).await;
        let mut flow = fx.flow.clone();
        flow.is_active = false;
        fx.store.update_flow(&flow).await.unwrap();

        let err = fx.engine.create_job(fx.flow.id, "j", 1).await.unwrap_err();
        assert!(matches!(err, WorkflowError::FlowInactive(_)));
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(fx.store.job_count(), 0);
    }

    #[tokio::test]
    async fn test_create_job_rejects_empty_flow() {
        let fx = fixture(0, &[], &[]).await;
        let err = fx.engine.create_job(fx.flow.id, "j", 1).await.unwrap_err();
        assert!(matches!(err, WorkflowError::FlowEmpty(_)));
    }

    #[tokio::test]
    async fn test_create_job_unknown_flow_is_not_found() {
        let fx = fixture(1, &[], &[]).await;
        let err = fx
            .engine
            .create_job(Uuid::now_v7(), "j", 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_start_job_twice_fails() {
        let fx = fixture(1, &[], &[]).await;
        let created = fx.engine.create_job(fx.flow.id, "j", 1).await.unwrap();

        let job = fx.engine.start_job(created.job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.current_task_seq, Some(1));
        assert!(job.started_at.is_some());

        let err = fx.engine.start_job(created.job.id).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidJobStatus {
                actual: JobStatus::Running,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_complete_requires_running() {
        let fx = fixture(1, &[], &[]).await;
        let created = fx.engine.create_job(fx.flow.id, "j", 1).await.unwrap();
        let jt = &created.tasks[0];

        let err = fx
            .engine
            .complete_task(jt.id, TaskResult::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTaskStatus { .. }));
        let stored = fx.store.get_job_task(jt.id).await.unwrap();
        assert_eq!(stored.status, JobTaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_start_task_updates_current_sequence() {
        let fx = fixture(3, &[], &[]).await;
        let created = fx.engine.create_job(fx.flow.id, "j", 1).await.unwrap();
        fx.engine.start_job(created.job.id).await.unwrap();

        fx.engine.start_task(created.tasks[2].id, 9).await.unwrap();

        let job = fx.store.get_job(created.job.id).await.unwrap();
        assert_eq!(job.current_task_seq, Some(3));
        let current = fx.engine.get_current_task(created.job.id).await.unwrap();
        assert_eq!(current.id, created.tasks[2].id);
        assert_eq!(current.executor_id, Some(9));
    }

    #[tokio::test]
    async fn test_start_task_twice_conflicts() {
        let fx = fixture(1, &[], &[]).await;
        let created = fx.engine.create_job(fx.flow.id, "j", 1).await.unwrap();
        let jt = &created.tasks[0];

        fx.engine.start_task(jt.id, 1).await.unwrap();
        let err = fx.engine.start_task(jt.id, 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        let stored = fx.store.get_job_task(jt.id).await.unwrap();
        assert_eq!(stored.executor_id, Some(1));
    }

    #[tokio::test]
    async fn test_fail_task_fails_job() {
        let fx = fixture(2, &[], &[]).await;
        let created = fx.engine.create_job(fx.flow.id, "j", 1).await.unwrap();
        fx.engine.start_job(created.job.id).await.unwrap();
        let jt = &created.tasks[0];

        fx.engine.start_task(jt.id, 1).await.unwrap();
        let failed = fx.engine.fail_task(jt.id, "disk full").await.unwrap();

        assert_eq!(failed.status, JobTaskStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("disk full"));
        assert!(failed.completed_at.is_some());
        let job = fx.store.get_job(created.job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_get_current_task_before_start_fails() {
        let fx = fixture(1, &[], &[]).await;
        let created = fx.engine.create_job(fx.flow.id, "j", 1).await.unwrap();

        let err = fx
            .engine
            .get_current_task(created.job.id)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NoCurrentTask(_)));
    }

    #[tokio::test]
    async fn test_transitions_are_logged() {
        let fx = fixture(2, &[2], &[]).await;
        let created = fx.engine.create_job(fx.flow.id, "j", 1).await.unwrap();
        fx.engine.start_job(created.job.id).await.unwrap();
        let first = &created.tasks[0];

        fx.engine.start_task(first.id, 5).await.unwrap();
        fx.engine
            .complete_task(first.id, TaskResult::new())
            .await
            .unwrap();
        fx.engine.skip_task(created.tasks[1].id, 6).await.unwrap();

        let logs = fx.store.list_job_task_logs(first.id).await.unwrap();
        let actions: Vec<LogAction> = logs.iter().map(|l| l.action).collect();
        assert_eq!(actions, vec![LogAction::Start, LogAction::Complete]);
        assert_eq!(logs[0].operator_id, Some(5));

        let skip_logs = fx
            .store
            .list_job_task_logs(created.tasks[1].id)
            .await
            .unwrap();
        assert_eq!(skip_logs.len(), 1);
        assert_eq!(skip_logs[0].action, LogAction::Skip);
        assert_eq!(skip_logs[0].operator_id, Some(6));
    }

    #[tokio::test]
    async fn test_rollback_reopens_completed_job() {
        let fx = fixture(2, &[], &[]).await;
        let created = fx.engine.create_job(fx.flow.id, "j", 1).await.unwrap();
        fx.engine.start_job(created.job.id).await.unwrap();
        for jt in &created.tasks {
            fx.engine.start_task(jt.id, 1).await.unwrap();
            fx.engine
                .complete_task(jt.id, TaskResult::new())
                .await
                .unwrap();
        }
        let job = fx.store.get_job(created.job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let job = fx
            .engine
            .rollback_task(created.tasks[1].id, 2, 1)
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.current_task_seq, Some(1));
        assert!(job.completed_at.is_none());
        let next = fx.engine.get_next_task(created.job.id).await.unwrap();
        assert_eq!(next.map(|t| t.sequence), Some(1));
    }

    #[tokio::test]
    async fn test_rollback_to_missing_sequence_fails() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let flow = Flow::new("gappy", 1);
        let a = Task::new("a", TaskType::Manual);
        let b = Task::new("b", TaskType::Manual);
        store.create_task(&a).await.unwrap();
        store.create_task(&b).await.unwrap();
        store
            .create_flow(
                &flow,
                &[
                    FlowTask::new(flow.id, a.id, 2),
                    FlowTask::new(flow.id, b.id, 4),
                ],
            )
            .await
            .unwrap();
        let engine = WorkflowEngine::new(store.clone());
        let created = engine.create_job(flow.id, "j", 1).await.unwrap();

        let err = engine
            .rollback_task(created.tasks[1].id, 1, 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::SequenceNotFound { sequence: 3, .. }
        ));
    }
}
