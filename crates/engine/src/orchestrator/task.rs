//! Task orchestrator
//!
//! The `TaskOrchestrator` drives automated steps without operator input:
//! - Resolving the executor a task is configured for
//! - Assembling executor input from job context and task config
//! - Writing executor output back into the job context
//! - Reporting each outcome to the engine
//!
//! It never writes job task status itself; every transition goes through
//! the [`WorkflowEngine`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::context::{context_value, merge_input};
use crate::engine::{WorkflowEngine, WorkflowError};
use crate::error::ErrorKind;
use crate::executor::{ExecutionContext, ExecutorError, ExecutorRegistry, RegistryError};
use crate::model::{JobStatus, JobTask, TaskResult, TaskType};
use crate::persistence::{StoreError, WorkflowStore};

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pause between consecutive steps of one job
    pub step_delay: Duration,

    /// Operator id recorded on steps the orchestrator starts
    pub system_operator_id: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_secs(1),
            system_operator_id: 0,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn with_system_operator(mut self, operator_id: i64) -> Self {
        self.system_operator_id = operator_id;
        self
    }
}

/// Errors from orchestrated execution
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Engine rejected a transition or failed to persist it
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Store error while loading the step
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Automated task without an `executor` entry
    #[error("task {0} config missing 'executor' field")]
    MissingExecutorConfig(Uuid),

    /// Executor lookup failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Executor ran and failed
    #[error("executor '{executor}' failed: {source}")]
    Executor {
        executor: String,
        #[source]
        source: ExecutorError,
    },

    /// Executor output could not be written to the job context
    #[error("failed to save result to job context: {0}")]
    ContextSave(#[source] StoreError),

    /// Run stopped by cancellation or deadline
    #[error("execution cancelled")]
    Cancelled,
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Workflow(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::MissingExecutorConfig(_) => ErrorKind::Precondition,
            Self::Registry(e) => e.kind(),
            Self::Executor { .. } => ErrorKind::Executor,
            Self::ContextSave(_) => ErrorKind::Persistence,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Result of executing one job task
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The executor ran and the step is completed
    Completed(JobTask),

    /// The step is manual or an approval; nothing was done
    NotAutomated { task_type: TaskType },
}

/// Result of an orchestrated run over a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No pending step is left; the job is completed
    Completed { executed: usize },

    /// The next pending step needs an operator
    AwaitingOperator {
        executed: usize,
        job_task_id: Uuid,
        sequence: i32,
    },
}

/// Drives executors against the workflow engine
pub struct TaskOrchestrator<S: WorkflowStore + ?Sized> {
    engine: WorkflowEngine<S>,
    registry: Arc<ExecutorRegistry>,
    config: OrchestratorConfig,
}

impl<S: WorkflowStore + ?Sized> Clone for TaskOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: WorkflowStore + ?Sized> TaskOrchestrator<S> {
    pub fn new(engine: WorkflowEngine<S>, registry: Arc<ExecutorRegistry>) -> Self {
        Self::with_config(engine, registry, OrchestratorConfig::default())
    }

    pub fn with_config(
        engine: WorkflowEngine<S>,
        registry: Arc<ExecutorRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            config,
        }
    }

    pub fn engine(&self) -> &WorkflowEngine<S> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    /// Run one job task through its executor.
    ///
    /// Manual and approval steps are left untouched. For automated steps a
    /// failure after the step was started (missing executor config, unknown
    /// executor, executor error, context write error) marks the step failed
    /// before the error is returned.
    #[instrument(skip(self, cancel))]
    pub async fn execute_task(
        &self,
        job_task_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome, ExecutionError> {
        let store = self.engine.store();
        let job_task = store.get_job_task(job_task_id).await?;
        let task = store.get_task(job_task.task_id).await?;

        if task.task_type != TaskType::Automated {
            info!(
                task_id = %task.id,
                task_type = %task.task_type,
                "task is not automated, leaving it for an operator"
            );
            return Ok(TaskOutcome::NotAutomated {
                task_type: task.task_type,
            });
        }

        self.engine
            .start_task(job_task_id, self.config.system_operator_id)
            .await?;

        let job_context = match store.get_job_context(job_task.job_id).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(job_id = %job_task.job_id, error = %e, "failed to load job context, using an empty one");
                Default::default()
            }
        };

        let input = merge_input(&job_context, &task.config);

        let Some(executor_name) = task.config.executor.as_deref().filter(|n| !n.is_empty())
        else {
            let err = ExecutionError::MissingExecutorConfig(task.id);
            self.fail(job_task_id, &err.to_string()).await;
            return Err(err);
        };

        let executor = match self.registry.get(executor_name) {
            Ok(executor) => executor,
            Err(e) => {
                self.fail(job_task_id, &format!("Executor not found: {executor_name}"))
                    .await;
                return Err(e.into());
            }
        };

        info!(executor = %executor_name, sequence = job_task.sequence, "executing task");
        let ctx = ExecutionContext::new(
            job_task.job_id,
            job_task_id,
            job_task.sequence,
            task.name.clone(),
            cancel.clone(),
        );

        let result = match executor.execute(&ctx, input, &job_context).await {
            Ok(result) => result,
            Err(e) => {
                error!(executor = %executor_name, error = %e, "task execution failed");
                self.fail(job_task_id, &e.message).await;
                return Err(ExecutionError::Executor {
                    executor: executor_name.to_string(),
                    source: e,
                });
            }
        };

        if let Err(e) = self.save_result(job_task.job_id, &result).await {
            self.fail(job_task_id, &e.to_string()).await;
            return Err(ExecutionError::ContextSave(e));
        }

        let completed = self.engine.complete_task(job_task_id, result).await?;
        info!(task_id = %task.id, "task completed");
        Ok(TaskOutcome::Completed(completed))
    }

    /// Start a pending job and run its automated steps in order
    #[instrument(skip(self, cancel))]
    pub async fn auto_execute_job(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, ExecutionError> {
        info!(%job_id, "starting auto execution");
        self.engine.start_job(job_id).await?;
        self.drive(job_id, cancel).await
    }

    /// Continue a running job, e.g. after an operator finished a manual step
    #[instrument(skip(self, cancel))]
    pub async fn resume_job(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, ExecutionError> {
        let job = self.engine.store().get_job(job_id).await?;
        if job.status != JobStatus::Running {
            return Err(WorkflowError::InvalidJobStatus {
                id: job_id,
                expected: JobStatus::Running,
                actual: job.status,
            }
            .into());
        }
        info!(%job_id, "resuming auto execution");
        self.drive(job_id, cancel).await
    }

    async fn drive(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, ExecutionError> {
        let mut executed = 0;

        loop {
            if cancel.is_cancelled() {
                info!(%job_id, executed, "auto execution cancelled");
                return Err(ExecutionError::Cancelled);
            }

            let Some(next) = self.engine.get_next_task(job_id).await? else {
                info!(%job_id, executed, "no pending tasks left, job completed");
                return Ok(RunOutcome::Completed { executed });
            };

            debug!(job_task_id = %next.id, task_id = %next.task_id, sequence = next.sequence, "executing next task");

            match self.execute_task(next.id, cancel).await? {
                TaskOutcome::Completed(_) => executed += 1,
                TaskOutcome::NotAutomated { .. } => {
                    info!(%job_id, sequence = next.sequence, "waiting for operator");
                    return Ok(RunOutcome::AwaitingOperator {
                        executed,
                        job_task_id: next.id,
                        sequence: next.sequence,
                    });
                }
            }

            if !self.config.step_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.step_delay) => {}
                }
            }
        }
    }

    async fn save_result(&self, job_id: Uuid, result: &TaskResult) -> Result<(), StoreError> {
        let store = self.engine.store();
        for (key, value) in result {
            store
                .upsert_job_context(job_id, key, &context_value(value))
                .await?;
        }
        Ok(())
    }

    async fn fail(&self, job_task_id: Uuid, message: &str) {
        if let Err(e) = self.engine.fail_task(job_task_id, message).await {
            error!(%job_task_id, error = %e, "failed to mark task as failed");
        }
    }
}
