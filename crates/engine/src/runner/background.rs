//! In-process background runner using tokio tasks

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::model::JobTaskStatus;
use crate::orchestrator::{ExecutionError, RunOutcome, TaskOrchestrator, TaskOutcome};
use crate::persistence::{StoreError, WorkflowStore};

/// Deadlines for background runs
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Deadline for auto-executing or resuming a whole job
    pub job_timeout: Duration,

    /// Deadline for executing a single job task
    ///
    /// A single task has no step boundary, so the deadline only cancels the
    /// token in [`ExecutionContext`](crate::ExecutionContext). Executors that
    /// ignore the token run to completion regardless.
    pub task_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(30 * 60),
            task_timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl RunnerConfig {
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }
}

/// Errors from background runs
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Another run holds the job
    #[error("job {0} already has an active run")]
    AlreadyRunning(Uuid),

    /// Cancel requested for a job with no run
    #[error("no active run for job {0}")]
    NotRunning(Uuid),

    /// Store error while preparing the run
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The orchestrated run failed
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The run hit its deadline
    #[error("run exceeded its deadline of {0:?}")]
    TimedOut(Duration),

    /// The run's task panicked
    #[error("run task aborted: {0}")]
    Join(String),
}

impl RunnerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyRunning(_) => ErrorKind::Precondition,
            Self::NotRunning(_) => ErrorKind::NotFound,
            Self::Store(e) => e.kind(),
            Self::Execution(e) => e.kind(),
            Self::TimedOut(_) => ErrorKind::Cancelled,
            Self::Join(_) => ErrorKind::Executor,
        }
    }
}

/// What a background run does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// Start a pending job and run it
    AutoExecute,
    /// Continue a running job
    Resume,
    /// Execute one job task
    SingleTask(Uuid),
}

/// How a background run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// A job-level run ended normally
    Job(RunOutcome),
    /// A single task run completed its step
    TaskCompleted(Uuid),
    /// A single task run found a step that is not automated
    TaskNotAutomated(Uuid),
}

struct ActiveRun {
    run_id: Uuid,
    kind: RunKind,
    cancel: CancellationToken,
}

/// Handle to a spawned run
///
/// Dropping the handle detaches the run; its progress stays observable
/// through the job status in the store.
pub struct RunHandle {
    pub run_id: Uuid,
    pub job_id: Uuid,
    pub kind: RunKind,
    cancel: CancellationToken,
    join: JoinHandle<Result<RunReport, RunnerError>>,
}

impl RunHandle {
    /// Request cancellation; takes effect at the next step boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish
    pub async fn wait(self) -> Result<RunReport, RunnerError> {
        self.join
            .await
            .map_err(|e| RunnerError::Join(e.to_string()))?
    }
}

/// Runs orchestrations in background tokio tasks, at most one per job
pub struct JobRunner<S: WorkflowStore + ?Sized> {
    orchestrator: TaskOrchestrator<S>,
    config: RunnerConfig,
    active: Arc<Mutex<HashMap<Uuid, ActiveRun>>>,
}

impl<S: WorkflowStore + ?Sized> JobRunner<S> {
    pub fn new(orchestrator: TaskOrchestrator<S>, config: RunnerConfig) -> Self {
        Self {
            orchestrator,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn orchestrator(&self) -> &TaskOrchestrator<S> {
        &self.orchestrator
    }

    /// Start a pending job and run its automated steps in the background
    pub fn spawn_auto_execute(&self, job_id: Uuid) -> Result<RunHandle, RunnerError> {
        self.spawn(job_id, RunKind::AutoExecute, self.config.job_timeout)
    }

    /// Continue a running job in the background
    pub fn spawn_resume(&self, job_id: Uuid) -> Result<RunHandle, RunnerError> {
        self.spawn(job_id, RunKind::Resume, self.config.job_timeout)
    }

    /// Execute a single job task in the background
    pub async fn spawn_task(&self, job_task_id: Uuid) -> Result<RunHandle, RunnerError> {
        let job_task = self
            .orchestrator
            .engine()
            .store()
            .get_job_task(job_task_id)
            .await?;
        self.spawn(
            job_task.job_id,
            RunKind::SingleTask(job_task_id),
            self.config.task_timeout,
        )
    }

    /// Request cancellation of the job's active run
    pub fn cancel(&self, job_id: Uuid) -> Result<(), RunnerError> {
        let active = self.active.lock();
        let run = active.get(&job_id).ok_or(RunnerError::NotRunning(job_id))?;
        info!(%job_id, run_id = %run.run_id, kind = ?run.kind, "cancelling run");
        run.cancel.cancel();
        Ok(())
    }

    pub fn is_running(&self, job_id: Uuid) -> bool {
        self.active.lock().contains_key(&job_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    fn spawn(
        &self,
        job_id: Uuid,
        kind: RunKind,
        timeout: Duration,
    ) -> Result<RunHandle, RunnerError> {
        let run_id = Uuid::now_v7();
        let operator_cancel = CancellationToken::new();

        {
            let mut active = self.active.lock();
            if active.contains_key(&job_id) {
                return Err(RunnerError::AlreadyRunning(job_id));
            }
            active.insert(
                job_id,
                ActiveRun {
                    run_id,
                    kind,
                    cancel: operator_cancel.clone(),
                },
            );
        }

        info!(%job_id, %run_id, ?kind, ?timeout, "starting background run");

        let orchestrator = self.orchestrator.clone();
        let slot = RunSlot {
            active: self.active.clone(),
            job_id,
            run_id,
        };
        let token = operator_cancel.clone();

        let join = tokio::spawn(async move {
            let _slot = slot;

            // The orchestration runs in its own task so a panicking executor
            // surfaces here as a join error instead of unwinding this one
            let run = {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    run_with_deadline(&orchestrator, job_id, kind, &token, timeout).await
                })
            };

            let result = match run.await {
                Ok(result) => result,
                Err(e) => {
                    let reason = if e.is_panic() {
                        "executor panicked"
                    } else {
                        "run aborted"
                    };
                    fail_running_tasks(&orchestrator, job_id, reason).await;
                    Err(RunnerError::Join(e.to_string()))
                }
            };

            match &result {
                Ok(report) => info!(%job_id, %run_id, ?report, "background run finished"),
                Err(e) => error!(%job_id, %run_id, error = %e, "background run failed"),
            }
            result
        });

        Ok(RunHandle {
            run_id,
            job_id,
            kind,
            cancel: operator_cancel,
            join,
        })
    }
}

/// Frees the job's run slot when the run ends, however it ends
struct RunSlot {
    active: Arc<Mutex<HashMap<Uuid, ActiveRun>>>,
    job_id: Uuid,
    run_id: Uuid,
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        let mut active = self.active.lock();
        if active.get(&self.job_id).map(|r| r.run_id) == Some(self.run_id) {
            active.remove(&self.job_id);
        }
    }
}

/// Fail every step the aborted run left `running`, which also fails the job
async fn fail_running_tasks<S: WorkflowStore + ?Sized>(
    orchestrator: &TaskOrchestrator<S>,
    job_id: Uuid,
    reason: &str,
) {
    let engine = orchestrator.engine();
    let tasks = match engine.store().list_job_tasks(job_id).await {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!(%job_id, error = %e, "failed to load job tasks after aborted run");
            return;
        }
    };

    for task in tasks
        .into_iter()
        .filter(|t| t.status == JobTaskStatus::Running)
    {
        if let Err(e) = engine.fail_task(task.id, reason).await {
            warn!(%job_id, job_task_id = %task.id, error = %e, "failed to fail task after aborted run");
        }
    }
}

/// Run `kind` to completion; past `timeout` the run's token is cancelled so
/// the loop stops at its next step boundary
async fn run_with_deadline<S: WorkflowStore + ?Sized>(
    orchestrator: &TaskOrchestrator<S>,
    job_id: Uuid,
    kind: RunKind,
    operator_cancel: &CancellationToken,
    timeout: Duration,
) -> Result<RunReport, RunnerError> {
    let run_token = operator_cancel.child_token();

    let run = async {
        match kind {
            RunKind::AutoExecute => orchestrator
                .auto_execute_job(job_id, &run_token)
                .await
                .map(RunReport::Job),
            RunKind::Resume => orchestrator
                .resume_job(job_id, &run_token)
                .await
                .map(RunReport::Job),
            RunKind::SingleTask(job_task_id) => orchestrator
                .execute_task(job_task_id, &run_token)
                .await
                .map(|outcome| match outcome {
                    TaskOutcome::Completed(_) => RunReport::TaskCompleted(job_task_id),
                    TaskOutcome::NotAutomated { .. } => RunReport::TaskNotAutomated(job_task_id),
                }),
        }
    };
    tokio::pin!(run);

    let result = tokio::select! {
        result = &mut run => result,
        _ = tokio::time::sleep(timeout) => {
            warn!(%job_id, ?timeout, "run deadline reached, stopping at the next step boundary");
            run_token.cancel();
            run.await
        }
    };

    match result {
        Ok(report) => Ok(report),
        Err(ExecutionError::Cancelled) if operator_cancel.is_cancelled() => {
            if let Err(e) = orchestrator.engine().cancel_job(job_id).await {
                warn!(%job_id, error = %e, "failed to mark job cancelled");
            }
            Err(ExecutionError::Cancelled.into())
        }
        Err(ExecutionError::Cancelled) => Err(RunnerError::TimedOut(timeout)),
        Err(e) => Err(e.into()),
    }
}
