// Job service: job lifecycle, operator actions on job tasks, context and runs
//
// Operator actions go straight to the engine. Automated runs go through the
// background runner so requests return immediately.

use std::collections::BTreeMap;
use std::sync::Arc;

use jobflow_engine::model::{
    Job, JobContext, JobStatus, JobTask, JobTaskLog, JobWithTasks, TaskResult,
};
use jobflow_engine::orchestrator::context_value;
use jobflow_engine::{
    ExecutorRegistry, JobFilter, JobRunner, Pagination, RunHandle, WorkflowEngine, WorkflowError,
    WorkflowStore,
};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::error::{ServiceError, ServiceResult};
use crate::api::jobs::{CancelJobResponse, CreateJobRequest, RunAccepted};

pub struct JobService {
    engine: WorkflowEngine<dyn WorkflowStore>,
    runner: Arc<JobRunner<dyn WorkflowStore>>,
}

impl JobService {
    pub fn new(runner: Arc<JobRunner<dyn WorkflowStore>>) -> Self {
        Self {
            engine: runner.orchestrator().engine().clone(),
            runner,
        }
    }

    fn store(&self) -> &Arc<dyn WorkflowStore> {
        self.engine.store()
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        self.runner.orchestrator().registry()
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    pub async fn create_job(&self, req: CreateJobRequest) -> ServiceResult<JobWithTasks> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(ServiceError::validation("name must not be empty"));
        }
        Ok(self
            .engine
            .create_job(req.flow_id, name, req.created_by)
            .await?)
    }

    pub async fn get_job(&self, job_id: Uuid) -> ServiceResult<JobWithTasks> {
        let job = self.store().get_job(job_id).await?;
        let tasks = self.store().list_job_tasks(job_id).await?;
        Ok(JobWithTasks { job, tasks })
    }

    pub async fn list_jobs(
        &self,
        filter: JobFilter,
        pagination: Pagination,
    ) -> ServiceResult<Vec<Job>> {
        Ok(self.store().list_jobs(filter, pagination).await?)
    }

    pub async fn start_job(&self, job_id: Uuid) -> ServiceResult<Job> {
        Ok(self.engine.start_job(job_id).await?)
    }

    /// Stop a job. An active run is asked to stop and marks the job
    /// cancelled at its next step boundary; otherwise the job is cancelled
    /// right away.
    pub async fn cancel_job(&self, job_id: Uuid) -> ServiceResult<CancelJobResponse> {
        if self.runner.is_running(job_id) {
            self.runner.cancel(job_id)?;
            let job = self.store().get_job(job_id).await?;
            return Ok(CancelJobResponse {
                job,
                run_cancelled: true,
            });
        }

        let job = self.engine.cancel_job(job_id).await?;
        Ok(CancelJobResponse {
            job,
            run_cancelled: false,
        })
    }

    pub async fn current_task(&self, job_id: Uuid) -> ServiceResult<JobTask> {
        Ok(self.engine.get_current_task(job_id).await?)
    }

    pub async fn next_task(&self, job_id: Uuid) -> ServiceResult<Option<JobTask>> {
        self.store().get_job(job_id).await?;
        Ok(self.engine.get_next_task(job_id).await?)
    }

    // ========================================================================
    // Background runs
    // ========================================================================

    /// Start a pending job and run its automated steps in the background
    pub async fn auto_execute(&self, job_id: Uuid) -> ServiceResult<RunAccepted> {
        self.ensure_job_status(job_id, JobStatus::Pending).await?;
        let handle = self.runner.spawn_auto_execute(job_id)?;
        Ok(accepted(handle, None))
    }

    /// Continue a running job in the background
    pub async fn resume(&self, job_id: Uuid) -> ServiceResult<RunAccepted> {
        self.ensure_job_status(job_id, JobStatus::Running).await?;
        let handle = self.runner.spawn_resume(job_id)?;
        Ok(accepted(handle, None))
    }

    /// Execute one job task in the background
    pub async fn execute_task(&self, job_task_id: Uuid) -> ServiceResult<RunAccepted> {
        let handle = self.runner.spawn_task(job_task_id).await?;
        Ok(accepted(handle, Some(job_task_id)))
    }

    async fn ensure_job_status(&self, job_id: Uuid, expected: JobStatus) -> ServiceResult<()> {
        let job = self.store().get_job(job_id).await?;
        if job.status != expected {
            return Err(WorkflowError::InvalidJobStatus {
                id: job_id,
                expected,
                actual: job.status,
            }
            .into());
        }
        Ok(())
    }

    // ========================================================================
    // Job tasks
    // ========================================================================

    pub async fn get_job_task(&self, job_task_id: Uuid) -> ServiceResult<JobTask> {
        Ok(self.store().get_job_task(job_task_id).await?)
    }

    pub async fn start_task(&self, job_task_id: Uuid, executor_id: i64) -> ServiceResult<JobTask> {
        Ok(self.engine.start_task(job_task_id, executor_id).await?)
    }

    pub async fn complete_task(
        &self,
        job_task_id: Uuid,
        result: TaskResult,
    ) -> ServiceResult<JobTask> {
        Ok(self.engine.complete_task(job_task_id, result).await?)
    }

    pub async fn fail_task(&self, job_task_id: Uuid, message: &str) -> ServiceResult<JobTask> {
        if message.trim().is_empty() {
            return Err(ServiceError::validation("error_message must not be empty"));
        }
        Ok(self.engine.fail_task(job_task_id, message).await?)
    }

    pub async fn skip_task(&self, job_task_id: Uuid, operator_id: i64) -> ServiceResult<JobTask> {
        Ok(self.engine.skip_task(job_task_id, operator_id).await?)
    }

    pub async fn rollback_task(
        &self,
        job_task_id: Uuid,
        operator_id: i64,
        target_sequence: i32,
    ) -> ServiceResult<Job> {
        Ok(self
            .engine
            .rollback_task(job_task_id, operator_id, target_sequence)
            .await?)
    }

    pub async fn list_logs(&self, job_task_id: Uuid) -> ServiceResult<Vec<JobTaskLog>> {
        self.store().get_job_task(job_task_id).await?;
        Ok(self.store().list_job_task_logs(job_task_id).await?)
    }

    // ========================================================================
    // Context
    // ========================================================================

    pub async fn get_context(&self, job_id: Uuid) -> ServiceResult<JobContext> {
        self.store().get_job(job_id).await?;
        Ok(self.store().get_job_context(job_id).await?)
    }

    /// Upsert every entry, stored in the same text form as executor results
    pub async fn update_context(
        &self,
        job_id: Uuid,
        entries: BTreeMap<String, Value>,
    ) -> ServiceResult<JobContext> {
        self.store().get_job(job_id).await?;
        if entries.keys().any(|k| k.is_empty()) {
            return Err(ServiceError::validation("context keys must not be empty"));
        }

        for (key, value) in &entries {
            self.store()
                .upsert_job_context(job_id, key, &context_value(value))
                .await?;
        }
        info!(%job_id, keys = entries.len(), "updated job context");
        Ok(self.store().get_job_context(job_id).await?)
    }
}

fn accepted(handle: RunHandle, job_task_id: Option<Uuid>) -> RunAccepted {
    RunAccepted {
        run_id: handle.run_id,
        job_id: handle.job_id,
        job_task_id,
    }
}
