//! WorkflowStore trait definition

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::model::{
    Flow, FlowTask, Job, JobContext, JobStatus, JobTask, JobTaskLog, JobTaskStatus, Task,
};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Flow not found
    #[error("flow not found: {0}")]
    FlowNotFound(Uuid),

    /// Flow task not found
    #[error("flow task not found: {0}")]
    FlowTaskNotFound(Uuid),

    /// Task not found
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    /// Job not found
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// Job task not found
    #[error("job task not found: {0}")]
    JobTaskNotFound(Uuid),

    /// Unique constraint violated (duplicate id, flow sequence)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Concurrency conflict (status compare-and-swap failed)
    #[error("concurrency conflict on job task {id}: expected status {expected}, found {actual}")]
    ConcurrencyConflict {
        id: Uuid,
        expected: JobTaskStatus,
        actual: JobTaskStatus,
    },

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FlowNotFound(_)
            | Self::FlowTaskNotFound(_)
            | Self::TaskNotFound(_)
            | Self::JobNotFound(_)
            | Self::JobTaskNotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) | Self::ConcurrencyConflict { .. } => ErrorKind::Precondition,
            Self::Database(_) | Self::Serialization(_) => ErrorKind::Persistence,
        }
    }
}

/// Largest page a list call returns
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Pagination parameters
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub offset: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

impl Pagination {
    /// `limit` is capped at [`MAX_PAGE_LIMIT`]
    pub fn new(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit: limit.min(MAX_PAGE_LIMIT),
        }
    }
}

/// Filter for listing jobs
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub flow_id: Option<Uuid>,
    pub status: Option<JobStatus>,
}

/// Store for the flow catalog, jobs and their shared context
///
/// Implementations must be thread-safe and provide read-your-writes
/// consistency. `create_flow`, `create_job` and `update_job_tasks` are
/// all-or-nothing.
#[async_trait]
pub trait WorkflowStore: Send + Sync + 'static {
    // =========================================================================
    // Flow Operations
    // =========================================================================

    /// Create a flow together with its ordered steps
    async fn create_flow(&self, flow: &Flow, tasks: &[FlowTask]) -> Result<(), StoreError>;

    /// Get a flow by id
    async fn get_flow(&self, flow_id: Uuid) -> Result<Flow, StoreError>;

    /// List flows, newest first
    async fn list_flows(&self, pagination: Pagination) -> Result<Vec<Flow>, StoreError>;

    /// Replace a flow record
    async fn update_flow(&self, flow: &Flow) -> Result<(), StoreError>;

    /// Delete a flow and its steps
    async fn delete_flow(&self, flow_id: Uuid) -> Result<(), StoreError>;

    /// Number of jobs created from a flow
    async fn count_jobs_for_flow(&self, flow_id: Uuid) -> Result<u64, StoreError>;

    // =========================================================================
    // Flow Task Operations
    // =========================================================================

    /// Add one step to an existing flow
    async fn create_flow_task(&self, flow_task: &FlowTask) -> Result<(), StoreError>;

    /// Get a flow step by id
    async fn get_flow_task(&self, flow_task_id: Uuid) -> Result<FlowTask, StoreError>;

    /// Steps of a flow in ascending sequence
    async fn list_flow_tasks(&self, flow_id: Uuid) -> Result<Vec<FlowTask>, StoreError>;

    /// Get a flow with its ordered steps
    async fn get_flow_with_tasks(&self, flow_id: Uuid) -> Result<(Flow, Vec<FlowTask>), StoreError> {
        let flow = self.get_flow(flow_id).await?;
        let tasks = self.list_flow_tasks(flow_id).await?;
        Ok((flow, tasks))
    }

    // =========================================================================
    // Task Operations
    // =========================================================================

    /// Create a task definition
    async fn create_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Get a task definition by id
    async fn get_task(&self, task_id: Uuid) -> Result<Task, StoreError>;

    /// List task definitions, newest first
    async fn list_tasks(&self, pagination: Pagination) -> Result<Vec<Task>, StoreError>;

    /// Replace a task definition
    async fn update_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Delete a task definition
    async fn delete_task(&self, task_id: Uuid) -> Result<(), StoreError>;

    /// Number of flow steps referencing a task
    async fn count_flow_tasks_for_task(&self, task_id: Uuid) -> Result<u64, StoreError>;

    // =========================================================================
    // Job Operations
    // =========================================================================

    /// Create a job and all of its job tasks atomically
    async fn create_job(&self, job: &Job, tasks: &[JobTask]) -> Result<(), StoreError>;

    /// Get a job by id
    async fn get_job(&self, job_id: Uuid) -> Result<Job, StoreError>;

    /// List jobs, newest first
    async fn list_jobs(
        &self,
        filter: JobFilter,
        pagination: Pagination,
    ) -> Result<Vec<Job>, StoreError>;

    /// Replace a job record
    async fn update_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Change only the status of a job
    async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), StoreError>;

    // =========================================================================
    // Job Task Operations
    // =========================================================================

    /// Get a job task by id
    async fn get_job_task(&self, job_task_id: Uuid) -> Result<JobTask, StoreError>;

    /// All job tasks of a job in ascending sequence
    async fn list_job_tasks(&self, job_id: Uuid) -> Result<Vec<JobTask>, StoreError>;

    /// Job task at a given sequence, if any
    async fn get_job_task_by_sequence(
        &self,
        job_id: Uuid,
        sequence: i32,
    ) -> Result<Option<JobTask>, StoreError>;

    /// Replace a job task record if its stored status still equals `expected`
    ///
    /// Fails with [`StoreError::ConcurrencyConflict`] otherwise.
    async fn update_job_task(
        &self,
        job_task: &JobTask,
        expected: JobTaskStatus,
    ) -> Result<(), StoreError>;

    /// Replace several job task records in one transaction, in order
    async fn update_job_tasks(&self, job_tasks: &[JobTask]) -> Result<(), StoreError>;

    // =========================================================================
    // Job Context Operations
    // =========================================================================

    /// The whole context of a job
    async fn get_job_context(&self, job_id: Uuid) -> Result<JobContext, StoreError>;

    /// Insert or overwrite one context entry
    async fn upsert_job_context(
        &self,
        job_id: Uuid,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError>;

    // =========================================================================
    // Job Task Log Operations
    // =========================================================================

    /// Append an audit entry
    async fn append_job_task_log(&self, log: &JobTaskLog) -> Result<(), StoreError>;

    /// Audit entries of a job task, oldest first
    async fn list_job_task_logs(&self, job_task_id: Uuid)
        -> Result<Vec<JobTaskLog>, StoreError>;
}
