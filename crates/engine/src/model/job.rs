//! Runtime types: jobs, their per-step records, shared context and audit log

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use super::catalog::FlowTask;

/// Opaque result map written by an executor or an operator
pub type TaskResult = Map<String, Value>;

/// Per-job key/value scratch space shared by all executors of a job
pub type JobContext = BTreeMap<String, String>;

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not started
    Pending,

    /// Steps are being worked on
    Running,

    /// Every step completed or was skipped
    Completed,

    /// A step failed
    Failed,

    /// Stopped by an operator
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Job task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum JobTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    RolledBack,
}

impl std::fmt::Display for JobTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

impl std::str::FromStr for JobTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            "rolled_back" => Ok(Self::RolledBack),
            other => Err(format!("unknown job task status: {other}")),
        }
    }
}

/// One instantiation of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Job {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub name: String,
    pub status: JobStatus,
    /// Sequence of the step the job is on; `None` until the job starts
    pub current_task_seq: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(flow_id: Uuid, name: impl Into<String>, created_by: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            flow_id,
            name: name.into(),
            status: JobStatus::Pending,
            current_task_seq: None,
            started_at: None,
            completed_at: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One instantiation of a flow task within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct JobTask {
    pub id: Uuid,
    pub job_id: Uuid,
    pub flow_task_id: Uuid,
    pub task_id: Uuid,
    /// Copied from the flow task when the job was created
    pub sequence: i32,
    pub status: JobTaskStatus,
    pub is_skipped: bool,
    /// Operator or executor that last acted on this step
    pub executor_id: Option<i64>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub result: Option<TaskResult>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobTask {
    /// Pending job task for the given flow step
    pub fn from_flow_task(job_id: Uuid, flow_task: &FlowTask) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            job_id,
            flow_task_id: flow_task.id,
            task_id: flow_task.task_id,
            sequence: flow_task.sequence,
            status: JobTaskStatus::Pending,
            is_skipped: false,
            executor_id: None,
            result: None,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Clear everything a previous attempt left behind
    pub fn reset(&mut self) {
        self.status = JobTaskStatus::Pending;
        self.is_skipped = false;
        self.executor_id = None;
        self.result = None;
        self.error_message = None;
        self.started_at = None;
        self.completed_at = None;
        self.updated_at = Utc::now();
    }
}

/// Job paired with its steps in sequence order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct JobWithTasks {
    #[serde(flatten)]
    pub job: Job,
    pub tasks: Vec<JobTask>,
}

/// Kind of transition recorded in the job task log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Start,
    Complete,
    Skip,
    Rollback,
    Fail,
}

impl std::fmt::Display for LogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Complete => write!(f, "complete"),
            Self::Skip => write!(f, "skip"),
            Self::Rollback => write!(f, "rollback"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl std::str::FromStr for LogAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "complete" => Ok(Self::Complete),
            "skip" => Ok(Self::Skip),
            "rollback" => Ok(Self::Rollback),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown log action: {other}")),
        }
    }
}

/// Audit entry for one job task transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct JobTaskLog {
    pub id: Uuid,
    pub job_task_id: Uuid,
    pub action: LogAction,
    pub operator_id: Option<i64>,
    pub message: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl JobTaskLog {
    pub fn new(job_task_id: Uuid, action: LogAction, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_task_id,
            action,
            operator_id: None,
            message: message.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_operator(mut self, operator_id: i64) -> Self {
        self.operator_id = Some(operator_id);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_task_reset_clears_attempt_state() {
        let flow_task = FlowTask::new(Uuid::now_v7(), Uuid::now_v7(), 2);
        let mut jt = JobTask::from_flow_task(Uuid::now_v7(), &flow_task);
        jt.status = JobTaskStatus::Completed;
        jt.is_skipped = true;
        jt.executor_id = Some(7);
        jt.result = Some(TaskResult::new());
        jt.error_message = Some("boom".into());
        jt.started_at = Some(Utc::now());
        jt.completed_at = Some(Utc::now());

        jt.reset();

        assert_eq!(jt.status, JobTaskStatus::Pending);
        assert!(!jt.is_skipped);
        assert!(jt.executor_id.is_none());
        assert!(jt.result.is_none());
        assert!(jt.error_message.is_none());
        assert!(jt.started_at.is_none());
        assert!(jt.completed_at.is_none());
        assert_eq!(jt.sequence, 2);
    }

    #[test]
    fn test_status_string_forms() {
        assert_eq!(JobTaskStatus::RolledBack.to_string(), "rolled_back");
        assert_eq!(
            "rolled_back".parse::<JobTaskStatus>().unwrap(),
            JobTaskStatus::RolledBack
        );
        assert_eq!(
            serde_json::to_value(JobStatus::Cancelled).unwrap(),
            serde_json::json!("cancelled")
        );
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
