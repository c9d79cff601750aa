// Job task routes: operator actions, single task runs and the audit log

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use jobflow_engine::model::{Job, JobTask, JobTaskLog, TaskResult};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{api_error, ApiResult, ErrorResponse, ListResponse, OperatorRequest};
use super::jobs::RunAccepted;
use crate::services::JobService;

/// Request to start a job task
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct StartTaskRequest {
    /// Person or system working on the step
    #[serde(default)]
    #[schema(example = 42)]
    pub executor_id: i64,
}

/// Request to complete a running job task
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CompleteTaskRequest {
    #[serde(default)]
    #[schema(value_type = Object, example = json!({"approved": true}))]
    pub result: TaskResult,
}

/// Request to fail a running job task
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FailTaskRequest {
    #[schema(example = "upstream system unavailable")]
    pub error_message: String,
}

/// Request to roll a job back from this task
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RollbackTaskRequest {
    #[serde(default)]
    pub operator_id: i64,
    /// Earlier sequence to reopen the job at
    #[schema(example = 1)]
    pub target_sequence: i32,
}

/// App state for job task routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<JobService>,
}

impl AppState {
    pub fn new(service: Arc<JobService>) -> Self {
        Self { service }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/job-tasks/:job_task_id", get(get_job_task))
        .route("/v1/job-tasks/:job_task_id/start", post(start_task))
        .route("/v1/job-tasks/:job_task_id/complete", post(complete_task))
        .route("/v1/job-tasks/:job_task_id/fail", post(fail_task))
        .route("/v1/job-tasks/:job_task_id/skip", post(skip_task))
        .route("/v1/job-tasks/:job_task_id/rollback", post(rollback_task))
        .route("/v1/job-tasks/:job_task_id/execute", post(execute_task))
        .route("/v1/job-tasks/:job_task_id/logs", get(list_logs))
        .with_state(state)
}

/// GET /v1/job-tasks/{job_task_id} - Get a job task
#[utoipa::path(
    get,
    path = "/v1/job-tasks/{job_task_id}",
    params(("job_task_id" = Uuid, Path, description = "Job task ID")),
    responses(
        (status = 200, description = "Job task found", body = JobTask),
        (status = 404, description = "Job task not found", body = ErrorResponse),
    ),
    tag = "job-tasks"
)]
pub async fn get_job_task(
    State(state): State<AppState>,
    Path(job_task_id): Path<Uuid>,
) -> ApiResult<Json<JobTask>> {
    let task = state
        .service
        .get_job_task(job_task_id)
        .await
        .map_err(|e| api_error("get job task", e))?;

    Ok(Json(task))
}

/// POST /v1/job-tasks/{job_task_id}/start - Start a pending job task
#[utoipa::path(
    post,
    path = "/v1/job-tasks/{job_task_id}/start",
    params(("job_task_id" = Uuid, Path, description = "Job task ID")),
    request_body = StartTaskRequest,
    responses(
        (status = 200, description = "Job task running", body = JobTask),
        (status = 404, description = "Job task not found", body = ErrorResponse),
        (status = 409, description = "Job task is not pending", body = ErrorResponse),
    ),
    tag = "job-tasks"
)]
pub async fn start_task(
    State(state): State<AppState>,
    Path(job_task_id): Path<Uuid>,
    Json(req): Json<StartTaskRequest>,
) -> ApiResult<Json<JobTask>> {
    let task = state
        .service
        .start_task(job_task_id, req.executor_id)
        .await
        .map_err(|e| api_error("start task", e))?;

    Ok(Json(task))
}

/// POST /v1/job-tasks/{job_task_id}/complete - Complete a running job task
#[utoipa::path(
    post,
    path = "/v1/job-tasks/{job_task_id}/complete",
    params(("job_task_id" = Uuid, Path, description = "Job task ID")),
    request_body = CompleteTaskRequest,
    responses(
        (status = 200, description = "Job task completed and the job advanced", body = JobTask),
        (status = 404, description = "Job task not found", body = ErrorResponse),
        (status = 409, description = "Job task is not running", body = ErrorResponse),
    ),
    tag = "job-tasks"
)]
pub async fn complete_task(
    State(state): State<AppState>,
    Path(job_task_id): Path<Uuid>,
    Json(req): Json<CompleteTaskRequest>,
) -> ApiResult<Json<JobTask>> {
    let task = state
        .service
        .complete_task(job_task_id, req.result)
        .await
        .map_err(|e| api_error("complete task", e))?;

    Ok(Json(task))
}

/// POST /v1/job-tasks/{job_task_id}/fail - Fail a running job task and its job
#[utoipa::path(
    post,
    path = "/v1/job-tasks/{job_task_id}/fail",
    params(("job_task_id" = Uuid, Path, description = "Job task ID")),
    request_body = FailTaskRequest,
    responses(
        (status = 200, description = "Job task failed", body = JobTask),
        (status = 404, description = "Job task not found", body = ErrorResponse),
        (status = 409, description = "Job task is not running", body = ErrorResponse),
    ),
    tag = "job-tasks"
)]
pub async fn fail_task(
    State(state): State<AppState>,
    Path(job_task_id): Path<Uuid>,
    Json(req): Json<FailTaskRequest>,
) -> ApiResult<Json<JobTask>> {
    let task = state
        .service
        .fail_task(job_task_id, &req.error_message)
        .await
        .map_err(|e| api_error("fail task", e))?;

    Ok(Json(task))
}

/// POST /v1/job-tasks/{job_task_id}/skip - Skip a pending optional job task
#[utoipa::path(
    post,
    path = "/v1/job-tasks/{job_task_id}/skip",
    params(("job_task_id" = Uuid, Path, description = "Job task ID")),
    request_body = OperatorRequest,
    responses(
        (status = 200, description = "Job task skipped and the job advanced", body = JobTask),
        (status = 404, description = "Job task not found", body = ErrorResponse),
        (status = 409, description = "Job task is not pending or not optional", body = ErrorResponse),
    ),
    tag = "job-tasks"
)]
pub async fn skip_task(
    State(state): State<AppState>,
    Path(job_task_id): Path<Uuid>,
    Json(req): Json<OperatorRequest>,
) -> ApiResult<Json<JobTask>> {
    let task = state
        .service
        .skip_task(job_task_id, req.operator_id)
        .await
        .map_err(|e| api_error("skip task", e))?;

    Ok(Json(task))
}

/// POST /v1/job-tasks/{job_task_id}/rollback - Reopen the job at an earlier step
#[utoipa::path(
    post,
    path = "/v1/job-tasks/{job_task_id}/rollback",
    params(("job_task_id" = Uuid, Path, description = "Job task ID")),
    request_body = RollbackTaskRequest,
    responses(
        (status = 200, description = "Job rolled back", body = Job),
        (status = 404, description = "Job task not found", body = ErrorResponse),
        (status = 409, description = "Rollback not allowed or target invalid", body = ErrorResponse),
    ),
    tag = "job-tasks"
)]
pub async fn rollback_task(
    State(state): State<AppState>,
    Path(job_task_id): Path<Uuid>,
    Json(req): Json<RollbackTaskRequest>,
) -> ApiResult<Json<Job>> {
    let job = state
        .service
        .rollback_task(job_task_id, req.operator_id, req.target_sequence)
        .await
        .map_err(|e| api_error("roll back task", e))?;

    Ok(Json(job))
}

/// POST /v1/job-tasks/{job_task_id}/execute - Run one job task through its
/// executor in the background
#[utoipa::path(
    post,
    path = "/v1/job-tasks/{job_task_id}/execute",
    params(("job_task_id" = Uuid, Path, description = "Job task ID")),
    responses(
        (status = 202, description = "Run started", body = RunAccepted),
        (status = 404, description = "Job task not found", body = ErrorResponse),
        (status = 409, description = "The job already has a run", body = ErrorResponse),
    ),
    tag = "job-tasks"
)]
pub async fn execute_task(
    State(state): State<AppState>,
    Path(job_task_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    let run = state
        .service
        .execute_task(job_task_id)
        .await
        .map_err(|e| api_error("execute task", e))?;

    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// GET /v1/job-tasks/{job_task_id}/logs - Audit log of a job task, oldest first
#[utoipa::path(
    get,
    path = "/v1/job-tasks/{job_task_id}/logs",
    params(("job_task_id" = Uuid, Path, description = "Job task ID")),
    responses(
        (status = 200, description = "Log entries", body = ListResponse<JobTaskLog>),
        (status = 404, description = "Job task not found", body = ErrorResponse),
    ),
    tag = "job-tasks"
)]
pub async fn list_logs(
    State(state): State<AppState>,
    Path(job_task_id): Path<Uuid>,
) -> ApiResult<Json<ListResponse<JobTaskLog>>> {
    let logs = state
        .service
        .list_logs(job_task_id)
        .await
        .map_err(|e| api_error("list job task logs", e))?;

    Ok(Json(ListResponse::new(logs)))
}
