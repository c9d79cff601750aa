// Job routes
//
// Job lifecycle, background runs, the job context and the current/next
// step queries. Runs are accepted with 202 and report progress through the
// job status.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jobflow_engine::model::{Job, JobContext, JobStatus, JobTask, JobWithTasks};
use jobflow_engine::JobFilter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::{api_error, ApiResult, ErrorResponse, ListResponse, PageQuery};
use crate::services::JobService;

/// Request to create a job from a flow
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    pub flow_id: Uuid,
    #[schema(example = "Analyse keynote")]
    pub name: String,
    #[serde(default)]
    pub created_by: i64,
}

/// Filters and paging for the job list
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListJobsQuery {
    /// Only jobs of this flow
    pub flow_id: Option<Uuid>,
    /// Only jobs in this status
    pub status: Option<JobStatus>,
    /// Maximum number of items (default 20)
    pub limit: Option<u32>,
    /// Number of items to skip (default 0)
    pub offset: Option<u32>,
}

/// A background run was accepted
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RunAccepted {
    pub run_id: Uuid,
    pub job_id: Uuid,
    /// Set for single task runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_task_id: Option<Uuid>,
}

/// Result of a cancel request
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CancelJobResponse {
    #[serde(flatten)]
    pub job: Job,
    /// True when an active run was asked to stop. The job turns `cancelled`
    /// once the run reaches its next step boundary.
    pub run_cancelled: bool,
}

/// The shared key/value context of a job
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobContextResponse {
    pub job_id: Uuid,
    pub context: JobContext,
}

/// App state for job routes
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
        .route("/v1/jobs", post(create_job).get(list_jobs))
        .route("/v1/jobs/:job_id", get(get_job))
        .route("/v1/jobs/:job_id/start", post(start_job))
        .route("/v1/jobs/:job_id/auto-execute", post(auto_execute_job))
        .route("/v1/jobs/:job_id/resume", post(resume_job))
        .route("/v1/jobs/:job_id/cancel", post(cancel_job))
        .route("/v1/jobs/:job_id/current-task", get(get_current_task))
        .route("/v1/jobs/:job_id/next-task", get(get_next_task))
        .route(
            "/v1/jobs/:job_id/context",
            get(get_job_context).put(update_job_context),
        )
        .with_state(state)
}

/// POST /v1/jobs - Create a job from an active flow
#[utoipa::path(
    post,
    path = "/v1/jobs",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Job created with one pending task per flow step", body = JobWithTasks),
        (status = 404, description = "Flow not found", body = ErrorResponse),
        (status = 409, description = "Flow inactive or without steps", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<JobWithTasks>)> {
    let job = state
        .service
        .create_job(req)
        .await
        .map_err(|e| api_error("create job", e))?;

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /v1/jobs - List jobs, newest first
#[utoipa::path(
    get,
    path = "/v1/jobs",
    params(ListJobsQuery),
    responses(
        (status = 200, description = "List of jobs", body = ListResponse<Job>),
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<ListResponse<Job>>> {
    let filter = JobFilter {
        flow_id: query.flow_id,
        status: query.status,
    };
    let page = PageQuery {
        limit: query.limit,
        offset: query.offset,
    };
    let jobs = state
        .service
        .list_jobs(filter, page.pagination())
        .await
        .map_err(|e| api_error("list jobs", e))?;

    Ok(Json(ListResponse::new(jobs)))
}

/// GET /v1/jobs/{job_id} - Get a job with its tasks
#[utoipa::path(
    get,
    path = "/v1/jobs/{job_id}",
    params(("job_id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job found", body = JobWithTasks),
        (status = 404, description = "Job not found", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobWithTasks>> {
    let job = state
        .service
        .get_job(job_id)
        .await
        .map_err(|e| api_error("get job", e))?;

    Ok(Json(job))
}

/// POST /v1/jobs/{job_id}/start - Start a pending job for manual operation
#[utoipa::path(
    post,
    path = "/v1/jobs/{job_id}/start",
    params(("job_id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job running at sequence 1", body = Job),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job is not pending", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn start_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    let job = state
        .service
        .start_job(job_id)
        .await
        .map_err(|e| api_error("start job", e))?;

    Ok(Json(job))
}

/// POST /v1/jobs/{job_id}/auto-execute - Start a pending job and run its
/// automated steps in the background
#[utoipa::path(
    post,
    path = "/v1/jobs/{job_id}/auto-execute",
    params(("job_id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 202, description = "Run started", body = RunAccepted),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job is not pending or already has a run", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn auto_execute_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    let run = state
        .service
        .auto_execute(job_id)
        .await
        .map_err(|e| api_error("auto-execute job", e))?;

    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// POST /v1/jobs/{job_id}/resume - Continue a running job in the background,
/// e.g. after an operator finished a manual step
#[utoipa::path(
    post,
    path = "/v1/jobs/{job_id}/resume",
    params(("job_id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 202, description = "Run started", body = RunAccepted),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job is not running or already has a run", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn resume_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    let run = state
        .service
        .resume(job_id)
        .await
        .map_err(|e| api_error("resume job", e))?;

    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// POST /v1/jobs/{job_id}/cancel - Cancel a job or its active run
#[utoipa::path(
    post,
    path = "/v1/jobs/{job_id}/cancel",
    params(("job_id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job cancelled or its run asked to stop", body = CancelJobResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job already finished", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<CancelJobResponse>> {
    let response = state
        .service
        .cancel_job(job_id)
        .await
        .map_err(|e| api_error("cancel job", e))?;

    Ok(Json(response))
}

/// GET /v1/jobs/{job_id}/current-task - The task at the job's current sequence
#[utoipa::path(
    get,
    path = "/v1/jobs/{job_id}/current-task",
    params(("job_id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Current task", body = JobTask),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job has not started", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn get_current_task(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobTask>> {
    let task = state
        .service
        .current_task(job_id)
        .await
        .map_err(|e| api_error("get current task", e))?;

    Ok(Json(task))
}

/// GET /v1/jobs/{job_id}/next-task - The lowest pending task, if any
#[utoipa::path(
    get,
    path = "/v1/jobs/{job_id}/next-task",
    params(("job_id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Next pending task", body = JobTask),
        (status = 204, description = "No pending task left"),
        (status = 404, description = "Job not found", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn get_next_task(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Response> {
    let next = state
        .service
        .next_task(job_id)
        .await
        .map_err(|e| api_error("get next task", e))?;

    Ok(match next {
        Some(task) => Json(task).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// GET /v1/jobs/{job_id}/context - Read the job context
#[utoipa::path(
    get,
    path = "/v1/jobs/{job_id}/context",
    params(("job_id" = Uuid, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job context", body = JobContextResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn get_job_context(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobContextResponse>> {
    let context = state
        .service
        .get_context(job_id)
        .await
        .map_err(|e| api_error("get job context", e))?;

    Ok(Json(JobContextResponse { job_id, context }))
}

/// PUT /v1/jobs/{job_id}/context - Upsert context entries
///
/// Non-string values are stored in their text form, like executor results.
#[utoipa::path(
    put,
    path = "/v1/jobs/{job_id}/context",
    params(("job_id" = Uuid, Path, description = "Job ID")),
    request_body(content = BTreeMap<String, String>, description = "Entries to upsert"),
    responses(
        (status = 200, description = "Context after the update", body = JobContextResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn update_job_context(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(entries): Json<BTreeMap<String, Value>>,
) -> ApiResult<Json<JobContextResponse>> {
    let context = state
        .service
        .update_context(job_id, entries)
        .await
        .map_err(|e| api_error("update job context", e))?;

    Ok(Json(JobContextResponse { job_id, context }))
}
