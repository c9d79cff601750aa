// Task definition CRUD routes

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use jobflow_engine::model::{Task, TaskConfig, TaskType};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{api_error, ApiResult, ErrorResponse, ListResponse, PageQuery};
use crate::services::CatalogService;

/// Request to create a task definition
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    #[schema(example = "Fetch transcript")]
    pub name: String,
    pub description: Option<String>,
    pub task_type: TaskType,
    /// Automated tasks name their executor here; other keys become executor input.
    #[serde(default)]
    #[schema(example = json!({"executor": "youtube_asr", "video_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"}))]
    pub config: TaskConfig,
    /// Defaults to true
    pub is_active: Option<bool>,
}

/// Request to update a task definition. Only provided fields change.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateTaskRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub task_type: Option<TaskType>,
    /// Replaces the whole config
    pub config: Option<TaskConfig>,
    pub is_active: Option<bool>,
}

/// App state for task routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CatalogService>,
}

impl AppState {
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/tasks", post(create_task).get(list_tasks))
        .route(
            "/v1/tasks/:task_id",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .with_state(state)
}

/// POST /v1/tasks - Create a task definition
#[utoipa::path(
    post,
    path = "/v1/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Invalid request", body = ErrorResponse),
    ),
    tag = "tasks"
)]
pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = state
        .service
        .create_task(req)
        .await
        .map_err(|e| api_error("create task", e))?;

    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /v1/tasks - List task definitions, newest first
#[utoipa::path(
    get,
    path = "/v1/tasks",
    params(PageQuery),
    responses(
        (status = 200, description = "List of tasks", body = ListResponse<Task>),
    ),
    tag = "tasks"
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<ListResponse<Task>>> {
    let tasks = state
        .service
        .list_tasks(page.pagination())
        .await
        .map_err(|e| api_error("list tasks", e))?;

    Ok(Json(ListResponse::new(tasks)))
}

/// GET /v1/tasks/{task_id} - Get a task definition
#[utoipa::path(
    get,
    path = "/v1/tasks/{task_id}",
    params(("task_id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task found", body = Task),
        (status = 404, description = "Task not found", body = ErrorResponse),
    ),
    tag = "tasks"
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let task = state
        .service
        .get_task(task_id)
        .await
        .map_err(|e| api_error("get task", e))?;

    Ok(Json(task))
}

/// PATCH /v1/tasks/{task_id} - Update a task definition
#[utoipa::path(
    patch,
    path = "/v1/tasks/{task_id}",
    params(("task_id" = Uuid, Path, description = "Task ID")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 404, description = "Task not found", body = ErrorResponse),
    ),
    tag = "tasks"
)]
pub async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let task = state
        .service
        .update_task(task_id, req)
        .await
        .map_err(|e| api_error("update task", e))?;

    Ok(Json(task))
}

/// DELETE /v1/tasks/{task_id} - Delete a task definition no flow uses
#[utoipa::path(
    delete,
    path = "/v1/tasks/{task_id}",
    params(("task_id" = Uuid, Path, description = "Task ID")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 409, description = "Task is used by a flow", body = ErrorResponse),
    ),
    tag = "tasks"
)]
pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .service
        .delete_task(task_id)
        .await
        .map_err(|e| api_error("delete task", e))?;

    Ok(StatusCode::NO_CONTENT)
}
