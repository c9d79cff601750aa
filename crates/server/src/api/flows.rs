// Flow CRUD routes
//
// A flow is created with its ordered steps in one request. Once a job uses
// the flow only `is_active` may change.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use jobflow_engine::model::{Flow, FlowTask};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{api_error, ApiResult, ErrorResponse, ListResponse, PageQuery};
use crate::services::CatalogService;

/// One step of a flow being created
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FlowStepRequest {
    pub task_id: Uuid,
    /// Operators may skip the step (default false)
    #[serde(default)]
    pub is_optional: bool,
    /// Operators may roll back from the step (default true)
    #[serde(default = "default_true")]
    pub allow_rollback: bool,
    /// Stored with the step, not evaluated
    #[schema(value_type = Option<Object>)]
    pub condition_config: Option<Value>,
}

fn default_true() -> bool {
    true
}

impl FlowStepRequest {
    /// A required step that allows rollback
    pub fn for_task(task_id: Uuid) -> Self {
        Self {
            task_id,
            is_optional: false,
            allow_rollback: true,
            condition_config: None,
        }
    }

    pub fn into_flow_task(self, flow_id: Uuid, sequence: i32) -> FlowTask {
        let mut flow_task = FlowTask::new(flow_id, self.task_id, sequence)
            .optional(self.is_optional)
            .rollback(self.allow_rollback);
        flow_task.condition_config = self.condition_config;
        flow_task
    }
}

/// Request to create a flow
///
/// Steps are numbered 1..N in the order given, either as bare task ids or
/// as step objects carrying skip and rollback permissions.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateFlowRequest {
    #[schema(example = "Video analysis")]
    pub name: String,
    pub description: Option<String>,
    /// Defaults to "1.0"
    pub version: Option<String>,
    #[serde(default)]
    pub created_by: i64,
    #[serde(default)]
    pub task_ids: Vec<Uuid>,
    #[serde(default)]
    pub tasks: Vec<FlowStepRequest>,
}

/// Request to update a flow. Only provided fields change.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateFlowRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub is_active: Option<bool>,
}

/// Request to add a step to an existing flow
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AddFlowTaskRequest {
    /// Sequence for the new step; defaults to after the last step
    pub sequence: Option<i32>,
    #[serde(flatten)]
    pub step: FlowStepRequest,
}

/// A flow with its steps in ascending sequence
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FlowWithTasks {
    #[serde(flatten)]
    pub flow: Flow,
    pub tasks: Vec<FlowTask>,
}

/// App state for flow routes
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
        .route("/v1/flows", post(create_flow).get(list_flows))
        .route(
            "/v1/flows/:flow_id",
            get(get_flow).patch(update_flow).delete(delete_flow),
        )
        .route("/v1/flows/:flow_id/tasks", post(add_flow_task))
        .with_state(state)
}

/// POST /v1/flows - Create a flow with its steps
#[utoipa::path(
    post,
    path = "/v1/flows",
    request_body = CreateFlowRequest,
    responses(
        (status = 201, description = "Flow created", body = FlowWithTasks),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "A referenced task does not exist", body = ErrorResponse),
    ),
    tag = "flows"
)]
pub async fn create_flow(
    State(state): State<AppState>,
    Json(req): Json<CreateFlowRequest>,
) -> ApiResult<(StatusCode, Json<FlowWithTasks>)> {
    let flow = state
        .service
        .create_flow(req)
        .await
        .map_err(|e| api_error("create flow", e))?;

    Ok((StatusCode::CREATED, Json(flow)))
}

/// GET /v1/flows - List flows, newest first
#[utoipa::path(
    get,
    path = "/v1/flows",
    params(PageQuery),
    responses(
        (status = 200, description = "List of flows", body = ListResponse<Flow>),
    ),
    tag = "flows"
)]
pub async fn list_flows(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<ListResponse<Flow>>> {
    let flows = state
        .service
        .list_flows(page.pagination())
        .await
        .map_err(|e| api_error("list flows", e))?;

    Ok(Json(ListResponse::new(flows)))
}

/// GET /v1/flows/{flow_id} - Get a flow with its steps
#[utoipa::path(
    get,
    path = "/v1/flows/{flow_id}",
    params(("flow_id" = Uuid, Path, description = "Flow ID")),
    responses(
        (status = 200, description = "Flow found", body = FlowWithTasks),
        (status = 404, description = "Flow not found", body = ErrorResponse),
    ),
    tag = "flows"
)]
pub async fn get_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<Uuid>,
) -> ApiResult<Json<FlowWithTasks>> {
    let flow = state
        .service
        .get_flow(flow_id)
        .await
        .map_err(|e| api_error("get flow", e))?;

    Ok(Json(flow))
}

/// PATCH /v1/flows/{flow_id} - Update a flow
#[utoipa::path(
    patch,
    path = "/v1/flows/{flow_id}",
    params(("flow_id" = Uuid, Path, description = "Flow ID")),
    request_body = UpdateFlowRequest,
    responses(
        (status = 200, description = "Flow updated", body = Flow),
        (status = 404, description = "Flow not found", body = ErrorResponse),
        (status = 409, description = "Flow is used by a job", body = ErrorResponse),
    ),
    tag = "flows"
)]
pub async fn update_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<Uuid>,
    Json(req): Json<UpdateFlowRequest>,
) -> ApiResult<Json<Flow>> {
    let flow = state
        .service
        .update_flow(flow_id, req)
        .await
        .map_err(|e| api_error("update flow", e))?;

    Ok(Json(flow))
}

/// DELETE /v1/flows/{flow_id} - Delete a flow no job uses
#[utoipa::path(
    delete,
    path = "/v1/flows/{flow_id}",
    params(("flow_id" = Uuid, Path, description = "Flow ID")),
    responses(
        (status = 204, description = "Flow deleted"),
        (status = 404, description = "Flow not found", body = ErrorResponse),
        (status = 409, description = "Flow is used by a job", body = ErrorResponse),
    ),
    tag = "flows"
)]
pub async fn delete_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .service
        .delete_flow(flow_id)
        .await
        .map_err(|e| api_error("delete flow", e))?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/flows/{flow_id}/tasks - Add a step to a flow
#[utoipa::path(
    post,
    path = "/v1/flows/{flow_id}/tasks",
    params(("flow_id" = Uuid, Path, description = "Flow ID")),
    request_body = AddFlowTaskRequest,
    responses(
        (status = 201, description = "Step added", body = FlowTask),
        (status = 404, description = "Flow or task not found", body = ErrorResponse),
        (status = 409, description = "Sequence taken or flow used by a job", body = ErrorResponse),
    ),
    tag = "flows"
)]
pub async fn add_flow_task(
    State(state): State<AppState>,
    Path(flow_id): Path<Uuid>,
    Json(req): Json<AddFlowTaskRequest>,
) -> ApiResult<(StatusCode, Json<FlowTask>)> {
    let flow_task = state
        .service
        .add_flow_task(flow_id, req)
        .await
        .map_err(|e| api_error("add flow task", e))?;

    Ok((StatusCode::CREATED, Json(flow_task)))
}
