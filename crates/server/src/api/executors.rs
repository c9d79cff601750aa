// Executor listing route
//
// The registry is fixed at startup, so this is read-only.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use jobflow_engine::ExecutorRegistry;
use serde::Serialize;
use utoipa::ToSchema;

use super::common::ListResponse;

/// A registered executor
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExecutorInfo {
    /// Name automated tasks refer to in their `executor` config entry
    #[schema(example = "echo")]
    pub name: String,
    pub description: String,
}

/// App state for executor routes
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ExecutorRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self { registry }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/executors", get(list_executors))
        .with_state(state)
}

/// GET /v1/executors - List registered executors
#[utoipa::path(
    get,
    path = "/v1/executors",
    responses(
        (status = 200, description = "Registered executors, sorted by name", body = ListResponse<ExecutorInfo>),
    ),
    tag = "executors"
)]
pub async fn list_executors(State(state): State<AppState>) -> Json<ListResponse<ExecutorInfo>> {
    let mut executors: Vec<ExecutorInfo> = state
        .registry
        .list()
        .iter()
        .map(|e| ExecutorInfo {
            name: e.name().to_string(),
            description: e.description().to_string(),
        })
        .collect();
    executors.sort_by(|a, b| a.name.cmp(&b.name));

    Json(ListResponse::new(executors))
}
