// Jobflow API server library
// Decision: Shared library for the server binary, the OpenAPI exporter and router tests

pub mod api;
pub mod config;
pub mod openapi;
pub mod services;
pub mod telemetry;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use jobflow_engine::{
    ExecutorRegistry, JobRunner, TaskOrchestrator, WorkflowEngine, WorkflowStore,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ServerConfig;
use crate::openapi::ApiDoc;
use crate::services::{CatalogService, JobService};

/// Wire engine, orchestrator and runner over one store
pub fn build_runner(
    store: Arc<dyn WorkflowStore>,
    registry: Arc<ExecutorRegistry>,
    config: &ServerConfig,
) -> Arc<JobRunner<dyn WorkflowStore>> {
    let engine = WorkflowEngine::new(store);
    let orchestrator =
        TaskOrchestrator::with_config(engine, registry, config.orchestrator_config());
    Arc::new(JobRunner::new(orchestrator, config.runner_config()))
}

/// All `/v1` routes, without prefix or middleware
pub fn api_routes(runner: Arc<JobRunner<dyn WorkflowStore>>) -> Router {
    let store = runner.orchestrator().engine().store().clone();
    let registry = runner.orchestrator().registry().clone();

    let catalog = Arc::new(CatalogService::new(store));
    let jobs = Arc::new(JobService::new(runner));

    Router::new()
        .merge(api::executors::routes(api::executors::AppState::new(
            registry,
        )))
        .merge(api::tasks::routes(api::tasks::AppState::new(catalog.clone())))
        .merge(api::flows::routes(api::flows::AppState::new(catalog)))
        .merge(api::jobs::routes(api::jobs::AppState::new(jobs.clone())))
        .merge(api::job_tasks::routes(api::job_tasks::AppState::new(jobs)))
}

/// The complete application: health, prefixed API, Swagger UI, generated
/// reports, CORS and request tracing
pub fn build_app(
    runner: Arc<JobRunner<dyn WorkflowStore>>,
    config: &ServerConfig,
    store_kind: &'static str,
) -> Router {
    let app = Router::new()
        .merge(api::health::routes(api::health::HealthState { store: store_kind }))
        .merge(build_router_with_prefix(api_routes(runner), &config.api_prefix))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .nest_service("/reports", ServeDir::new(config.reports_dir()));

    let cors_origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let app = if cors_origins.is_empty() {
        app
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN]),
        )
    };

    app.layer(TraceLayer::new_for_http())
}

/// Build router with optional API prefix
pub fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}
