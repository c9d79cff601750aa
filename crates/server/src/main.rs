// Jobflow API server
// Decision: Without DATABASE_URL the server runs on the in-memory store (dev mode)

use std::sync::Arc;

use anyhow::{Context, Result};
use jobflow_engine::{InMemoryWorkflowStore, PostgresWorkflowStore, WorkflowStore};
use jobflow_server::config::ServerConfig;
use jobflow_server::telemetry::{init_telemetry, TelemetryConfig};
use jobflow_server::{build_app, build_runner};

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let mut telemetry_config = TelemetryConfig::from_env();
    telemetry_config.service_version = Some(env!("CARGO_PKG_VERSION").to_string());
    init_telemetry(telemetry_config);

    let config = ServerConfig::from_env().context("Failed to load configuration")?;
    tracing::info!("jobflow-server starting...");

    let (store, store_kind): (Arc<dyn WorkflowStore>, &'static str) = match &config.database_url
    {
        Some(url) => {
            let store = PostgresWorkflowStore::connect(url)
                .await
                .context("Failed to connect to database")?;
            store.migrate().await.context("Failed to run migrations")?;
            tracing::info!("Connected to database");
            (Arc::new(store), "postgres")
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on exit");
            (Arc::new(InMemoryWorkflowStore::new()), "memory")
        }
    };

    let registry = Arc::new(jobflow_executors::builtin_registry(&config.executors));
    tracing::info!(executors = ?registry.names(), "Executors registered");
    if config.executors.bigmodel_api_key.is_none() {
        tracing::warn!("BIGMODEL_API_KEY not set, bigmodel_analysis returns sample content");
    }

    let runner = build_runner(store, registry, &config);

    if !config.api_prefix.is_empty() {
        tracing::info!(prefix = %config.api_prefix, "API prefix configured");
    }
    tracing::info!(
        job_timeout = ?config.job_timeout,
        task_timeout = ?config.task_timeout,
        step_delay = ?config.step_delay,
        "Runner configured"
    );

    let app = build_app(runner, &config, store_kind);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
