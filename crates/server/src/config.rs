// Server configuration
//
// Loaded from the environment (after .env, if present). Every setting has a
// default so the server starts with no configuration at all; without
// DATABASE_URL it runs against the in-memory store.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use jobflow_engine::{OrchestratorConfig, RunnerConfig};
use jobflow_executors::ExecutorsConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// PostgreSQL URL; `None` selects the in-memory store
    pub database_url: Option<String>,
    /// Prefix for every API route, e.g. "/api"
    pub api_prefix: String,
    /// Origins allowed for cross-origin requests; empty disables CORS
    pub cors_origins: Vec<String>,
    pub job_timeout: Duration,
    pub task_timeout: Duration,
    pub step_delay: Duration,
    pub executors: ExecutorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: None,
            api_prefix: String::new(),
            cors_origins: Vec::new(),
            job_timeout: Duration::from_secs(30 * 60),
            task_timeout: Duration::from_secs(10 * 60),
            step_delay: Duration::from_secs(1),
            executors: ExecutorsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// - `SERVER_HOST`, `SERVER_PORT`: listen address (default 0.0.0.0:8080)
    /// - `DATABASE_URL`: PostgreSQL URL, in-memory store when unset
    /// - `API_PREFIX`: route prefix (default: none)
    /// - `CORS_ALLOWED_ORIGINS`: comma separated origins
    /// - `JOB_EXECUTION_TIMEOUT_SECS`: deadline for job runs (default 1800)
    /// - `TASK_EXECUTION_TIMEOUT_SECS`: deadline for single task runs (default 600)
    /// - `ORCHESTRATOR_STEP_DELAY_MS`: pause between steps (default 1000)
    /// - `BIGMODEL_*`, `REPORTS_DIR`: see [`ExecutorsConfig::from_env`]
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = match env_var("SERVER_PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("invalid SERVER_PORT: {port}"))?,
            None => defaults.port,
        };

        Ok(Self {
            host: env_var("SERVER_HOST").unwrap_or(defaults.host),
            port,
            database_url: env_var("DATABASE_URL"),
            api_prefix: env_var("API_PREFIX").unwrap_or_default(),
            cors_origins: env_var("CORS_ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            job_timeout: secs_var("JOB_EXECUTION_TIMEOUT_SECS")?.unwrap_or(defaults.job_timeout),
            task_timeout: secs_var("TASK_EXECUTION_TIMEOUT_SECS")?
                .unwrap_or(defaults.task_timeout),
            step_delay: match env_var("ORCHESTRATOR_STEP_DELAY_MS") {
                Some(ms) => Duration::from_millis(
                    ms.parse()
                        .with_context(|| format!("invalid ORCHESTRATOR_STEP_DELAY_MS: {ms}"))?,
                ),
                None => defaults.step_delay,
            },
            executors: ExecutorsConfig::from_env(),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reports_dir(&self) -> &Path {
        &self.executors.reports_dir
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default().with_step_delay(self.step_delay)
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::default()
            .with_job_timeout(self.job_timeout)
            .with_task_timeout(self.task_timeout)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn secs_var(name: &str) -> Result<Option<Duration>> {
    env_var(name)
        .map(|v| {
            v.parse()
                .map(Duration::from_secs)
                .with_context(|| format!("invalid {name}: {v}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert!(config.database_url.is_none());
        assert_eq!(config.runner_config().job_timeout, Duration::from_secs(1800));
        assert_eq!(config.runner_config().task_timeout, Duration::from_secs(600));
        assert_eq!(
            config.orchestrator_config().step_delay,
            Duration::from_secs(1)
        );
    }
}
