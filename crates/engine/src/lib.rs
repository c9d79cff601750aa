//! # Job Flow Engine
//!
//! Tracks multi-step processes ("flows") instantiated as jobs whose steps
//! move through a status lifecycle, can be skipped or rolled back by an
//! operator, and can be run automatically by pluggable executors sharing a
//! per-job key/value context.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         JobRunner                            │
//! │  (background tokio tasks, one active run per job)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TaskOrchestrator                         │
//! │  (input from job context, executor lookup, result write-back)│
//! └─────────────────────────────────────────────────────────────┘
//!                  │                           │
//!                  ▼                           ▼
//! ┌───────────────────────────────┐ ┌───────────────────────────┐
//! │        WorkflowEngine         │ │     ExecutorRegistry      │
//! │  (job/job task state machine) │ │  (name -> Executor)       │
//! └───────────────────────────────┘ └───────────────────────────┘
//!                  │
//!                  ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WorkflowStore                           │
//! │  (PostgreSQL: flows, tasks, jobs, job_tasks, job_context)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use jobflow_engine::prelude::*;
//!
//! let store = Arc::new(InMemoryWorkflowStore::new());
//! let engine = WorkflowEngine::new(store.clone());
//!
//! let mut registry = ExecutorRegistry::new();
//! registry.register(MyExecutor);
//!
//! let orchestrator = TaskOrchestrator::new(engine.clone(), Arc::new(registry));
//! let job = engine.create_job(flow_id, "weekly report", operator_id).await?;
//! orchestrator
//!     .auto_execute_job(job.job.id, &CancellationToken::new())
//!     .await?;
//! ```

pub mod engine;
pub mod error;
pub mod executor;
pub mod model;
pub mod orchestrator;
pub mod persistence;
pub mod runner;

/// Prelude for common imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use async_trait::async_trait;
    pub use tokio_util::sync::CancellationToken;

    pub use crate::engine::{WorkflowEngine, WorkflowError};
    pub use crate::error::ErrorKind;
    pub use crate::executor::{
        ExecutionContext, Executor, ExecutorError, ExecutorRegistry, RegistryError, TaskInput,
    };
    pub use crate::model::*;
    pub use crate::orchestrator::{
        ExecutionError, OrchestratorConfig, RunOutcome, TaskOrchestrator, TaskOutcome,
    };
    pub use crate::persistence::{
        InMemoryWorkflowStore, JobFilter, Pagination, PostgresWorkflowStore, StoreError,
        WorkflowStore,
    };
    pub use crate::runner::{JobRunner, RunHandle, RunKind, RunReport, RunnerConfig, RunnerError};
}

// Re-export key types at crate root
pub use engine::{WorkflowEngine, WorkflowError};
pub use error::ErrorKind;
pub use executor::{
    ExecutionContext, Executor, ExecutorError, ExecutorRegistry, RegistryError, TaskInput,
};
pub use orchestrator::{ExecutionError, OrchestratorConfig, RunOutcome, TaskOrchestrator, TaskOutcome};
pub use persistence::{
    InMemoryWorkflowStore, JobFilter, Pagination, PostgresWorkflowStore, StoreError, WorkflowStore,
    MAX_PAGE_LIMIT,
};
pub use runner::{JobRunner, RunHandle, RunKind, RunReport, RunnerConfig, RunnerError};
