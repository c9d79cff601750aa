//! Automated execution of job steps
//!
//! - [`TaskOrchestrator`] runs single steps and whole jobs through executors
//! - [`merge_input`] and [`context_value`] move data between executors and the job context

mod context;
mod task;

pub use context::{context_value, merge_input};
pub use task::{ExecutionError, OrchestratorConfig, RunOutcome, TaskOrchestrator, TaskOutcome};
