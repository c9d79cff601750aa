// HTTP API routes
//
// Each submodule handles one resource type with its own AppState.

pub mod common;
pub mod executors;
pub mod flows;
pub mod health;
pub mod job_tasks;
pub mod jobs;
pub mod tasks;

// Re-export common types
pub use common::{ErrorResponse, ListResponse};
