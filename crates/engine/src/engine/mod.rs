//! Workflow state machine
//!
//! The engine module provides the `WorkflowEngine` which owns all job and
//! job task status transitions. It never calls executors.

mod workflow;

pub use workflow::{WorkflowEngine, WorkflowError};
