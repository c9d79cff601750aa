//! Domain model shared by the store, the engine and the server
//!
//! - [`catalog`]: authored templates ([`Flow`], [`FlowTask`], [`Task`])
//! - [`job`]: runtime instances ([`Job`], [`JobTask`], [`JobContext`], [`JobTaskLog`])

mod catalog;
mod job;

pub use catalog::{Flow, FlowTask, Task, TaskConfig, TaskType};
pub use job::{
    Job, JobContext, JobStatus, JobTask, JobTaskLog, JobTaskStatus, JobWithTasks, LogAction,
    TaskResult,
};
