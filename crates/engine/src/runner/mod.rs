//! Background execution of orchestrated runs
//!
//! The [`JobRunner`] launches orchestrations as tokio tasks, each with its
//! own cancellation token and deadline. It admits a single active run per
//! job, so two loops never race over the same job's next task.

mod background;

pub use background::{JobRunner, RunHandle, RunKind, RunReport, RunnerConfig, RunnerError};
