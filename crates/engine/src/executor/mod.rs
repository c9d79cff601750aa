//! Executor abstractions
//!
//! Executors perform the work of automated tasks. They:
//! - Are looked up by name through the [`ExecutorRegistry`]
//! - Receive merged input and the raw job context
//! - Return a result map that is written back into the job context

mod context;
mod definition;
mod registry;

pub use context::ExecutionContext;
pub use definition::{Executor, ExecutorError, TaskInput};
pub use registry::{ExecutorRegistry, RegistryError};
