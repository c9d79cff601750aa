//! Persistence layer for the workflow engine
//!
//! This module provides:
//! - [`WorkflowStore`] trait for the catalog, jobs, context and audit log
//! - [`InMemoryWorkflowStore`] for tests and dev mode
//! - [`PostgresWorkflowStore`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryWorkflowStore;
pub use postgres::PostgresWorkflowStore;
pub use store::{JobFilter, Pagination, StoreError, WorkflowStore, MAX_PAGE_LIMIT};
