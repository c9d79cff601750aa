//! Executor registry
//!
//! Maps executor names to implementations. Built once during startup,
//! then shared read-only behind an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ErrorKind;

use super::Executor;

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No executor registered under the name
    #[error("executor not found: {0}")]
    ExecutorNotFound(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::NotFound
    }
}

/// Lookup from executor name to executor
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its own name, replacing any previous one
    pub fn register(&mut self, executor: impl Executor) {
        self.register_arc(Arc::new(executor));
    }

    /// Register an already shared executor
    pub fn register_arc(&mut self, executor: Arc<dyn Executor>) {
        let name = executor.name().to_string();
        if self.executors.insert(name.clone(), executor).is_some() {
            tracing::warn!(executor = %name, "replaced previously registered executor");
        }
    }

    /// Look up an executor by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn Executor>, RegistryError> {
        self.executors
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ExecutorNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered executors, sorted by name
    pub fn list(&self) -> Vec<Arc<dyn Executor>> {
        let mut all: Vec<Arc<dyn Executor>> = self.executors.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("executors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutionContext, ExecutorError, TaskInput};
    use crate::model::{JobContext, TaskResult};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Executor for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(
            &self,
            _ctx: &ExecutionContext,
            _input: TaskInput,
            _job_context: &JobContext,
        ) -> Result<TaskResult, ExecutorError> {
            Ok(TaskResult::new())
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ExecutorRegistry::new();
        assert!(registry.is_empty());

        registry.register(Named("b"));
        registry.register(Named("a"));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));
        assert_eq!(registry.get("b").unwrap().name(), "b");
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_unknown_executor() {
        let registry = ExecutorRegistry::new();
        let err = registry.get("nope").err().unwrap();
        assert!(matches!(err, RegistryError::ExecutorNotFound(ref n) if n == "nope"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_register_same_name_replaces() {
        let mut registry = ExecutorRegistry::new();
        registry.register(Named("echo"));
        registry.register(Named("echo"));
        assert_eq!(registry.len(), 1);
    }
}
