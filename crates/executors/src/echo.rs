// Echo executor
//
// Returns its input so a flow can copy configured values into the job context.

use async_trait::async_trait;
use jobflow_engine::model::{JobContext, TaskResult};
use jobflow_engine::{ExecutionContext, Executor, ExecutorError, TaskInput};

pub struct EchoExecutor;

#[async_trait]
impl Executor for EchoExecutor {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Returns its input parameters unchanged"
    }

    async fn execute(
        &self,
        _ctx: &ExecutionContext,
        mut input: TaskInput,
        _job_context: &JobContext,
    ) -> Result<TaskResult, ExecutorError> {
        input.remove("executor");
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::execution_context;
    use serde_json::json;

    #[tokio::test]
    async fn test_echo_drops_executor_key() {
        let input: TaskInput = serde_json::from_value(json!({
            "executor": "echo",
            "greeting": "hello",
            "count": 3
        }))
        .unwrap();

        let result = EchoExecutor
            .execute(&execution_context("echo"), input, &JobContext::new())
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.get("greeting"), Some(&json!("hello")));
        assert_eq!(result.get("count"), Some(&json!(3)));
    }
}
