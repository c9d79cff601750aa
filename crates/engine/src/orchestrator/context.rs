//! Moving data between the job context and executors

use serde_json::Value;

use crate::executor::TaskInput;
use crate::model::{JobContext, TaskConfig};

/// Build executor input from the job context and the task configuration.
///
/// Every context entry is copied as a string. Configuration entries only
/// fill keys the context does not already have, so earlier steps can
/// override static defaults.
pub fn merge_input(job_context: &JobContext, config: &TaskConfig) -> TaskInput {
    let mut input: TaskInput = job_context
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    for (key, value) in config.to_map() {
        input.entry(key).or_insert(value);
    }
    input
}

/// Text form of a result value as stored in the job context.
///
/// Strings are stored verbatim, numbers and booleans in their plain
/// textual form, anything else (null, arrays, objects) as compact JSON.
pub fn context_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_wins_over_config() {
        let mut ctx = JobContext::new();
        ctx.insert("language".into(), "de".into());
        ctx.insert("x".into(), "1".into());
        let config = TaskConfig::for_executor("echo")
            .with_param("language", "en")
            .with_param("max_tokens", 512);

        let input = merge_input(&ctx, &config);

        assert_eq!(input.get("language"), Some(&json!("de")));
        assert_eq!(input.get("x"), Some(&json!("1")));
        assert_eq!(input.get("max_tokens"), Some(&json!(512)));
        assert_eq!(input.get("executor"), Some(&json!("echo")));
    }

    #[test]
    fn test_context_can_shadow_executor_key() {
        let mut ctx = JobContext::new();
        ctx.insert("executor".into(), "from-context".into());
        let input = merge_input(&ctx, &TaskConfig::for_executor("echo"));
        assert_eq!(input.get("executor"), Some(&json!("from-context")));
    }

    #[test]
    fn test_empty_inputs() {
        let input = merge_input(&JobContext::new(), &TaskConfig::default());
        assert!(input.is_empty());
    }

    #[test]
    fn test_context_value_forms() {
        assert_eq!(context_value(&json!("plain")), "plain");
        assert_eq!(context_value(&json!(42)), "42");
        assert_eq!(context_value(&json!(-1.5)), "-1.5");
        assert_eq!(context_value(&json!(true)), "true");
        assert_eq!(context_value(&json!(null)), "null");
        assert_eq!(context_value(&json!(["a", 1])), r#"["a",1]"#);
        assert_eq!(context_value(&json!({"k": "v"})), r#"{"k":"v"}"#);
    }
}
