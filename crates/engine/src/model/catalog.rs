//! Catalog types: flows, their ordered steps, and reusable task definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Reusable, ordered template of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Flow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub version: String,
    pub is_active: bool,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flow {
    /// Build a new active flow with a fresh id
    pub fn new(name: impl Into<String>, created_by: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: String::new(),
            version: "1.0".to_string(),
            is_active: true,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// One ordered step of a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct FlowTask {
    pub id: Uuid,
    pub flow_id: Uuid,
    pub task_id: Uuid,
    /// Position within the flow, starting at 1
    pub sequence: i32,
    /// Operators may skip this step
    pub is_optional: bool,
    /// Operators may send the job back to an earlier step from here
    pub allow_rollback: bool,
    /// Reserved for conditional branching, not evaluated by the engine
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub condition_config: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowTask {
    /// New step with the catalog defaults: required, rollback allowed
    pub fn new(flow_id: Uuid, task_id: Uuid, sequence: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            flow_id,
            task_id,
            sequence,
            is_optional: false,
            allow_rollback: true,
            condition_config: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn optional(mut self, is_optional: bool) -> Self {
        self.is_optional = is_optional;
        self
    }

    pub fn rollback(mut self, allow_rollback: bool) -> Self {
        self.allow_rollback = allow_rollback;
        self
    }
}

/// How a task gets advanced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Completed by an operator
    Manual,
    /// Run by a registered executor
    Automated,
    /// Signed off by an operator
    Approval,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Automated => write!(f, "automated"),
            Self::Approval => write!(f, "approval"),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "automated" => Ok(Self::Automated),
            "approval" => Ok(Self::Approval),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// Static task configuration.
///
/// `executor` names the executor for automated tasks. Every other key is
/// kept as-is in `params` and handed to the executor as a default input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TaskConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub params: Map<String, Value>,
}

impl TaskConfig {
    pub fn for_executor(executor: impl Into<String>) -> Self {
        Self {
            executor: Some(executor.into()),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Flatten back into a single map, `executor` included
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.params.clone();
        if let Some(executor) = &self.executor {
            map.insert("executor".to_string(), Value::String(executor.clone()));
        }
        map
    }
}

/// Reusable step definition referenced by flow tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub task_type: TaskType,
    pub config: TaskConfig,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(name: impl Into<String>, task_type: TaskType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: String::new(),
            task_type,
            config: TaskConfig::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Automated task bound to the named executor
    pub fn automated(name: impl Into<String>, executor: impl Into<String>) -> Self {
        let mut task = Self::new(name, TaskType::Automated);
        task.config = TaskConfig::for_executor(executor);
        task
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_config_roundtrips_unknown_keys() {
        let raw = json!({"executor": "echo", "prompt": "hi", "limit": 3});
        let config: TaskConfig = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(config.executor.as_deref(), Some("echo"));
        assert_eq!(config.params.get("prompt"), Some(&json!("hi")));
        assert_eq!(serde_json::to_value(&config).unwrap(), raw);
    }

    #[test]
    fn test_task_config_rejects_non_string_executor() {
        let raw = json!({"executor": 42});
        assert!(serde_json::from_value::<TaskConfig>(raw).is_err());
    }

    #[test]
    fn test_task_config_to_map_includes_executor() {
        let config = TaskConfig::for_executor("echo").with_param("x", "1");
        let map = config.to_map();
        assert_eq!(map.get("executor"), Some(&json!("echo")));
        assert_eq!(map.get("x"), Some(&json!("1")));
    }

    #[test]
    fn test_task_type_parse() {
        assert_eq!("approval".parse::<TaskType>().unwrap(), TaskType::Approval);
        assert!("robot".parse::<TaskType>().is_err());
        assert_eq!(TaskType::Automated.to_string(), "automated");
    }

    #[test]
    fn test_flow_task_defaults() {
        let ft = FlowTask::new(Uuid::now_v7(), Uuid::now_v7(), 1);
        assert!(!ft.is_optional);
        assert!(ft.allow_rollback);
    }
}
