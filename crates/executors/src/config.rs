// Executor configuration
//
// Read from the environment by the server; tests build it directly.

use std::path::PathBuf;

pub const DEFAULT_BIGMODEL_API_URL: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";
pub const DEFAULT_BIGMODEL_MODEL: &str = "glm-4-air";
pub const DEFAULT_REPORTS_DIR: &str = "./reports";

/// Settings for the built-in executors
#[derive(Debug, Clone)]
pub struct ExecutorsConfig {
    /// Chat completion API key; without it the analysis executor returns sample content
    pub bigmodel_api_key: Option<String>,
    pub bigmodel_api_url: String,
    pub bigmodel_model: String,
    /// Directory the report executor writes into
    pub reports_dir: PathBuf,
}

impl Default for ExecutorsConfig {
    fn default() -> Self {
        Self {
            bigmodel_api_key: None,
            bigmodel_api_url: DEFAULT_BIGMODEL_API_URL.to_string(),
            bigmodel_model: DEFAULT_BIGMODEL_MODEL.to_string(),
            reports_dir: PathBuf::from(DEFAULT_REPORTS_DIR),
        }
    }
}

impl ExecutorsConfig {
    /// Load from environment variables
    ///
    /// - `BIGMODEL_API_KEY`: API key (empty or placeholder values count as unset)
    /// - `BIGMODEL_API_URL`: chat completion endpoint
    /// - `BIGMODEL_MODEL`: model name
    /// - `REPORTS_DIR`: report output directory
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bigmodel_api_key: std::env::var("BIGMODEL_API_KEY")
                .ok()
                .filter(|key| is_real_key(key)),
            bigmodel_api_url: std::env::var("BIGMODEL_API_URL")
                .unwrap_or(defaults.bigmodel_api_url),
            bigmodel_model: std::env::var("BIGMODEL_MODEL").unwrap_or(defaults.bigmodel_model),
            reports_dir: std::env::var("REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.reports_dir),
        }
    }

    pub fn with_bigmodel_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.bigmodel_api_key = is_real_key(&api_key).then_some(api_key);
        self
    }

    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = dir.into();
        self
    }
}

fn is_real_key(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && key != "your_api_key_here"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_key_is_ignored() {
        let config = ExecutorsConfig::default().with_bigmodel_api_key("your_api_key_here");
        assert!(config.bigmodel_api_key.is_none());

        let config = ExecutorsConfig::default().with_bigmodel_api_key("  ");
        assert!(config.bigmodel_api_key.is_none());

        let config = ExecutorsConfig::default().with_bigmodel_api_key("sk-123");
        assert_eq!(config.bigmodel_api_key.as_deref(), Some("sk-123"));
    }

    #[test]
    fn test_defaults() {
        let config = ExecutorsConfig::default();
        assert_eq!(config.bigmodel_model, "glm-4-air");
        assert_eq!(config.reports_dir, PathBuf::from("./reports"));
    }
}
