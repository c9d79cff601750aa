// Transcript analysis executor backed by the BigModel chat completion API
//
// Produces four Markdown sections (summary, mindmap, key_points, insights)
// from the `transcript` context entry. Without an API key every section is
// sample content, so flows run end to end offline.

mod prompts;
mod types;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use jobflow_engine::model::{JobContext, TaskResult};
use jobflow_engine::{ExecutionContext, Executor, ExecutorError, TaskInput};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

pub use prompts::{detect_topic, Section};
use types::{ChatMessage, ChatRequest, ChatResponse};

use crate::config::ExecutorsConfig;

/// Transcripts longer than this many characters are truncated
const MAX_TRANSCRIPT_CHARS: usize = 10_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct BigModelAnalysisExecutor {
    client: Client,
    api_key: Option<String>,
    api_url: String,
    model: String,
}

impl BigModelAnalysisExecutor {
    pub fn new(config: &ExecutorsConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client, using defaults");
                Client::new()
            });
        Self {
            client,
            api_key: config.bigmodel_api_key.clone(),
            api_url: config.bigmodel_api_url.clone(),
            model: config.bigmodel_model.clone(),
        }
    }

    async fn generate(&self, section: Section, transcript: &str) -> Result<String> {
        let Some(api_key) = &self.api_key else {
            return Ok(section.sample(detect_topic(transcript)));
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(section.prompt(transcript))],
            temperature: Some(0.7),
            top_p: Some(0.9),
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send BigModel request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "BigModel API request failed with status {}: {}",
                status,
                error_text
            );
        }

        let response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse BigModel response")?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No choices in BigModel response"))?;

        debug!(
            section = section.key(),
            model = %response.model,
            total_tokens = response.usage.as_ref().map(|u| u.total_tokens),
            finish_reason = ?choice.finish_reason,
            "generated section"
        );
        Ok(choice.message.content)
    }
}

#[async_trait]
impl Executor for BigModelAnalysisExecutor {
    fn name(&self) -> &str {
        "bigmodel_analysis"
    }

    fn description(&self) -> &str {
        "Summarises a transcript into summary, mind map, key points and insights"
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        input: TaskInput,
        job_context: &JobContext,
    ) -> Result<TaskResult, ExecutorError> {
        let transcript = job_context
            .get("transcript")
            .filter(|t| !t.is_empty())
            .map(String::as_str)
            .or_else(|| input.get("transcript").and_then(Value::as_str))
            .ok_or_else(|| ExecutorError::missing_input("transcript"))?;

        let transcript = truncate(transcript, MAX_TRANSCRIPT_CHARS);
        info!(
            chars = transcript.chars().count(),
            sample = self.api_key.is_none(),
            "analysing transcript"
        );

        let mut result = TaskResult::new();
        for section in Section::ALL {
            let generated = tokio::select! {
                biased;
                _ = ctx.cancellation_token().cancelled() => {
                    return Err(ExecutorError::new("analysis cancelled").with_type("CANCELLED"));
                }
                generated = self.generate(section, &transcript) => generated,
            };
            let content = generated.map_err(|e| {
                ExecutorError::new(format!("failed to generate {}: {e:#}", section.key()))
                    .with_type("API_ERROR")
            })?;
            result.insert(section.key().to_string(), Value::String(content));
        }
        Ok(result)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::execution_context;
    use serde_json::json;

    fn offline() -> BigModelAnalysisExecutor {
        BigModelAnalysisExecutor::new(&ExecutorsConfig::default())
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
    }

    #[tokio::test]
    async fn test_sample_analysis_without_key() {
        let mut job_context = JobContext::new();
        job_context.insert(
            "transcript".into(),
            "An introduction to deep learning and its uses".into(),
        );

        let result = offline()
            .execute(
                &execution_context("bigmodel_analysis"),
                TaskInput::new(),
                &job_context,
            )
            .await
            .unwrap();

        assert_eq!(result.len(), 4);
        for key in ["summary", "mindmap", "key_points", "insights"] {
            let text = result[key].as_str().unwrap();
            assert!(text.contains("deep learning"), "{key}: {text}");
        }
    }

    #[tokio::test]
    async fn test_transcript_from_input_when_context_lacks_it() {
        let mut input = TaskInput::new();
        input.insert("transcript".into(), json!("notes on data science"));

        let result = offline()
            .execute(
                &execution_context("bigmodel_analysis"),
                input,
                &JobContext::new(),
            )
            .await
            .unwrap();
        assert!(result["summary"].as_str().unwrap().contains("data science"));
    }

    #[tokio::test]
    async fn test_missing_transcript() {
        let err = offline()
            .execute(
                &execution_context("bigmodel_analysis"),
                TaskInput::new(),
                &JobContext::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_type.as_deref(), Some("MISSING_INPUT"));
    }

    #[tokio::test]
    async fn test_api_failure_is_reported() {
        let config = ExecutorsConfig {
            bigmodel_api_url: "http://127.0.0.1:9/chat/completions".into(),
            ..ExecutorsConfig::default()
        }
        .with_bigmodel_api_key("test-key");
        let mut input = TaskInput::new();
        input.insert("transcript".into(), json!("text"));

        let err = BigModelAnalysisExecutor::new(&config)
            .execute(&execution_context("bigmodel_analysis"), input, &JobContext::new())
            .await
            .unwrap_err();

        assert_eq!(err.error_type.as_deref(), Some("API_ERROR"));
        assert!(err.message.starts_with("failed to generate summary"));
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_any_request() {
        let ctx = execution_context("bigmodel_analysis");
        ctx.cancellation_token().cancel();
        let config = ExecutorsConfig {
            bigmodel_api_url: "http://127.0.0.1:9/chat/completions".into(),
            ..ExecutorsConfig::default()
        }
        .with_bigmodel_api_key("test-key");
        let mut input = TaskInput::new();
        input.insert("transcript".into(), json!("text"));

        let err = BigModelAnalysisExecutor::new(&config)
            .execute(&ctx, input, &JobContext::new())
            .await
            .unwrap_err();

        assert_eq!(err.error_type.as_deref(), Some("CANCELLED"));
    }
}
