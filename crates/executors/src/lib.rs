// Built-in executors
//
// - echo: returns its input
// - youtube_asr: fetches a video transcript
// - bigmodel_analysis: analyses a transcript with an LLM
// - html_report: renders the analysis into an HTML file

pub mod bigmodel;
pub mod config;
pub mod echo;
pub mod html_report;
pub mod youtube_asr;

use jobflow_engine::ExecutorRegistry;

pub use bigmodel::BigModelAnalysisExecutor;
pub use config::ExecutorsConfig;
pub use echo::EchoExecutor;
pub use html_report::HtmlReportExecutor;
pub use youtube_asr::YoutubeAsrExecutor;

/// Register every built-in executor
pub fn register_builtins(registry: &mut ExecutorRegistry, config: &ExecutorsConfig) {
    registry.register(EchoExecutor);
    registry.register(YoutubeAsrExecutor::new());
    registry.register(BigModelAnalysisExecutor::new(config));
    registry.register(HtmlReportExecutor::new(config.reports_dir.clone()));
}

/// Registry holding the built-in executors
pub fn builtin_registry(config: &ExecutorsConfig) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    register_builtins(&mut registry, config);
    registry
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_names() {
        let registry = builtin_registry(&ExecutorsConfig::default());
        assert_eq!(
            registry.names(),
            vec!["bigmodel_analysis", "echo", "html_report", "youtube_asr"]
        );
    }
}
