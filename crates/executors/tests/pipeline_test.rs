//! Video analysis pipeline driven end to end by the orchestrator, offline
//!
//! Run with: cargo test -p jobflow-executors --test pipeline_test

use std::sync::Arc;
use std::time::Duration;

use jobflow_engine::prelude::*;
use jobflow_executors::{
    BigModelAnalysisExecutor, EchoExecutor, ExecutorsConfig, HtmlReportExecutor,
    YoutubeAsrExecutor,
};

#[tokio::test]
async fn test_transcript_analysis_report_pipeline() {
    let reports_dir =
        std::env::temp_dir().join(format!("jobflow-pipeline-{}", uuid::Uuid::now_v7()));
    let config = ExecutorsConfig::default().with_reports_dir(&reports_dir);

    let mut registry = ExecutorRegistry::new();
    registry.register(EchoExecutor);
    registry.register(YoutubeAsrExecutor::sample_only());
    registry.register(BigModelAnalysisExecutor::new(&config));
    registry.register(HtmlReportExecutor::new(config.reports_dir.clone()));

    let store = Arc::new(InMemoryWorkflowStore::new());
    let tasks = vec![
        Task::automated("set language", "echo")
            .with_config(TaskConfig::for_executor("echo").with_param("language", "en")),
        Task::automated("transcribe", "youtube_asr").with_config(
            TaskConfig::for_executor("youtube_asr")
                .with_param("video_url", "https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
        ),
        Task::automated("analyse", "bigmodel_analysis"),
        Task::automated("report", "html_report"),
    ];
    let flow = Flow::new("video analysis", 1);
    let mut flow_tasks = Vec::new();
    for (i, task) in tasks.iter().enumerate() {
        store.create_task(task).await.unwrap();
        flow_tasks.push(FlowTask::new(flow.id, task.id, i as i32 + 1));
    }
    store.create_flow(&flow, &flow_tasks).await.unwrap();

    let engine = WorkflowEngine::new(store.clone());
    let orchestrator = TaskOrchestrator::with_config(
        engine.clone(),
        Arc::new(registry),
        OrchestratorConfig::default().with_step_delay(Duration::ZERO),
    );
    let job = engine.create_job(flow.id, "analyse video", 1).await.unwrap();

    let outcome = orchestrator
        .auto_execute_job(job.job.id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::Completed { executed: 4 });
    let ctx = store.get_job_context(job.job.id).await.unwrap();
    assert_eq!(ctx.get("video_id").map(String::as_str), Some("dQw4w9WgXcQ"));
    assert_eq!(ctx.get("method").map(String::as_str), Some("sample"));
    assert!(ctx["summary"].contains("artificial intelligence"));

    let report_path = std::path::PathBuf::from(&ctx["report_path"]);
    let html = std::fs::read_to_string(&report_path).unwrap();
    assert!(html.contains("Mind Map"));
    assert!(html.contains("artificial intelligence"));

    std::fs::remove_dir_all(&reports_dir).ok();
}
