//! Router tests against the in-memory store
//!
//! Run with: cargo test -p jobflow-server --test api_test

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use jobflow_engine::{ExecutorRegistry, InMemoryWorkflowStore, WorkflowStore};
use jobflow_executors::EchoExecutor;
use jobflow_server::config::ServerConfig;
use jobflow_server::{build_app, build_runner};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
    let mut registry = ExecutorRegistry::new();
    registry.register(EchoExecutor);

    let config = ServerConfig {
        step_delay: Duration::ZERO,
        ..ServerConfig::default()
    };
    let runner = build_runner(store, Arc::new(registry), &config);
    build_app(runner, &config, "memory")
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

async fn create_task(app: &Router, name: &str, task_type: &str, config: Value) -> String {
    let (status, task) = post(
        app,
        "/v1/tasks",
        json!({"name": name, "task_type": task_type, "config": config}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{task}");
    task["id"].as_str().unwrap().to_string()
}

async fn create_flow(app: &Router, steps: Value) -> String {
    let (status, flow) = post(app, "/v1/flows", json!({"name": "flow", "tasks": steps})).await;
    assert_eq!(status, StatusCode::CREATED, "{flow}");
    flow["id"].as_str().unwrap().to_string()
}

async fn create_job(app: &Router, flow_id: &str) -> Value {
    let (status, job) = post(
        app,
        "/v1/jobs",
        json!({"flow_id": flow_id, "name": "job", "created_by": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{job}");
    job
}

/// Poll until the job leaves `running`/`pending` or the wait runs out
async fn wait_for_status(app: &Router, job_id: &str, expected: &str) -> Value {
    for _ in 0..100 {
        let (_, job) = get(app, &format!("/v1/jobs/{job_id}")).await;
        if job["status"] == expected {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} never reached {expected}");
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(&app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
}

#[tokio::test]
async fn test_list_executors() {
    let (status, body) = get(&app(), "/v1/executors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["name"], "echo");
}

#[tokio::test]
async fn test_operator_lifecycle() {
    let app = app();
    let review = create_task(&app, "review", "manual", json!({})).await;
    let approve = create_task(&app, "approve", "approval", json!({})).await;
    let flow_id = create_flow(
        &app,
        json!([{"task_id": review}, {"task_id": approve, "is_optional": true}]),
    )
    .await;

    let job = create_job(&app, &flow_id).await;
    let job_id = job["id"].as_str().unwrap();
    assert_eq!(job["status"], "pending");
    assert_eq!(job["tasks"].as_array().unwrap().len(), 2);
    let first = job["tasks"][0]["id"].as_str().unwrap();
    let second = job["tasks"][1]["id"].as_str().unwrap();

    let (status, started) = post(&app, &format!("/v1/jobs/{job_id}/start"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["current_task_seq"], 1);

    let (status, task) = post(
        &app,
        &format!("/v1/job-tasks/{first}/start"),
        json!({"executor_id": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "running");
    assert_eq!(task["executor_id"], 5);

    let (status, task) = post(
        &app,
        &format!("/v1/job-tasks/{first}/complete"),
        json!({"result": {"approved": true}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["result"]["approved"], true);

    let (_, current) = get(&app, &format!("/v1/jobs/{job_id}/current-task")).await;
    assert_eq!(current["id"], second);

    let (status, task) = post(
        &app,
        &format!("/v1/job-tasks/{second}/skip"),
        json!({"operator_id": 9}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "skipped");
    assert_eq!(task["is_skipped"], true);

    let (_, job) = get(&app, &format!("/v1/jobs/{job_id}")).await;
    assert_eq!(job["status"], "completed");

    let (status, _) = get(&app, &format!("/v1/jobs/{job_id}/next-task")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, logs) = get(&app, &format!("/v1/job-tasks/{first}/logs")).await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = logs["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["start", "complete"]);
}

#[tokio::test]
async fn test_skipping_required_task_is_conflict() {
    let app = app();
    let review = create_task(&app, "review", "manual", json!({})).await;
    let flow_id = create_flow(&app, json!([{"task_id": review}])).await;
    let job = create_job(&app, &flow_id).await;
    let first = job["tasks"][0]["id"].as_str().unwrap();

    let (status, body) = post(
        &app,
        &format!("/v1/job-tasks/{first}/skip"),
        json!({"operator_id": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "precondition");

    let (_, task) = get(&app, &format!("/v1/job-tasks/{first}")).await;
    assert_eq!(task["status"], "pending");
}

#[tokio::test]
async fn test_rollback_reopens_earlier_step() {
    let app = app();
    let a = create_task(&app, "a", "manual", json!({})).await;
    let b = create_task(&app, "b", "manual", json!({})).await;
    let flow_id = create_flow(&app, json!([{"task_id": a}, {"task_id": b}])).await;
    let job = create_job(&app, &flow_id).await;
    let job_id = job["id"].as_str().unwrap();
    let first = job["tasks"][0]["id"].as_str().unwrap();
    let second = job["tasks"][1]["id"].as_str().unwrap();

    post(&app, &format!("/v1/jobs/{job_id}/start"), json!({})).await;
    post(&app, &format!("/v1/job-tasks/{first}/start"), json!({})).await;
    post(&app, &format!("/v1/job-tasks/{first}/complete"), json!({})).await;

    let (status, body) = post(
        &app,
        &format!("/v1/job-tasks/{second}/rollback"),
        json!({"operator_id": 2, "target_sequence": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, job) = post(
        &app,
        &format!("/v1/job-tasks/{second}/rollback"),
        json!({"operator_id": 2, "target_sequence": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "running");
    assert_eq!(job["current_task_seq"], 1);

    let (_, task) = get(&app, &format!("/v1/job-tasks/{first}")).await;
    assert_eq!(task["status"], "pending");
    assert!(task["result"].is_null());
}

#[tokio::test]
async fn test_auto_execute_runs_to_completion() {
    let app = app();
    let greet = create_task(
        &app,
        "greet",
        "automated",
        json!({"executor": "echo", "greeting": "hello"}),
    )
    .await;
    let count = create_task(
        &app,
        "count",
        "automated",
        json!({"executor": "echo", "count": 3}),
    )
    .await;
    let flow_id = create_flow(&app, json!([{"task_id": greet}, {"task_id": count}])).await;
    let job = create_job(&app, &flow_id).await;
    let job_id = job["id"].as_str().unwrap();

    let (status, run) = post(&app, &format!("/v1/jobs/{job_id}/auto-execute"), json!({})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(run["job_id"], job_id);

    wait_for_status(&app, job_id, "completed").await;

    let (status, ctx) = get(&app, &format!("/v1/jobs/{job_id}/context")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctx["context"]["greeting"], "hello");
    assert_eq!(ctx["context"]["count"], "3");

    let (status, body) = post(&app, &format!("/v1/jobs/{job_id}/auto-execute"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn test_auto_execute_pauses_at_manual_step_until_resumed() {
    let app = app();
    let greet = create_task(&app, "greet", "automated", json!({"executor": "echo", "x": "1"})).await;
    let review = create_task(&app, "review", "manual", json!({})).await;
    let flow_id = create_flow(&app, json!([{"task_id": greet}, {"task_id": review}])).await;
    let job = create_job(&app, &flow_id).await;
    let job_id = job["id"].as_str().unwrap();
    let review_task = job["tasks"][1]["id"].as_str().unwrap();

    post(&app, &format!("/v1/jobs/{job_id}/auto-execute"), json!({})).await;

    let mut paused = false;
    for _ in 0..100 {
        let (_, task) = get(&app, &format!("/v1/job-tasks/{}", job["tasks"][0]["id"].as_str().unwrap())).await;
        if task["status"] == "completed" {
            paused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(paused);

    let (_, review) = get(&app, &format!("/v1/job-tasks/{review_task}")).await;
    assert_eq!(review["status"], "pending");

    post(&app, &format!("/v1/job-tasks/{review_task}/start"), json!({"executor_id": 4})).await;
    post(&app, &format!("/v1/job-tasks/{review_task}/complete"), json!({})).await;
    wait_for_status(&app, job_id, "completed").await;

    let (status, _) = post(&app, &format!("/v1/jobs/{job_id}/resume"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_execute_single_task() {
    let app = app();
    let greet = create_task(&app, "greet", "automated", json!({"executor": "echo", "x": "1"})).await;
    let flow_id = create_flow(&app, json!([{"task_id": greet}])).await;
    let job = create_job(&app, &flow_id).await;
    let job_id = job["id"].as_str().unwrap();
    let first = job["tasks"][0]["id"].as_str().unwrap();

    post(&app, &format!("/v1/jobs/{job_id}/start"), json!({})).await;
    let (status, run) = post(&app, &format!("/v1/job-tasks/{first}/execute"), json!({})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(run["job_task_id"], first);

    wait_for_status(&app, job_id, "completed").await;
}

#[tokio::test]
async fn test_unknown_executor_fails_job() {
    let app = app();
    let broken = create_task(&app, "broken", "automated", json!({"executor": "nope"})).await;
    let flow_id = create_flow(&app, json!([{"task_id": broken}])).await;
    let job = create_job(&app, &flow_id).await;
    let job_id = job["id"].as_str().unwrap();

    post(&app, &format!("/v1/jobs/{job_id}/auto-execute"), json!({})).await;
    let job = wait_for_status(&app, job_id, "failed").await;
    assert_eq!(job["tasks"][0]["error_message"], "Executor not found: nope");
}

#[tokio::test]
async fn test_cancel_without_run_cancels_job() {
    let app = app();
    let review = create_task(&app, "review", "manual", json!({})).await;
    let flow_id = create_flow(&app, json!([{"task_id": review}])).await;
    let job = create_job(&app, &flow_id).await;
    let job_id = job["id"].as_str().unwrap();

    let (status, body) = post(&app, &format!("/v1/jobs/{job_id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["run_cancelled"], false);

    let (status, _) = post(&app, &format!("/v1/jobs/{job_id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let first = job["tasks"][0]["id"].as_str().unwrap();
    let (status, body) = post(
        &app,
        &format!("/v1/job-tasks/{first}/start"),
        json!({"executor_id": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    let (_, job) = get(&app, &format!("/v1/jobs/{job_id}")).await;
    assert_eq!(job["status"], "cancelled");
}

#[tokio::test]
async fn test_context_roundtrip() {
    let app = app();
    let review = create_task(&app, "review", "manual", json!({})).await;
    let flow_id = create_flow(&app, json!([{"task_id": review}])).await;
    let job = create_job(&app, &flow_id).await;
    let job_id = job["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/v1/jobs/{job_id}/context"),
        Some(json!({"video_url": "https://example.com/v", "retries": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["context"]["retries"], "2");

    send(
        &app,
        Method::PUT,
        &format!("/v1/jobs/{job_id}/context"),
        Some(json!({"retries": "3"})),
    )
    .await;
    let (_, body) = get(&app, &format!("/v1/jobs/{job_id}/context")).await;
    assert_eq!(body["context"]["retries"], "3");
    assert_eq!(body["context"]["video_url"], "https://example.com/v");

    let missing = uuid::Uuid::now_v7();
    let (status, _) = get(&app, &format!("/v1/jobs/{missing}/context")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_catalog_rules() {
    let app = app();
    let (status, _) = post(&app, "/v1/tasks", json!({"name": " ", "task_type": "manual"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let review = create_task(&app, "review", "manual", json!({})).await;
    let (status, flow) = post(
        &app,
        "/v1/flows",
        json!({"name": "ids", "task_ids": [review]}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(flow["tasks"][0]["sequence"], 1);
    let flow_id = flow["id"].as_str().unwrap();

    let (status, _) = send(&app, Method::DELETE, &format!("/v1/tasks/{review}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    create_job(&app, flow_id).await;

    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/v1/flows/{flow_id}"),
        Some(json!({"name": "renamed"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, flow) = send(
        &app,
        Method::PATCH,
        &format!("/v1/flows/{flow_id}"),
        Some(json!({"is_active": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(flow["is_active"], false);

    let (status, body) = post(
        &app,
        "/v1/jobs",
        json!({"flow_id": flow_id, "name": "late"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn test_list_jobs_paging_and_filter() {
    let app = app();
    let review = create_task(&app, "review", "manual", json!({})).await;
    let flow_id = create_flow(&app, json!([{"task_id": review}])).await;
    for _ in 0..3 {
        create_job(&app, &flow_id).await;
    }

    let (_, page) = get(&app, "/v1/jobs?limit=2").await;
    assert_eq!(page["data"].as_array().unwrap().len(), 2);

    let (_, page) = get(&app, "/v1/jobs?limit=2&offset=2").await;
    assert_eq!(page["data"].as_array().unwrap().len(), 1);

    let (_, page) = get(&app, "/v1/jobs?status=running").await;
    assert!(page["data"].as_array().unwrap().is_empty());

    let (_, page) = get(&app, &format!("/v1/jobs?flow_id={flow_id}&status=pending")).await;
    assert_eq!(page["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let missing = uuid::Uuid::now_v7();
    let (status, body) = get(&app(), &format!("/v1/jobs/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}
