// OpenAPI specification
//
// Served by the API server (Swagger UI) and printed by the export-openapi
// binary.

use jobflow_engine::model::{
    Flow, FlowTask, Job, JobStatus, JobTask, JobTaskLog, JobTaskStatus, JobWithTasks, LogAction,
    Task, TaskConfig, TaskType,
};
use utoipa::OpenApi;

use crate::api;
use crate::api::ListResponse;

/// OpenAPI documentation for the jobflow API
#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health,
        api::executors::list_executors,
        api::tasks::create_task,
        api::tasks::list_tasks,
        api::tasks::get_task,
        api::tasks::update_task,
        api::tasks::delete_task,
        api::flows::create_flow,
        api::flows::list_flows,
        api::flows::get_flow,
        api::flows::update_flow,
        api::flows::delete_flow,
        api::flows::add_flow_task,
        api::jobs::create_job,
        api::jobs::list_jobs,
        api::jobs::get_job,
        api::jobs::start_job,
        api::jobs::auto_execute_job,
        api::jobs::resume_job,
        api::jobs::cancel_job,
        api::jobs::get_current_task,
        api::jobs::get_next_task,
        api::jobs::get_job_context,
        api::jobs::update_job_context,
        api::job_tasks::get_job_task,
        api::job_tasks::start_task,
        api::job_tasks::complete_task,
        api::job_tasks::fail_task,
        api::job_tasks::skip_task,
        api::job_tasks::rollback_task,
        api::job_tasks::execute_task,
        api::job_tasks::list_logs,
    ),
    components(
        schemas(
            // Engine model
            Flow, FlowTask, Task, TaskConfig, TaskType,
            Job, JobStatus, JobTask, JobTaskStatus, JobWithTasks,
            JobTaskLog, LogAction,
            // Requests and responses
            api::ErrorResponse,
            api::common::OperatorRequest,
            api::health::HealthResponse,
            api::executors::ExecutorInfo,
            api::tasks::CreateTaskRequest, api::tasks::UpdateTaskRequest,
            api::flows::CreateFlowRequest, api::flows::FlowStepRequest,
            api::flows::UpdateFlowRequest, api::flows::AddFlowTaskRequest,
            api::flows::FlowWithTasks,
            api::jobs::CreateJobRequest, api::jobs::RunAccepted,
            api::jobs::CancelJobResponse, api::jobs::JobContextResponse,
            api::job_tasks::StartTaskRequest, api::job_tasks::CompleteTaskRequest,
            api::job_tasks::FailTaskRequest, api::job_tasks::RollbackTaskRequest,
            ListResponse<api::executors::ExecutorInfo>,
            ListResponse<Task>,
            ListResponse<Flow>,
            ListResponse<Job>,
            ListResponse<JobTaskLog>,
        )
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "executors", description = "Registered executors"),
        (name = "tasks", description = "Task definition management"),
        (name = "flows", description = "Flow management"),
        (name = "jobs", description = "Job lifecycle, runs and context"),
        (name = "job-tasks", description = "Operator actions on job tasks"),
    ),
    info(
        title = "Jobflow API",
        version = "0.1.0",
        description = "API for defining flows and running them as jobs",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI spec as a pretty-printed JSON string
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lists_job_routes() {
        let json = ApiDoc::to_json().unwrap();
        assert!(json.contains("/v1/jobs/{job_id}/auto-execute"));
        assert!(json.contains("/v1/job-tasks/{job_task_id}/rollback"));
    }
}
