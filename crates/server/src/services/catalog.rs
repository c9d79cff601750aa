// Catalog service: task definitions and flows
//
// Flows are frozen once a job references them. Only activation can change
// after that, and neither flows nor the tasks they use can be deleted.

use std::sync::Arc;

use jobflow_engine::model::{Flow, FlowTask, Task};
use jobflow_engine::{Pagination, WorkflowStore};
use tracing::info;
use uuid::Uuid;

use super::error::{ServiceError, ServiceResult};
use crate::api::flows::{
    AddFlowTaskRequest, CreateFlowRequest, FlowStepRequest, FlowWithTasks, UpdateFlowRequest,
};
use crate::api::tasks::{CreateTaskRequest, UpdateTaskRequest};

pub struct CatalogService {
    store: Arc<dyn WorkflowStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    pub async fn create_task(&self, req: CreateTaskRequest) -> ServiceResult<Task> {
        let name = required_name(&req.name)?;

        let mut task = Task::new(name, req.task_type).with_config(req.config);
        if let Some(description) = req.description {
            task = task.with_description(description);
        }
        if let Some(is_active) = req.is_active {
            task.is_active = is_active;
        }

        self.store.create_task(&task).await?;
        info!(task_id = %task.id, task_type = %task.task_type, "created task");
        Ok(task)
    }

    pub async fn get_task(&self, task_id: Uuid) -> ServiceResult<Task> {
        Ok(self.store.get_task(task_id).await?)
    }

    pub async fn list_tasks(&self, pagination: Pagination) -> ServiceResult<Vec<Task>> {
        Ok(self.store.list_tasks(pagination).await?)
    }

    pub async fn update_task(&self, task_id: Uuid, req: UpdateTaskRequest) -> ServiceResult<Task> {
        let mut task = self.store.get_task(task_id).await?;

        if let Some(name) = req.name {
            task.name = required_name(&name)?;
        }
        if let Some(description) = req.description {
            task.description = description;
        }
        if let Some(task_type) = req.task_type {
            task.task_type = task_type;
        }
        if let Some(config) = req.config {
            task.config = config;
        }
        if let Some(is_active) = req.is_active {
            task.is_active = is_active;
        }

        self.store.update_task(&task).await?;
        Ok(task)
    }

    pub async fn delete_task(&self, task_id: Uuid) -> ServiceResult<()> {
        let references = self.store.count_flow_tasks_for_task(task_id).await?;
        if references > 0 {
            return Err(ServiceError::InUse(format!(
                "task {task_id} is used by {references} flow step(s)"
            )));
        }
        self.store.delete_task(task_id).await?;
        info!(%task_id, "deleted task");
        Ok(())
    }

    // ========================================================================
    // Flows
    // ========================================================================

    pub async fn create_flow(&self, req: CreateFlowRequest) -> ServiceResult<FlowWithTasks> {
        let name = required_name(&req.name)?;

        let steps: Vec<FlowStepRequest> = match (req.task_ids.is_empty(), req.tasks.is_empty()) {
            (false, false) => {
                return Err(ServiceError::validation(
                    "give either task_ids or tasks, not both",
                ))
            }
            (false, true) => req
                .task_ids
                .into_iter()
                .map(FlowStepRequest::for_task)
                .collect(),
            (true, _) => req.tasks,
        };

        let mut flow = Flow::new(name, req.created_by);
        if let Some(description) = req.description {
            flow = flow.with_description(description);
        }
        if let Some(version) = req.version {
            flow = flow.with_version(version);
        }

        let tasks: Vec<FlowTask> = steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| step.into_flow_task(flow.id, i as i32 + 1))
            .collect();

        self.store.create_flow(&flow, &tasks).await?;
        info!(flow_id = %flow.id, steps = tasks.len(), "created flow");
        Ok(FlowWithTasks { flow, tasks })
    }

    pub async fn get_flow(&self, flow_id: Uuid) -> ServiceResult<FlowWithTasks> {
        let (flow, tasks) = self.store.get_flow_with_tasks(flow_id).await?;
        Ok(FlowWithTasks { flow, tasks })
    }

    pub async fn list_flows(&self, pagination: Pagination) -> ServiceResult<Vec<Flow>> {
        Ok(self.store.list_flows(pagination).await?)
    }

    pub async fn update_flow(&self, flow_id: Uuid, req: UpdateFlowRequest) -> ServiceResult<Flow> {
        let mut flow = self.store.get_flow(flow_id).await?;

        let changes_definition =
            req.name.is_some() || req.description.is_some() || req.version.is_some();
        if changes_definition {
            self.ensure_no_jobs(flow_id, "updated").await?;
        }

        if let Some(name) = req.name {
            flow.name = required_name(&name)?;
        }
        if let Some(description) = req.description {
            flow.description = description;
        }
        if let Some(version) = req.version {
            flow.version = version;
        }
        if let Some(is_active) = req.is_active {
            flow.is_active = is_active;
        }

        self.store.update_flow(&flow).await?;
        Ok(flow)
    }

    pub async fn delete_flow(&self, flow_id: Uuid) -> ServiceResult<()> {
        self.store.get_flow(flow_id).await?;
        self.ensure_no_jobs(flow_id, "deleted").await?;
        self.store.delete_flow(flow_id).await?;
        info!(%flow_id, "deleted flow");
        Ok(())
    }

    /// Append a step to a flow, or insert it at a free sequence
    pub async fn add_flow_task(
        &self,
        flow_id: Uuid,
        req: AddFlowTaskRequest,
    ) -> ServiceResult<FlowTask> {
        self.store.get_flow(flow_id).await?;
        self.ensure_no_jobs(flow_id, "changed").await?;

        let sequence = match req.sequence {
            Some(sequence) if sequence < 1 => {
                return Err(ServiceError::validation(format!(
                    "sequence must be positive, got {sequence}"
                )))
            }
            Some(sequence) => sequence,
            None => {
                let existing = self.store.list_flow_tasks(flow_id).await?;
                existing.last().map_or(1, |ft| ft.sequence + 1)
            }
        };

        let flow_task = req.step.into_flow_task(flow_id, sequence);
        self.store.create_flow_task(&flow_task).await?;
        info!(%flow_id, task_id = %flow_task.task_id, sequence, "added flow step");
        Ok(flow_task)
    }

    async fn ensure_no_jobs(&self, flow_id: Uuid, action: &str) -> ServiceResult<()> {
        let jobs = self.store.count_jobs_for_flow(flow_id).await?;
        if jobs > 0 {
            return Err(ServiceError::InUse(format!(
                "flow {flow_id} is used by {jobs} job(s) and cannot be {action}"
            )));
        }
        Ok(())
    }
}

fn required_name(name: &str) -> ServiceResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::validation("name must not be empty"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_engine::model::{TaskConfig, TaskType};
    use jobflow_engine::{InMemoryWorkflowStore, WorkflowEngine};

    fn service() -> (CatalogService, Arc<dyn WorkflowStore>) {
        let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
        (CatalogService::new(store.clone()), store)
    }

    fn task_request(name: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            name: name.to_string(),
            description: None,
            task_type: TaskType::Automated,
            config: TaskConfig::for_executor("echo"),
            is_active: None,
        }
    }

    fn flow_request(task_ids: Vec<Uuid>) -> CreateFlowRequest {
        CreateFlowRequest {
            name: "release".to_string(),
            description: None,
            version: None,
            created_by: 7,
            task_ids,
            tasks: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_flow_numbers_steps_in_order() {
        let (service, _) = service();
        let a = service.create_task(task_request("a")).await.unwrap();
        let b = service.create_task(task_request("b")).await.unwrap();

        let flow = service
            .create_flow(flow_request(vec![b.id, a.id]))
            .await
            .unwrap();

        let steps: Vec<(Uuid, i32)> = flow.tasks.iter().map(|t| (t.task_id, t.sequence)).collect();
        assert_eq!(steps, vec![(b.id, 1), (a.id, 2)]);
        assert!(flow.tasks.iter().all(|t| !t.is_optional && t.allow_rollback));
        assert_eq!(flow.flow.version, "1.0");
    }

    #[tokio::test]
    async fn test_create_flow_rejects_both_step_forms() {
        let (service, _) = service();
        let a = service.create_task(task_request("a")).await.unwrap();
        let mut req = flow_request(vec![a.id]);
        req.tasks = vec![FlowStepRequest::for_task(a.id)];

        let err = service.create_flow(req).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_create_task_requires_name() {
        let (service, _) = service();
        let err = service.create_task(task_request("  ")).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_referenced_task_cannot_be_deleted() {
        let (service, _) = service();
        let a = service.create_task(task_request("a")).await.unwrap();
        service.create_flow(flow_request(vec![a.id])).await.unwrap();

        let err = service.delete_task(a.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InUse(_)));
    }

    #[tokio::test]
    async fn test_flow_with_jobs_only_allows_activation_changes() {
        let (service, store) = service();
        let a = service.create_task(task_request("a")).await.unwrap();
        let flow = service.create_flow(flow_request(vec![a.id])).await.unwrap();
        WorkflowEngine::new(store)
            .create_job(flow.flow.id, "job", 7)
            .await
            .unwrap();

        let rename = UpdateFlowRequest {
            name: Some("renamed".into()),
            ..Default::default()
        };
        let err = service.update_flow(flow.flow.id, rename).await.unwrap_err();
        assert!(matches!(err, ServiceError::InUse(_)));

        let deactivate = UpdateFlowRequest {
            is_active: Some(false),
            ..Default::default()
        };
        let updated = service.update_flow(flow.flow.id, deactivate).await.unwrap();
        assert!(!updated.is_active);

        assert!(matches!(
            service.delete_flow(flow.flow.id).await.unwrap_err(),
            ServiceError::InUse(_)
        ));
    }

    #[tokio::test]
    async fn test_add_flow_task_appends_after_last_step() {
        let (service, _) = service();
        let a = service.create_task(task_request("a")).await.unwrap();
        let b = service.create_task(task_request("b")).await.unwrap();
        let flow = service.create_flow(flow_request(vec![a.id])).await.unwrap();

        let added = service
            .add_flow_task(
                flow.flow.id,
                AddFlowTaskRequest {
                    sequence: None,
                    step: FlowStepRequest {
                        is_optional: true,
                        ..FlowStepRequest::for_task(b.id)
                    },
                },
            )
            .await
            .unwrap();

        assert_eq!(added.sequence, 2);
        assert!(added.is_optional);

        let taken = service
            .add_flow_task(
                flow.flow.id,
                AddFlowTaskRequest {
                    sequence: Some(1),
                    step: FlowStepRequest::for_task(b.id),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(taken.kind(), jobflow_engine::ErrorKind::Precondition);
    }
}
