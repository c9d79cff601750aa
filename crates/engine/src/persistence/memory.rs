//! In-memory implementation of WorkflowStore for testing and dev mode

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::store::*;
use crate::model::{
    Flow, FlowTask, Job, JobContext, JobStatus, JobTask, JobTaskLog, JobTaskStatus, Task,
};

#[derive(Default)]
struct MemoryState {
    flows: HashMap<Uuid, Flow>,
    flow_tasks: HashMap<Uuid, FlowTask>,
    tasks: HashMap<Uuid, Task>,
    jobs: HashMap<Uuid, Job>,
    job_tasks: HashMap<Uuid, JobTask>,
    contexts: HashMap<Uuid, JobContext>,
    logs: Vec<JobTaskLog>,
}

impl MemoryState {
    fn check_flow_sequence_free(&self, flow_task: &FlowTask) -> Result<(), StoreError> {
        let taken = self
            .flow_tasks
            .values()
            .any(|ft| ft.flow_id == flow_task.flow_id && ft.sequence == flow_task.sequence);
        if taken {
            return Err(StoreError::Conflict(format!(
                "flow {} already has a step at sequence {}",
                flow_task.flow_id, flow_task.sequence
            )));
        }
        Ok(())
    }
}

/// In-memory implementation of WorkflowStore
///
/// All data lives behind a single lock, so multi-record writes are
/// atomic in the same way the PostgreSQL transactions are.
///
/// # Example
///
/// ```
/// use jobflow_engine::InMemoryWorkflowStore;
///
/// let store = InMemoryWorkflowStore::new();
/// assert_eq!(store.job_count(), 0);
/// ```
pub struct InMemoryWorkflowStore {
    state: RwLock<MemoryState>,
}

impl InMemoryWorkflowStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Get the number of jobs
    pub fn job_count(&self) -> usize {
        self.state.read().jobs.len()
    }

    /// Get the number of job task log entries
    pub fn log_count(&self) -> usize {
        self.state.read().logs.len()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        *self.state.write() = MemoryState::default();
    }
}

impl Default for InMemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

fn page<T>(mut items: Vec<T>, pagination: Pagination) -> Vec<T> {
    let offset = pagination.offset as usize;
    if offset >= items.len() {
        return vec![];
    }
    items.drain(..offset);
    items.truncate(pagination.limit.min(MAX_PAGE_LIMIT) as usize);
    items
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_flow(&self, flow: &Flow, tasks: &[FlowTask]) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.flows.contains_key(&flow.id) {
            return Err(StoreError::Conflict(format!("flow {} already exists", flow.id)));
        }
        let mut seen = std::collections::HashSet::new();
        for ft in tasks {
            if !state.tasks.contains_key(&ft.task_id) {
                return Err(StoreError::TaskNotFound(ft.task_id));
            }
            if !seen.insert(ft.sequence) {
                return Err(StoreError::Conflict(format!(
                    "duplicate sequence {} in flow {}",
                    ft.sequence, flow.id
                )));
            }
        }

        state.flows.insert(flow.id, flow.clone());
        for ft in tasks {
            state.flow_tasks.insert(ft.id, ft.clone());
        }
        Ok(())
    }

    async fn get_flow(&self, flow_id: Uuid) -> Result<Flow, StoreError> {
        self.state
            .read()
            .flows
            .get(&flow_id)
            .cloned()
            .ok_or(StoreError::FlowNotFound(flow_id))
    }

    async fn list_flows(&self, pagination: Pagination) -> Result<Vec<Flow>, StoreError> {
        let mut flows: Vec<Flow> = self.state.read().flows.values().cloned().collect();
        flows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(flows, pagination))
    }

    async fn update_flow(&self, flow: &Flow) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let stored = state
            .flows
            .get_mut(&flow.id)
            .ok_or(StoreError::FlowNotFound(flow.id))?;
        *stored = flow.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_flow(&self, flow_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state
            .flows
            .remove(&flow_id)
            .ok_or(StoreError::FlowNotFound(flow_id))?;
        state.flow_tasks.retain(|_, ft| ft.flow_id != flow_id);
        Ok(())
    }

    async fn count_jobs_for_flow(&self, flow_id: Uuid) -> Result<u64, StoreError> {
        let state = self.state.read();
        Ok(state.jobs.values().filter(|j| j.flow_id == flow_id).count() as u64)
    }

    async fn create_flow_task(&self, flow_task: &FlowTask) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if !state.flows.contains_key(&flow_task.flow_id) {
            return Err(StoreError::FlowNotFound(flow_task.flow_id));
        }
        if !state.tasks.contains_key(&flow_task.task_id) {
            return Err(StoreError::TaskNotFound(flow_task.task_id));
        }
        state.check_flow_sequence_free(flow_task)?;
        state.flow_tasks.insert(flow_task.id, flow_task.clone());
        Ok(())
    }

    async fn get_flow_task(&self, flow_task_id: Uuid) -> Result<FlowTask, StoreError> {
        self.state
            .read()
            .flow_tasks
            .get(&flow_task_id)
            .cloned()
            .ok_or(StoreError::FlowTaskNotFound(flow_task_id))
    }

    async fn list_flow_tasks(&self, flow_id: Uuid) -> Result<Vec<FlowTask>, StoreError> {
        let mut tasks: Vec<FlowTask> = self
            .state
            .read()
            .flow_tasks
            .values()
            .filter(|ft| ft.flow_id == flow_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|ft| ft.sequence);
        Ok(tasks)
    }

    async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.tasks.contains_key(&task.id) {
            return Err(StoreError::Conflict(format!("task {} already exists", task.id)));
        }
        state.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Task, StoreError> {
        self.state
            .read()
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or(StoreError::TaskNotFound(task_id))
    }

    async fn list_tasks(&self, pagination: Pagination) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self.state.read().tasks.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(tasks, pagination))
    }

    async fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let stored = state
            .tasks
            .get_mut(&task.id)
            .ok_or(StoreError::TaskNotFound(task.id))?;
        *stored = task.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_task(&self, task_id: Uuid) -> Result<(), StoreError> {
        self.state
            .write()
            .tasks
            .remove(&task_id)
            .map(|_| ())
            .ok_or(StoreError::TaskNotFound(task_id))
    }

    async fn count_flow_tasks_for_task(&self, task_id: Uuid) -> Result<u64, StoreError> {
        let state = self.state.read();
        Ok(state
            .flow_tasks
            .values()
            .filter(|ft| ft.task_id == task_id)
            .count() as u64)
    }

    async fn create_job(&self, job: &Job, tasks: &[JobTask]) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if !state.flows.contains_key(&job.flow_id) {
            return Err(StoreError::FlowNotFound(job.flow_id));
        }
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("job {} already exists", job.id)));
        }
        state.jobs.insert(job.id, job.clone());
        for jt in tasks {
            state.job_tasks.insert(jt.id, jt.clone());
        }
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Job, StoreError> {
        self.state
            .read()
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::JobNotFound(job_id))
    }

    async fn list_jobs(
        &self,
        filter: JobFilter,
        pagination: Pagination,
    ) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .state
            .read()
            .jobs
            .values()
            .filter(|j| filter.flow_id.map_or(true, |id| j.flow_id == id))
            .filter(|j| filter.status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(jobs, pagination))
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let stored = state
            .jobs
            .get_mut(&job.id)
            .ok_or(StoreError::JobNotFound(job.id))?;
        *stored = job.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let stored = state
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;
        stored.status = status;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn get_job_task(&self, job_task_id: Uuid) -> Result<JobTask, StoreError> {
        self.state
            .read()
            .job_tasks
            .get(&job_task_id)
            .cloned()
            .ok_or(StoreError::JobTaskNotFound(job_task_id))
    }

    async fn list_job_tasks(&self, job_id: Uuid) -> Result<Vec<JobTask>, StoreError> {
        let mut tasks: Vec<JobTask> = self
            .state
            .read()
            .job_tasks
            .values()
            .filter(|jt| jt.job_id == job_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|jt| jt.sequence);
        Ok(tasks)
    }

    async fn get_job_task_by_sequence(
        &self,
        job_id: Uuid,
        sequence: i32,
    ) -> Result<Option<JobTask>, StoreError> {
        Ok(self
            .state
            .read()
            .job_tasks
            .values()
            .find(|jt| jt.job_id == job_id && jt.sequence == sequence)
            .cloned())
    }

    async fn update_job_task(
        &self,
        job_task: &JobTask,
        expected: JobTaskStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let stored = state
            .job_tasks
            .get_mut(&job_task.id)
            .ok_or(StoreError::JobTaskNotFound(job_task.id))?;
        if stored.status != expected {
            return Err(StoreError::ConcurrencyConflict {
                id: job_task.id,
                expected,
                actual: stored.status,
            });
        }
        *stored = job_task.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn update_job_tasks(&self, job_tasks: &[JobTask]) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if let Some(missing) = job_tasks
            .iter()
            .find(|jt| !state.job_tasks.contains_key(&jt.id))
        {
            return Err(StoreError::JobTaskNotFound(missing.id));
        }
        let now = Utc::now();
        for jt in job_tasks {
            let mut updated = jt.clone();
            updated.updated_at = now;
            state.job_tasks.insert(jt.id, updated);
        }
        Ok(())
    }

    async fn get_job_context(&self, job_id: Uuid) -> Result<JobContext, StoreError> {
        Ok(self
            .state
            .read()
            .contexts
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_job_context(
        &self,
        job_id: Uuid,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if !state.jobs.contains_key(&job_id) {
            return Err(StoreError::JobNotFound(job_id));
        }
        state
            .contexts
            .entry(job_id)
            .or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn append_job_task_log(&self, log: &JobTaskLog) -> Result<(), StoreError> {
        self.state.write().logs.push(log.clone());
        Ok(())
    }

    async fn list_job_task_logs(
        &self,
        job_task_id: Uuid,
    ) -> Result<Vec<JobTaskLog>, StoreError> {
        Ok(self
            .state
            .read()
            .logs
            .iter()
            .filter(|l| l.job_task_id == job_task_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskType;

    async fn seeded_flow(store: &InMemoryWorkflowStore, steps: i32) -> (Flow, Vec<FlowTask>) {
        let flow = Flow::new("review", 1);
        let mut flow_tasks = Vec::new();
        for seq in 1..=steps {
            let task = Task::new(format!("step-{seq}"), TaskType::Manual);
            store.create_task(&task).await.unwrap();
            flow_tasks.push(FlowTask::new(flow.id, task.id, seq));
        }
        store.create_flow(&flow, &flow_tasks).await.unwrap();
        (flow, flow_tasks)
    }

    #[test]
    fn test_page_never_exceeds_max_limit() {
        let items: Vec<u32> = (0..MAX_PAGE_LIMIT + 50).collect();

        let uncapped = Pagination {
            offset: 10,
            limit: u32::MAX,
        };
        let page = page(items, uncapped);
        assert_eq!(page.len(), MAX_PAGE_LIMIT as usize);
        assert_eq!(page[0], 10);

        assert_eq!(Pagination::new(0, u32::MAX).limit, MAX_PAGE_LIMIT);
    }

    #[tokio::test]
    async fn test_flow_tasks_come_back_in_sequence_order() {
        let store = InMemoryWorkflowStore::new();
        let (flow, _) = seeded_flow(&store, 3).await;

        let (loaded, tasks) = store.get_flow_with_tasks(flow.id).await.unwrap();
        assert_eq!(loaded.id, flow.id);
        let seqs: Vec<i32> = tasks.iter().map(|t| t.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_duplicate_flow_sequence_rejected() {
        let store = InMemoryWorkflowStore::new();
        let (flow, flow_tasks) = seeded_flow(&store, 2).await;

        let dup = FlowTask::new(flow.id, flow_tasks[0].task_id, 2);
        let err = store.create_flow_task(&dup).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_job_task_compare_and_swap() {
        let store = InMemoryWorkflowStore::new();
        let (flow, flow_tasks) = seeded_flow(&store, 1).await;
        let job = Job::new(flow.id, "job", 1);
        let jt = JobTask::from_flow_task(job.id, &flow_tasks[0]);
        store.create_job(&job, &[jt.clone()]).await.unwrap();

        let mut running = jt.clone();
        running.status = JobTaskStatus::Running;
        store
            .update_job_task(&running, JobTaskStatus::Pending)
            .await
            .unwrap();

        let err = store
            .update_job_task(&running, JobTaskStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::ConcurrencyConflict {
                actual: JobTaskStatus::Running,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_batch_update_is_all_or_nothing() {
        let store = InMemoryWorkflowStore::new();
        let (flow, flow_tasks) = seeded_flow(&store, 1).await;
        let job = Job::new(flow.id, "job", 1);
        let jt = JobTask::from_flow_task(job.id, &flow_tasks[0]);
        store.create_job(&job, &[jt.clone()]).await.unwrap();

        let mut changed = jt.clone();
        changed.status = JobTaskStatus::Completed;
        let mut ghost = jt.clone();
        ghost.id = Uuid::now_v7();

        assert!(store.update_job_tasks(&[changed, ghost]).await.is_err());
        let stored = store.get_job_task(jt.id).await.unwrap();
        assert_eq!(stored.status, JobTaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_context_upsert_last_write_wins() {
        let store = InMemoryWorkflowStore::new();
        let (flow, _) = seeded_flow(&store, 1).await;
        let job = Job::new(flow.id, "job", 1);
        store.create_job(&job, &[]).await.unwrap();

        store.upsert_job_context(job.id, "k", "a").await.unwrap();
        store.upsert_job_context(job.id, "k", "b").await.unwrap();

        let ctx = store.get_job_context(job.id).await.unwrap();
        assert_eq!(ctx.get("k").map(String::as_str), Some("b"));
        assert_eq!(ctx.len(), 1);
    }

    #[tokio::test]
    async fn test_list_jobs_paginates_and_filters() {
        let store = InMemoryWorkflowStore::new();
        let (flow, _) = seeded_flow(&store, 1).await;
        for i in 0..5 {
            let mut job = Job::new(flow.id, format!("job-{i}"), 1);
            if i % 2 == 0 {
                job.status = JobStatus::Running;
            }
            store.create_job(&job, &[]).await.unwrap();
        }

        let page = store
            .list_jobs(JobFilter::default(), Pagination::new(1, 2))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);

        let running = store
            .list_jobs(
                JobFilter {
                    status: Some(JobStatus::Running),
                    ..Default::default()
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(running.len(), 3);
    }
}
