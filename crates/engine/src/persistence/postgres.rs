//! PostgreSQL implementation of WorkflowStore
//!
//! Production persistence with:
//! - Transactions around job creation, flow creation and batch job task updates
//! - Status compare-and-swap on single job task updates
//! - Upserts for job context entries

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::store::*;
use crate::model::{
    Flow, FlowTask, Job, JobContext, JobStatus, JobTask, JobTaskLog, JobTaskStatus, Task,
    TaskConfig, TaskResult,
};

/// PostgreSQL implementation of WorkflowStore
///
/// # Example
///
/// ```ignore
/// use jobflow_engine::PostgresWorkflowStore;
///
/// let store = PostgresWorkflowStore::connect("postgres://localhost/jobflow").await?;
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresWorkflowStore {
    pool: PgPool,
}

impl PostgresWorkflowStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to the given database URL
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                StoreError::Database(e.to_string())
            })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Database(e.to_string())
}

fn ser_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Serialization(e.to_string())
}

fn flow_from_row(row: &PgRow) -> Flow {
    Flow {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        version: row.get("version"),
        is_active: row.get("is_active"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn flow_task_from_row(row: &PgRow) -> FlowTask {
    FlowTask {
        id: row.get("id"),
        flow_id: row.get("flow_id"),
        task_id: row.get("task_id"),
        sequence: row.get("sequence"),
        is_optional: row.get("is_optional"),
        allow_rollback: row.get("allow_rollback"),
        condition_config: row.get("condition_config"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn task_from_row(row: &PgRow) -> Result<Task, StoreError> {
    let task_type: String = row.get("task_type");
    let config: serde_json::Value = row.get("config");
    Ok(Task {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        task_type: task_type.parse().map_err(ser_err)?,
        config: serde_json::from_value::<TaskConfig>(config).map_err(ser_err)?,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let status: String = row.get("status");
    Ok(Job {
        id: row.get("id"),
        flow_id: row.get("flow_id"),
        name: row.get("name"),
        status: status.parse().map_err(ser_err)?,
        current_task_seq: row.get("current_task_seq"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn job_task_from_row(row: &PgRow) -> Result<JobTask, StoreError> {
    let status: String = row.get("status");
    let result: Option<serde_json::Value> = row.get("result");
    let result = result
        .map(serde_json::from_value::<TaskResult>)
        .transpose()
        .map_err(ser_err)?;
    Ok(JobTask {
        id: row.get("id"),
        job_id: row.get("job_id"),
        flow_task_id: row.get("flow_task_id"),
        task_id: row.get("task_id"),
        sequence: row.get("sequence"),
        status: status.parse().map_err(ser_err)?,
        is_skipped: row.get("is_skipped"),
        executor_id: row.get("executor_id"),
        result,
        error_message: row.get("error_message"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn log_from_row(row: &PgRow) -> Result<JobTaskLog, StoreError> {
    let action: String = row.get("action");
    Ok(JobTaskLog {
        id: row.get("id"),
        job_task_id: row.get("job_task_id"),
        action: action.parse().map_err(ser_err)?,
        operator_id: row.get("operator_id"),
        message: row.get("message"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
    })
}

fn result_json(job_task: &JobTask) -> Option<serde_json::Value> {
    job_task
        .result
        .as_ref()
        .map(|r| serde_json::Value::Object(r.clone()))
}

const JOB_TASK_COLUMNS: &str = "id, job_id, flow_task_id, task_id, sequence, status, is_skipped, \
     executor_id, result, error_message, started_at, completed_at, created_at, updated_at";

async fn insert_flow_task<'c, E>(executor: E, ft: &FlowTask) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO flow_tasks
            (id, flow_id, task_id, sequence, is_optional, allow_rollback, condition_config, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(ft.id)
    .bind(ft.flow_id)
    .bind(ft.task_id)
    .bind(ft.sequence)
    .bind(ft.is_optional)
    .bind(ft.allow_rollback)
    .bind(&ft.condition_config)
    .bind(ft.created_at)
    .bind(ft.updated_at)
    .execute(executor)
    .await
    .map_err(db_err)?;
    Ok(())
}

async fn write_job_task<'c, E>(
    executor: E,
    jt: &JobTask,
    expected: Option<JobTaskStatus>,
) -> Result<u64, StoreError>
where
    E: sqlx::PgExecutor<'c>,
{
    let done = sqlx::query(
        r#"
        UPDATE job_tasks
        SET status = $2, is_skipped = $3, executor_id = $4, result = $5, error_message = $6,
            started_at = $7, completed_at = $8, updated_at = NOW()
        WHERE id = $1 AND ($9::VARCHAR IS NULL OR status = $9)
        "#,
    )
    .bind(jt.id)
    .bind(jt.status.to_string())
    .bind(jt.is_skipped)
    .bind(jt.executor_id)
    .bind(result_json(jt))
    .bind(&jt.error_message)
    .bind(jt.started_at)
    .bind(jt.completed_at)
    .bind(expected.map(|s| s.to_string()))
    .execute(executor)
    .await
    .map_err(db_err)?;
    Ok(done.rows_affected())
}

#[async_trait]
impl WorkflowStore for PostgresWorkflowStore {
    #[instrument(skip(self, flow, tasks), fields(flow_id = %flow.id))]
    async fn create_flow(&self, flow: &Flow, tasks: &[FlowTask]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO flows (id, name, description, version, is_active, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(flow.id)
        .bind(&flow.name)
        .bind(&flow.description)
        .bind(&flow.version)
        .bind(flow.is_active)
        .bind(flow.created_by)
        .bind(flow.created_at)
        .bind(flow.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to create flow: {}", e);
            db_err(e)
        })?;

        for ft in tasks {
            insert_flow_task(&mut *tx, ft).await?;
        }

        tx.commit().await.map_err(db_err)?;
        debug!(steps = tasks.len(), "created flow");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_flow(&self, flow_id: Uuid) -> Result<Flow, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, version, is_active, created_by, created_at, updated_at
            FROM flows WHERE id = $1
            "#,
        )
        .bind(flow_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::FlowNotFound(flow_id))?;

        Ok(flow_from_row(&row))
    }

    #[instrument(skip(self))]
    async fn list_flows(&self, pagination: Pagination) -> Result<Vec<Flow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, version, is_active, created_by, created_at, updated_at
            FROM flows
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::from(pagination.limit.min(MAX_PAGE_LIMIT)))
        .bind(i64::from(pagination.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.iter().map(flow_from_row).collect())
    }

    #[instrument(skip(self, flow), fields(flow_id = %flow.id))]
    async fn update_flow(&self, flow: &Flow) -> Result<(), StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE flows
            SET name = $2, description = $3, version = $4, is_active = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(flow.id)
        .bind(&flow.name)
        .bind(&flow.description)
        .bind(&flow.version)
        .bind(flow.is_active)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::FlowNotFound(flow.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_flow(&self, flow_id: Uuid) -> Result<(), StoreError> {
        let done = sqlx::query("DELETE FROM flows WHERE id = $1")
            .bind(flow_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::FlowNotFound(flow_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn count_jobs_for_flow(&self, flow_id: Uuid) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE flow_id = $1")
            .bind(flow_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as u64)
    }

    #[instrument(skip(self, flow_task), fields(flow_id = %flow_task.flow_id, sequence = flow_task.sequence))]
    async fn create_flow_task(&self, flow_task: &FlowTask) -> Result<(), StoreError> {
        insert_flow_task(&self.pool, flow_task).await
    }

    #[instrument(skip(self))]
    async fn get_flow_task(&self, flow_task_id: Uuid) -> Result<FlowTask, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, flow_id, task_id, sequence, is_optional, allow_rollback, condition_config,
                   created_at, updated_at
            FROM flow_tasks WHERE id = $1
            "#,
        )
        .bind(flow_task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::FlowTaskNotFound(flow_task_id))?;

        Ok(flow_task_from_row(&row))
    }

    #[instrument(skip(self))]
    async fn list_flow_tasks(&self, flow_id: Uuid) -> Result<Vec<FlowTask>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, flow_id, task_id, sequence, is_optional, allow_rollback, condition_config,
                   created_at, updated_at
            FROM flow_tasks WHERE flow_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(flow_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.iter().map(flow_task_from_row).collect())
    }

    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        let config = serde_json::to_value(&task.config).map_err(ser_err)?;
        sqlx::query(
            r#"
            INSERT INTO tasks (id, name, description, task_type, config, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(task.id)
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.task_type.to_string())
        .bind(&config)
        .bind(task.is_active)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create task: {}", e);
            db_err(e)
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_task(&self, task_id: Uuid) -> Result<Task, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, task_type, config, is_active, created_at, updated_at
            FROM tasks WHERE id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::TaskNotFound(task_id))?;

        task_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn list_tasks(&self, pagination: Pagination) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, task_type, config, is_active, created_at, updated_at
            FROM tasks
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::from(pagination.limit.min(MAX_PAGE_LIMIT)))
        .bind(i64::from(pagination.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(task_from_row).collect()
    }

    #[instrument(skip(self, task), fields(task_id = %task.id))]
    async fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        let config = serde_json::to_value(&task.config).map_err(ser_err)?;
        let done = sqlx::query(
            r#"
            UPDATE tasks
            SET name = $2, description = $3, task_type = $4, config = $5, is_active = $6,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(task.id)
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.task_type.to_string())
        .bind(&config)
        .bind(task.is_active)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::TaskNotFound(task.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_task(&self, task_id: Uuid) -> Result<(), StoreError> {
        let done = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::TaskNotFound(task_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn count_flow_tasks_for_task(&self, task_id: Uuid) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flow_tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as u64)
    }

    #[instrument(skip(self, job, tasks), fields(job_id = %job.id, flow_id = %job.flow_id))]
    async fn create_job(&self, job: &Job, tasks: &[JobTask]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO jobs
                (id, flow_id, name, status, current_task_seq, started_at, completed_at, created_by,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.id)
        .bind(job.flow_id)
        .bind(&job.name)
        .bind(job.status.to_string())
        .bind(job.current_task_seq)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.created_by)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to create job: {}", e);
            db_err(e)
        })?;

        for jt in tasks {
            sqlx::query(
                r#"
                INSERT INTO job_tasks
                    (id, job_id, flow_task_id, task_id, sequence, status, is_skipped, executor_id,
                     result, error_message, started_at, completed_at, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(jt.id)
            .bind(jt.job_id)
            .bind(jt.flow_task_id)
            .bind(jt.task_id)
            .bind(jt.sequence)
            .bind(jt.status.to_string())
            .bind(jt.is_skipped)
            .bind(jt.executor_id)
            .bind(result_json(jt))
            .bind(&jt.error_message)
            .bind(jt.started_at)
            .bind(jt.completed_at)
            .bind(jt.created_at)
            .bind(jt.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        debug!(tasks = tasks.len(), "created job");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_job(&self, job_id: Uuid) -> Result<Job, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, flow_id, name, status, current_task_seq, started_at, completed_at,
                   created_by, created_at, updated_at
            FROM jobs WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::JobNotFound(job_id))?;

        job_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn list_jobs(
        &self,
        filter: JobFilter,
        pagination: Pagination,
    ) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, flow_id, name, status, current_task_seq, started_at, completed_at,
                   created_by, created_at, updated_at
            FROM jobs
            WHERE ($1::UUID IS NULL OR flow_id = $1)
              AND ($2::VARCHAR IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.flow_id)
        .bind(filter.status.map(|s| s.to_string()))
        .bind(i64::from(pagination.limit.min(MAX_PAGE_LIMIT)))
        .bind(i64::from(pagination.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, status = %job.status))]
    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE jobs
            SET name = $2, status = $3, current_task_seq = $4, started_at = $5, completed_at = $6,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(job.status.to_string())
        .bind(job.current_task_seq)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(job.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE jobs SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if done.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(job_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_job_task(&self, job_task_id: Uuid) -> Result<JobTask, StoreError> {
        let sql = format!("SELECT {JOB_TASK_COLUMNS} FROM job_tasks WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(job_task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::JobTaskNotFound(job_task_id))?;

        job_task_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn list_job_tasks(&self, job_id: Uuid) -> Result<Vec<JobTask>, StoreError> {
        let sql = format!(
            "SELECT {JOB_TASK_COLUMNS} FROM job_tasks WHERE job_id = $1 ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(job_task_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn get_job_task_by_sequence(
        &self,
        job_id: Uuid,
        sequence: i32,
    ) -> Result<Option<JobTask>, StoreError> {
        let sql =
            format!("SELECT {JOB_TASK_COLUMNS} FROM job_tasks WHERE job_id = $1 AND sequence = $2");
        let row = sqlx::query(&sql)
            .bind(job_id)
            .bind(sequence)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(job_task_from_row).transpose()
    }

    #[instrument(skip(self, job_task), fields(job_task_id = %job_task.id, status = %job_task.status))]
    async fn update_job_task(
        &self,
        job_task: &JobTask,
        expected: JobTaskStatus,
    ) -> Result<(), StoreError> {
        let affected = write_job_task(&self.pool, job_task, Some(expected)).await?;
        if affected == 1 {
            return Ok(());
        }

        // Nothing matched: either the row is gone or its status moved on
        let current = self.get_job_task(job_task.id).await?;
        Err(StoreError::ConcurrencyConflict {
            id: job_task.id,
            expected,
            actual: current.status,
        })
    }

    #[instrument(skip(self, job_tasks), fields(count = job_tasks.len()))]
    async fn update_job_tasks(&self, job_tasks: &[JobTask]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for jt in job_tasks {
            if write_job_task(&mut *tx, jt, None).await? == 0 {
                return Err(StoreError::JobTaskNotFound(jt.id));
            }
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit job task batch: {}", e);
            db_err(e)
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_job_context(&self, job_id: Uuid) -> Result<JobContext, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT context_key, context_value FROM job_context WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| (row.get("context_key"), row.get("context_value")))
            .collect())
    }

    #[instrument(skip(self, value))]
    async fn upsert_job_context(
        &self,
        job_id: Uuid,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_context (job_id, context_key, context_value)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_id, context_key)
            DO UPDATE SET context_value = EXCLUDED.context_value, updated_at = NOW()
            "#,
        )
        .bind(job_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let missing_job =
                matches!(&e, sqlx::Error::Database(db) if db.is_foreign_key_violation());
            if missing_job {
                StoreError::JobNotFound(job_id)
            } else {
                db_err(e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self, log), fields(job_task_id = %log.job_task_id, action = %log.action))]
    async fn append_job_task_log(&self, log: &JobTaskLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_task_logs (id, job_task_id, action, operator_id, message, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(log.id)
        .bind(log.job_task_id)
        .bind(log.action.to_string())
        .bind(log.operator_id)
        .bind(&log.message)
        .bind(&log.metadata)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_job_task_logs(
        &self,
        job_task_id: Uuid,
    ) -> Result<Vec<JobTaskLog>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_task_id, action, operator_id, message, metadata, created_at
            FROM job_task_logs WHERE job_task_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(job_task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(log_from_row).collect()
    }
}
