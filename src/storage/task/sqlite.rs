use async_trait::async_trait;
use chrono::Utc;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::info;

use super::mapping::StateColumns;
use super::{rejected_write, TaskQuery, TaskStorage};
use crate::schedule::types::{Task, TaskOutcome, TaskState, TaskStatus};
use crate::storage::task::entity::Model as TaskModel;
use crate::storage::{format_timestamp, StorageError, StorageResult};

const NON_TERMINAL: &str = "('pending', 'processing')";

pub struct SqliteTaskStorage {
    pool: SqlitePool,
}

impl SqliteTaskStorage {
    pub async fn new(database_url: &str) -> StorageResult<Self> {
        info!("Initializing SQLite task storage at {}", database_url);
        let pool = SqlitePoolOptions::new().connect(database_url).await?;
        Self::with_pool(pool).await
    }

    /// Single-connection in-memory database, mostly for tests.
    pub async fn in_memory() -> StorageResult<Self> {
        // the database lives as long as its only connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> StorageResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                owner_id TEXT,
                task_type TEXT NOT NULL,
                status TEXT NOT NULL,
                input_text TEXT,
                input_url TEXT,
                language TEXT,
                voice TEXT,
                output_url TEXT,
                output_kind TEXT,
                transcript_text TEXT,
                transcript_json TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tasks_owner_created ON tasks (owner_id, created_at)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_model(row: &SqliteRow) -> StorageResult<TaskModel> {
        Ok(TaskModel {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            task_type: row.try_get("task_type")?,
            status: row.try_get("status")?,
            input_text: row.try_get("input_text")?,
            input_url: row.try_get("input_url")?,
            language: row.try_get("language")?,
            voice: row.try_get("voice")?,
            output_url: row.try_get("output_url")?,
            output_kind: row.try_get("output_kind")?,
            transcript_text: row.try_get("transcript_text")?,
            transcript_json: row.try_get("transcript_json")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_task(row: &SqliteRow) -> StorageResult<Task> {
        Task::try_from(Self::row_to_model(row)?)
    }

    async fn require(&self, task_id: &str) -> StorageResult<Task> {
        self.get(task_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(task_id.to_string()))
    }

    fn where_clause(query: &TaskQuery) -> String {
        let mut conditions = vec!["owner_id IS ?"];
        if query.task_type.is_some() {
            conditions.push("task_type = ?");
        }
        if query.status.is_some() {
            conditions.push("status = ?");
        }
        conditions.join(" AND ")
    }
}

fn bind_filters<'q>(
    mut sql: Query<'q, Sqlite, SqliteArguments<'q>>,
    query: &'q TaskQuery,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    sql = sql.bind(query.owner_id.as_deref());
    if let Some(task_type) = query.task_type {
        sql = sql.bind(task_type.as_str());
    }
    if let Some(status) = query.status {
        sql = sql.bind(status.as_str());
    }
    sql
}

#[async_trait]
impl TaskStorage for SqliteTaskStorage {
    async fn create(&self, task: &Task) -> StorageResult<()> {
        let model = TaskModel::try_from(task)?;

        let result = sqlx::query(
            r#"
            INSERT INTO tasks
            (id, owner_id, task_type, status, input_text, input_url, language, voice,
             output_url, output_kind, transcript_text, transcript_json, error_message,
             created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&model.id)
        .bind(&model.owner_id)
        .bind(&model.task_type)
        .bind(&model.status)
        .bind(&model.input_text)
        .bind(&model.input_url)
        .bind(&model.language)
        .bind(&model.voice)
        .bind(&model.output_url)
        .bind(&model.output_kind)
        .bind(&model.transcript_text)
        .bind(&model.transcript_json)
        .bind(&model.error_message)
        .bind(&model.created_at)
        .bind(&model.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::Duplicate(task.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, task_id: &str) -> StorageResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn list(&self, query: &TaskQuery) -> StorageResult<(Vec<Task>, u64)> {
        let where_clause = Self::where_clause(query);

        let count_sql = format!("SELECT COUNT(*) AS total FROM tasks WHERE {}", where_clause);
        let total: i64 = bind_filters(sqlx::query(&count_sql), query)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let page_sql = format!(
            "SELECT * FROM tasks WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            where_clause
        );
        let rows = bind_filters(sqlx::query(&page_sql), query)
            .bind(query.limit as i64)
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        let tasks = rows
            .iter()
            .map(Self::row_to_task)
            .collect::<StorageResult<Vec<_>>>()?;
        Ok((tasks, total.max(0) as u64))
    }

    async fn mark_processing(&self, task_id: &str) -> StorageResult<Task> {
        let result = sqlx::query(
            "UPDATE tasks SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(TaskStatus::Processing.as_str())
        .bind(format_timestamp(&Utc::now()))
        .bind(task_id)
        .bind(TaskStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        let task = self.require(task_id).await?;
        if result.rows_affected() == 0 {
            return Err(rejected_write(&task, TaskStatus::Processing));
        }
        Ok(task)
    }

    async fn update_result(&self, task_id: &str, outcome: &TaskOutcome) -> StorageResult<Task> {
        let state = TaskState::from(outcome.clone());
        let columns = StateColumns::try_from(&state)?;

        let sql = format!(
            r#"
            UPDATE tasks
            SET status = ?, output_url = ?, output_kind = ?, transcript_text = ?,
                transcript_json = ?, error_message = ?, updated_at = ?
            WHERE id = ? AND status IN {}
            "#,
            NON_TERMINAL
        );
        let result = sqlx::query(&sql)
            .bind(&columns.status)
            .bind(&columns.output_url)
            .bind(&columns.output_kind)
            .bind(&columns.transcript_text)
            .bind(&columns.transcript_json)
            .bind(&columns.error_message)
            .bind(format_timestamp(&Utc::now()))
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        let task = self.require(task_id).await?;
        if result.rows_affected() == 0 {
            return Err(rejected_write(&task, state.status()));
        }
        Ok(task)
    }
}
