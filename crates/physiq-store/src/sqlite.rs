//! SQLite implementation of TaskStore.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use physiq_core::task::progress;
use physiq_core::{
    AnalysisReport, ErrorKind, TaskError, TaskId, TaskInput, TaskRecord, TaskStatus, WorkerId,
};

use crate::store::{restart_error, StatusCounts, StoreError, TaskStore};

const MAX_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn storage(e: sqlx::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}

/// SQLite-backed task store.
///
/// Several processes may share one database file: claiming is a single
/// `UPDATE ... RETURNING` statement, so a task is handed to one worker only.
#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(storage)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(storage)?;

        let store = Self::new(pool);
        store.run_migrations().await?;
        info!(url = %url, "Task store ready");
        Ok(store)
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage)?;
        let store = Self::new(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run migrations to create the tasks table.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_tasks (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'queued',
                progress INTEGER NOT NULL DEFAULT 0,
                user_id TEXT NOT NULL,
                input TEXT NOT NULL,
                result TEXT,
                error_kind TEXT,
                error_message TEXT,
                worker_id TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_analysis_tasks_status
            ON analysis_tasks(status, created_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_analysis_tasks_worker
            ON analysis_tasks(worker_id, status)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    /// Explain why a guarded update touched no row.
    async fn rejected(&self, id: &TaskId, to: TaskStatus) -> StoreError {
        let status: Result<Option<String>, _> =
            sqlx::query_scalar("SELECT status FROM analysis_tasks WHERE id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await;
        match status {
            Ok(None) => StoreError::NotFound(id.clone()),
            Ok(Some(from)) => match from.parse::<TaskStatus>() {
                Ok(from) => StoreError::InvalidStateTransition {
                    id: id.clone(),
                    from,
                    to,
                },
                Err(e) => StoreError::Serialization(e.to_string()),
            },
            Err(e) => storage(e),
        }
    }
}

fn record_from_row(row: &SqliteRow) -> Result<TaskRecord, StoreError> {
    let status: String = row.try_get("status").map_err(storage)?;
    let progress: i64 = row.try_get("progress").map_err(storage)?;
    let input: String = row.try_get("input").map_err(storage)?;
    let result: Option<String> = row.try_get("result").map_err(storage)?;
    let error_kind: Option<String> = row.try_get("error_kind").map_err(storage)?;
    let error_message: Option<String> = row.try_get("error_message").map_err(storage)?;
    let worker_id: Option<String> = row.try_get("worker_id").map_err(storage)?;

    let input: TaskInput =
        serde_json::from_str(&input).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let result = result
        .map(|r| serde_json::from_str::<AnalysisReport>(&r))
        .transpose()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let error = match error_kind {
        Some(kind) => {
            let kind = ErrorKind::parse(&kind).ok_or_else(|| {
                StoreError::Serialization(format!("unknown error kind '{}'", kind))
            })?;
            Some(TaskError::new(kind, error_message.unwrap_or_default()))
        }
        None => None,
    };

    Ok(TaskRecord {
        id: TaskId::new(row.try_get::<String, _>("id").map_err(storage)?),
        status: status
            .parse()
            .map_err(|e: physiq_core::CoreError| StoreError::Serialization(e.to_string()))?,
        progress: progress.clamp(0, 100) as u8,
        input,
        result,
        error,
        worker_id: worker_id.map(WorkerId::new),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(storage)?,
        started_at: row.try_get("started_at").map_err(storage)?,
        finished_at: row.try_get("finished_at").map_err(storage)?,
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn enqueue(&self, input: TaskInput) -> Result<TaskRecord, StoreError> {
        let record = TaskRecord::new(input);
        let input_str = serde_json::to_string(&record.input)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO analysis_tasks (id, kind, status, progress, user_id, input, created_at)
            VALUES (?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.kind().as_str())
        .bind(TaskStatus::Queued.as_str())
        .bind(&record.input.user_id)
        .bind(input_str)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        debug!(task_id = %record.id, kind = %record.kind(), "Task enqueued");
        Ok(record)
    }

    async fn dequeue(&self, worker: &WorkerId) -> Result<Option<TaskRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE analysis_tasks
            SET status = 'processing', progress = ?, worker_id = ?, started_at = ?
            WHERE id = (
                SELECT id FROM analysis_tasks
                WHERE status = 'queued'
                ORDER BY created_at, rowid
                LIMIT 1
            ) AND status = 'queued'
            RETURNING *
            "#,
        )
        .bind(progress::CLAIMED as i64)
        .bind(worker.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn update_progress(&self, id: &TaskId, progress: u8) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE analysis_tasks
            SET progress = MAX(progress, ?)
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(progress.min(100) as i64)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(self.rejected(id, TaskStatus::Processing).await);
        }
        Ok(())
    }

    async fn complete(&self, id: &TaskId, report: &AnalysisReport) -> Result<(), StoreError> {
        let report_str = serde_json::to_string(report)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE analysis_tasks
            SET status = 'completed', progress = 100, result = ?, finished_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(report_str)
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(self.rejected(id, TaskStatus::Completed).await);
        }
        Ok(())
    }

    async fn fail(&self, id: &TaskId, error: &TaskError) -> Result<(), StoreError> {
        // Fields are public; cap the message again.
        let error = TaskError::new(error.kind, error.message.clone());

        let result = sqlx::query(
            r#"
            UPDATE analysis_tasks
            SET status = 'failed', error_kind = ?, error_message = ?, finished_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(error.kind.as_str())
        .bind(&error.message)
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(self.rejected(id, TaskStatus::Failed).await);
        }
        Ok(())
    }

    async fn get_by_id(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM analysis_tasks WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn recover_orphans(&self, worker: &WorkerId) -> Result<usize, StoreError> {
        let error = restart_error();
        let result = sqlx::query(
            r#"
            UPDATE analysis_tasks
            SET status = 'failed', error_kind = ?, error_message = ?, finished_at = ?
            WHERE status = 'processing' AND worker_id = ?
            "#,
        )
        .bind(error.kind.as_str())
        .bind(&error.message)
        .bind(Utc::now())
        .bind(worker.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.rows_affected() as usize)
    }

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM analysis_tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(storage)?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            let status = status
                .parse::<TaskStatus>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            counts.add(status, n.max(0) as u64);
        }
        Ok(counts)
    }
}
