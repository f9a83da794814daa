//! Submission and status/result operations.
//!
//! The HTTP layer is a thin mapping over these; nothing here waits on
//! inference.

use std::sync::Arc;

use tracing::info;

use physiq_core::{TaskId, TaskInput, TaskOutcome, TaskRecord, TaskSummary};
use physiq_store::{StatusCounts, TaskStore};

use crate::error::ApiError;

/// Front door to the task store.
pub struct TaskService {
    store: Arc<dyn TaskStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Validate and enqueue a task. Invalid input never creates a task.
    pub async fn submit(&self, input: TaskInput) -> Result<TaskRecord, ApiError> {
        let input = input.validated()?;
        let record = self.store.enqueue(input).await?;

        info!(
            task_id = %record.id,
            kind = %record.kind(),
            user_id = %record.input.user_id,
            "Task submitted"
        );
        Ok(record)
    }

    pub async fn get(&self, id: &TaskId) -> Result<TaskRecord, ApiError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(id.clone()))
    }

    pub async fn status(&self, id: &TaskId) -> Result<TaskSummary, ApiError> {
        Ok(self.get(id).await?.summary())
    }

    /// Result view: the report, the error, or the in-flight status.
    pub async fn outcome(&self, id: &TaskId) -> Result<TaskOutcome, ApiError> {
        Ok(self.get(id).await?.into_outcome())
    }

    pub async fn counts(&self) -> Result<StatusCounts, ApiError> {
        Ok(self.store.count_by_status().await?)
    }
}
