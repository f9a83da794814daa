//! Task storage trait and types.

use async_trait::async_trait;
use thiserror::Error;

use physiq_core::{AnalysisReport, TaskError, TaskId, TaskInput, TaskRecord, TaskStatus, WorkerId};

/// Error type for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("invalid state transition for task {id}: {from} -> {to}")]
    InvalidStateTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Error recorded on tasks found `processing` when their worker starts up.
pub(crate) fn restart_error() -> TaskError {
    TaskError::cancelled("interrupted by worker restart")
}

/// Number of tasks in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub queued: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn get(&self, status: TaskStatus) -> u64 {
        match status {
            TaskStatus::Queued => self.queued,
            TaskStatus::Processing => self.processing,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
        }
    }

    pub(crate) fn add(&mut self, status: TaskStatus, n: u64) {
        match status {
            TaskStatus::Queued => self.queued += n,
            TaskStatus::Processing => self.processing += n,
            TaskStatus::Completed => self.completed += n,
            TaskStatus::Failed => self.failed += n,
        }
    }
}

/// Durable record of analysis tasks shared by producers and workers.
///
/// Status only moves forward (`queued -> processing -> completed | failed`);
/// every method that would move it elsewhere returns
/// [`StoreError::InvalidStateTransition`].
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new queued task and return it.
    async fn enqueue(&self, input: TaskInput) -> Result<TaskRecord, StoreError>;

    /// Atomically claim the oldest queued task for `worker`.
    ///
    /// The returned record is already `processing` at the claimed
    /// checkpoint. `None` when the queue is empty.
    async fn dequeue(&self, worker: &WorkerId) -> Result<Option<TaskRecord>, StoreError>;

    /// Raise the progress of a processing task. Lower values are ignored.
    async fn update_progress(&self, id: &TaskId, progress: u8) -> Result<(), StoreError>;

    /// Store the result and move a processing task to `completed`.
    async fn complete(&self, id: &TaskId, report: &AnalysisReport) -> Result<(), StoreError>;

    /// Store the error and move a processing task to `failed`.
    async fn fail(&self, id: &TaskId, error: &TaskError) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError>;

    /// Fail tasks left `processing` by a previous run of `worker`.
    /// Call on startup. Returns the number of tasks failed.
    async fn recover_orphans(&self, worker: &WorkerId) -> Result<usize, StoreError>;

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError>;
}
