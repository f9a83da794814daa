//! In-memory TaskStore.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use physiq_core::task::progress;
use physiq_core::{AnalysisReport, TaskError, TaskId, TaskInput, TaskRecord, TaskStatus, WorkerId};

use crate::store::{restart_error, StatusCounts, StoreError, TaskStore};

#[derive(Default)]
struct Inner {
    tasks: HashMap<TaskId, TaskRecord>,
    queue: VecDeque<TaskId>,
}

impl Inner {
    /// Look up a task that must currently be processing.
    fn processing_mut(
        &mut self,
        id: &TaskId,
        to: TaskStatus,
    ) -> Result<&mut TaskRecord, StoreError> {
        let record = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if record.status != TaskStatus::Processing {
            return Err(StoreError::InvalidStateTransition {
                id: id.clone(),
                from: record.status,
                to,
            });
        }
        Ok(record)
    }
}

/// Task store that lives and dies with the process.
///
/// Same semantics as the SQLite store, minus durability.
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: Mutex<Inner>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn enqueue(&self, input: TaskInput) -> Result<TaskRecord, StoreError> {
        let record = TaskRecord::new(input);
        let mut inner = self.inner.lock().await;
        inner.queue.push_back(record.id.clone());
        inner.tasks.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn dequeue(&self, worker: &WorkerId) -> Result<Option<TaskRecord>, StoreError> {
        let mut inner = self.inner.lock().await;
        while let Some(id) = inner.queue.pop_front() {
            let Some(record) = inner.tasks.get_mut(&id) else {
                continue;
            };
            if record.status != TaskStatus::Queued {
                continue;
            }
            record.status = TaskStatus::Processing;
            record.progress = progress::CLAIMED;
            record.worker_id = Some(worker.clone());
            record.started_at = Some(Utc::now());
            return Ok(Some(record.clone()));
        }
        Ok(None)
    }

    async fn update_progress(&self, id: &TaskId, progress: u8) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let record = inner.processing_mut(id, TaskStatus::Processing)?;
        record.progress = record.progress.max(progress.min(100));
        Ok(())
    }

    async fn complete(&self, id: &TaskId, report: &AnalysisReport) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let record = inner.processing_mut(id, TaskStatus::Completed)?;
        record.status = TaskStatus::Completed;
        record.progress = progress::DONE;
        record.result = Some(report.clone());
        record.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, id: &TaskId, error: &TaskError) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let record = inner.processing_mut(id, TaskStatus::Failed)?;
        record.status = TaskStatus::Failed;
        record.error = Some(TaskError::new(error.kind, error.message.clone()));
        record.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn get_by_id(&self, id: &TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.inner.lock().await.tasks.get(id).cloned())
    }

    async fn recover_orphans(&self, worker: &WorkerId) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut recovered = 0;
        for record in inner.tasks.values_mut() {
            if record.status == TaskStatus::Processing
                && record.worker_id.as_ref() == Some(worker)
            {
                record.status = TaskStatus::Failed;
                record.error = Some(restart_error());
                record.finished_at = Some(now);
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let inner = self.inner.lock().await;
        let mut counts = StatusCounts::default();
        for record in inner.tasks.values() {
            counts.add(record.status, 1);
        }
        Ok(counts)
    }
}
