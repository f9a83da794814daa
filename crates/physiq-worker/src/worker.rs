//! Consumer loop: claims tasks and runs them on a bounded pool.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use physiq_core::{TaskError, TaskId, WorkerId};
use physiq_store::{StoreError, TaskStore};

use crate::pipeline::Pipeline;

/// A long-running consumer of the task store.
pub struct Worker {
    id: WorkerId,
    store: Arc<dyn TaskStore>,
    pipeline: Arc<Pipeline>,
    concurrency: usize,
    poll_interval: Duration,
    shutdown_grace: Duration,
}

impl Worker {
    pub fn new(id: WorkerId, store: Arc<dyn TaskStore>, pipeline: Pipeline) -> Self {
        Self {
            id,
            store,
            pipeline: Arc::new(pipeline),
            concurrency: 1,
            poll_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(30),
        }
    }

    /// Set the maximum number of tasks processed at once.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Set how long to wait before polling an empty queue again.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how long in-flight tasks may run after shutdown is requested.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Run until `shutdown` fires.
    ///
    /// On shutdown no new task is claimed; in-flight tasks get the grace
    /// period to finish and are then cancelled (they fail as `cancelled`).
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), StoreError> {
        let recovered = self.store.recover_orphans(&self.id).await?;
        if recovered > 0 {
            warn!(
                worker_id = %self.id,
                recovered,
                "Failed tasks interrupted by a previous run of this worker"
            );
        }

        info!(
            worker_id = %self.id,
            concurrency = self.concurrency,
            "Worker started"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let cancel = CancellationToken::new();
        let mut in_flight = JoinSet::new();

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                log_join(joined);
            }

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.store.dequeue(&self.id).await {
                Ok(Some(record)) => {
                    debug!(task_id = %record.id, "Claimed task");
                    let store = self.store.clone();
                    let pipeline = self.pipeline.clone();
                    let cancel = cancel.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        let task_id = record.id.clone();
                        // Run on its own task so a panic surfaces as a JoinError
                        // and the claimed task can still be failed.
                        let run = tokio::spawn(async move { pipeline.run(record, &cancel).await });
                        match run.await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => {
                                error!(task_id = %task_id, error = %e, "Failed to record task outcome");
                            }
                            Err(e) => fail_panicked(store.as_ref(), &task_id, e).await,
                        }
                    });
                }
                Ok(None) => {
                    drop(permit);
                    self.idle(&shutdown).await;
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "Failed to claim task");
                    self.idle(&shutdown).await;
                }
            }
        }

        info!(
            worker_id = %self.id,
            in_flight = in_flight.len(),
            grace_secs = self.shutdown_grace.as_secs(),
            "Shutting down, waiting for in-flight tasks"
        );

        let drain = async {
            while let Some(joined) = in_flight.join_next().await {
                log_join(joined);
            }
        };
        if tokio::time::timeout(self.shutdown_grace, drain).await.is_err() {
            warn!(worker_id = %self.id, "Grace period elapsed, cancelling in-flight tasks");
            cancel.cancel();
            while let Some(joined) = in_flight.join_next().await {
                log_join(joined);
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
        Ok(())
    }

    async fn idle(&self, shutdown: &CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(self.poll_interval) => {}
        }
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Task processing panicked");
    }
}

/// Move a task whose pipeline panicked to `failed`.
async fn fail_panicked(store: &dyn TaskStore, task_id: &TaskId, join_error: JoinError) {
    let reason = if join_error.is_panic() {
        panic_message(join_error.into_panic())
    } else {
        join_error.to_string()
    };
    error!(task_id = %task_id, reason = %reason, "Task processing panicked");

    let task_error = TaskError::upstream(format!("worker panicked: {}", reason));
    if let Err(e) = store.fail(task_id, &task_error).await {
        error!(task_id = %task_id, error = %e, "Failed to record task outcome");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast_ref::<&str>() {
            Some(message) => message.to_string(),
            None => "unknown panic".to_string(),
        },
    }
}
