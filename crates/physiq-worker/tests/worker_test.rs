//! Worker loop tests: claiming, shutdown and restart recovery.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use physiq_core::{ErrorKind, Payload, SubjectProfile, TaskInput, TaskStatus, WorkerId};
use physiq_store::{MemoryTaskStore, TaskStore};
use physiq_worker::clients::{StageClient, StageError, StageRequest};
use physiq_worker::{Pipeline, Worker};

/// Answers every call with the same JSON object.
struct FixedClient(serde_json::Value);

#[async_trait]
impl StageClient for FixedClient {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn generate(&self, _request: StageRequest) -> Result<String, StageError> {
        Ok(self.0.to_string())
    }
}

struct HangingClient;

#[async_trait]
impl StageClient for HangingClient {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn generate(&self, _request: StageRequest) -> Result<String, StageError> {
        std::future::pending().await
    }
}

/// Replays stage one replies in order.
struct SequenceClient(Mutex<VecDeque<String>>);

impl SequenceClient {
    fn new(replies: &[&str]) -> Self {
        Self(Mutex::new(replies.iter().map(|r| r.to_string()).collect()))
    }
}

#[async_trait]
impl StageClient for SequenceClient {
    fn name(&self) -> &str {
        "sequence"
    }

    async fn generate(&self, _request: StageRequest) -> Result<String, StageError> {
        let reply = self.0.lock().unwrap().pop_front();
        Ok(reply.expect("no reply left"))
    }
}

struct PanickingClient;

#[async_trait]
impl StageClient for PanickingClient {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn generate(&self, _request: StageRequest) -> Result<String, StageError> {
        panic!("adapter bug")
    }
}

fn input(user: &str) -> TaskInput {
    TaskInput::body(user, Payload::text("athletic build"), SubjectProfile::default())
}

fn pipeline(store: Arc<MemoryTaskStore>, stage_one: Arc<dyn StageClient>) -> Pipeline {
    Pipeline::new(
        store,
        stage_one,
        Arc::new(FixedClient(json!({"dailyCalories": 2200}))),
    )
}

/// Poll until `n` tasks are in `status` or give up after two seconds.
async fn wait_for(store: &MemoryTaskStore, status: TaskStatus, n: u64) {
    for _ in 0..200 {
        if store.count_by_status().await.unwrap().get(status) == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} task(s) {}", n, status);
}

#[tokio::test]
async fn test_worker_processes_queued_tasks() {
    let store = Arc::new(MemoryTaskStore::new());
    for i in 0..3 {
        store.enqueue(input(&format!("user-{}", i))).await.unwrap();
    }

    let worker = Worker::new(
        WorkerId::new("w-1"),
        store.clone(),
        pipeline(store.clone(), Arc::new(FixedClient(json!({"bodyType": "endomorph"})))),
    )
    .concurrency(2)
    .poll_interval(Duration::from_millis(10));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    wait_for(&store, TaskStatus::Completed, 3).await;

    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let counts = store.count_by_status().await.unwrap();
    assert_eq!(counts.queued, 0);
    assert_eq!(counts.processing, 0);
}

#[tokio::test]
async fn test_restart_fails_orphaned_tasks() {
    let store = Arc::new(MemoryTaskStore::new());
    let orphan = store.enqueue(input("user-1")).await.unwrap();
    let other = store.enqueue(input("user-2")).await.unwrap();

    // Simulate a crash mid-task: claimed by w-1, claimed by w-2, never finished.
    store.dequeue(&WorkerId::new("w-1")).await.unwrap().unwrap();
    store.dequeue(&WorkerId::new("w-2")).await.unwrap().unwrap();

    let worker = Worker::new(
        WorkerId::new("w-1"),
        store.clone(),
        pipeline(store.clone(), Arc::new(HangingClient)),
    );
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    worker.run(shutdown).await.unwrap();

    let orphan = store.get_by_id(&orphan.id).await.unwrap().unwrap();
    assert_eq!(orphan.status, TaskStatus::Failed);
    assert_eq!(orphan.error.unwrap().kind, ErrorKind::Cancelled);

    // Another worker's task is left alone.
    let other = store.get_by_id(&other.id).await.unwrap().unwrap();
    assert_eq!(other.status, TaskStatus::Processing);
}

#[tokio::test]
async fn test_shutdown_cancels_tasks_after_grace_period() {
    let store = Arc::new(MemoryTaskStore::new());
    let task = store.enqueue(input("user-1")).await.unwrap();

    let worker = Worker::new(
        WorkerId::new("w-1"),
        store.clone(),
        pipeline(store.clone(), Arc::new(HangingClient)),
    )
    .poll_interval(Duration::from_millis(10))
    .shutdown_grace(Duration::from_millis(50));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    wait_for(&store, TaskStatus::Processing, 1).await;

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker should stop after the grace period")
        .unwrap()
        .unwrap();

    let task = store.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    let error = task.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Cancelled);
    assert!(error.message.contains("worker shutdown"));
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_tasks() {
    struct SlowClient;

    #[async_trait]
    impl StageClient for SlowClient {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _request: StageRequest) -> Result<String, StageError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(json!({"bodyType": "ectomorph"}).to_string())
        }
    }

    let store = Arc::new(MemoryTaskStore::new());
    let task = store.enqueue(input("user-1")).await.unwrap();

    let worker = Worker::new(
        WorkerId::new("w-1"),
        store.clone(),
        pipeline(store.clone(), Arc::new(SlowClient)),
    )
    .poll_interval(Duration::from_millis(10))
    .shutdown_grace(Duration::from_secs(5));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    wait_for(&store, TaskStatus::Processing, 1).await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let task = store.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_failed_task_does_not_stop_worker() {
    let store = Arc::new(MemoryTaskStore::new());
    let broken = store.enqueue(input("user-1")).await.unwrap();
    let good = store.enqueue(input("user-2")).await.unwrap();

    let stage_one = SequenceClient::new(&[
        "I cannot analyse this photo.",
        r#"{"bodyType": "ectomorph"}"#,
    ]);
    let worker = Worker::new(
        WorkerId::new("w-1"),
        store.clone(),
        pipeline(store.clone(), Arc::new(stage_one)),
    )
    .poll_interval(Duration::from_millis(10));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    wait_for(&store, TaskStatus::Completed, 1).await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let broken = store.get_by_id(&broken.id).await.unwrap().unwrap();
    assert_eq!(broken.status, TaskStatus::Failed);
    assert_eq!(broken.error.unwrap().kind, ErrorKind::ParseError);

    let good = store.get_by_id(&good.id).await.unwrap().unwrap();
    assert_eq!(good.status, TaskStatus::Completed);
    assert!(good.result.is_some());
}

#[tokio::test]
async fn test_panicking_stage_fails_task() {
    let store = Arc::new(MemoryTaskStore::new());
    let task = store.enqueue(input("user-1")).await.unwrap();

    let worker = Worker::new(
        WorkerId::new("w-1"),
        store.clone(),
        pipeline(store.clone(), Arc::new(PanickingClient)),
    )
    .poll_interval(Duration::from_millis(10));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(shutdown).await }
    });

    wait_for(&store, TaskStatus::Failed, 1).await;
    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let task = store.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.finished_at.is_some());
    let error = task.error.unwrap();
    assert_eq!(error.kind, ErrorKind::UpstreamModelError);
    assert!(error.message.contains("adapter bug"), "{}", error.message);
}
