//! Pipeline tests against scripted stage clients and the in-memory store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use physiq_core::body::MuscleDefinition;
use physiq_core::meal::MealType;
use physiq_core::task::progress;
use physiq_core::{
    AnalysisReport, ErrorKind, MealContext, Payload, SubjectProfile, TaskInput, TaskRecord,
    TaskStatus, WorkerId, DISCLAIMER,
};
use physiq_store::{MemoryTaskStore, TaskStore};
use physiq_worker::clients::{StageClient, StageError, StageRequest};
use physiq_worker::sink::{CompletedTask, CompletionSink, SinkError};
use physiq_worker::{Pipeline, RetryPolicy};

const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Replies from a fixed script, one entry per call.
struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, StageError>>>,
    calls: AtomicU32,
    requests: Mutex<Vec<StageRequest>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<String, StageError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn ok(body: serde_json::Value) -> Arc<Self> {
        Self::new(vec![Ok(body.to_string())])
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: StageRequest) -> Result<String, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StageError::InvalidResponse("script exhausted".into())))
    }
}

/// Never answers.
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

struct FailingSink {
    calls: AtomicU32,
}

#[async_trait]
impl CompletionSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn on_completed(&self, _task: &CompletedTask) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Status(503))
    }
}

fn assessment() -> serde_json::Value {
    json!({
        "bodyType": "mesomorph",
        "measurements": {
            "bodyFatPercentage": 18,
            "muscleDefinition": "high",
            "posture": "good",
            "symmetry": "good",
            "overallFitness": "advanced"
        },
        "bodyComposition": {"muscleMass": "high", "bodyFat": "low"},
        "confidence": 0.8,
        "insights": ["Solid base"]
    })
}

fn plan() -> serde_json::Value {
    json!({
        "nutrition": ["Eat more vegetables"],
        "priority": "muscle_gain",
        "dailyCalories": 2600,
        "macroSplit": {"protein": 30, "carbs": 45, "fat": 25}
    })
}

fn body_input() -> TaskInput {
    TaskInput::body(
        "user-1",
        Payload::image(PIXEL),
        SubjectProfile {
            height_cm: Some(180.0),
            weight_kg: Some(80.0),
            ..Default::default()
        },
    )
}

async fn claimed(store: &MemoryTaskStore, input: TaskInput) -> TaskRecord {
    store.enqueue(input).await.unwrap();
    store
        .dequeue(&WorkerId::new("test-worker"))
        .await
        .unwrap()
        .expect("task should be claimable")
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::fixed(2, Duration::from_millis(10))
}

#[tokio::test]
async fn test_body_analysis_completes() {
    let store = Arc::new(MemoryTaskStore::new());
    let stage_one = ScriptedClient::ok(assessment());
    let stage_two = ScriptedClient::ok(plan());
    let pipeline = Pipeline::new(store.clone(), stage_one.clone(), stage_two.clone());

    let record = claimed(&store, body_input()).await;
    let status = pipeline
        .run(record.clone(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);

    let stored = store.get_by_id(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.progress, progress::DONE);
    assert!(stored.error.is_none());
    assert!(stored.finished_at.is_some());

    let Some(AnalysisReport::BodyAnalysis(report)) = stored.result else {
        panic!("expected a body analysis report");
    };
    assert_eq!(report.disclaimer, DISCLAIMER);
    assert_eq!(report.measurements.height, 180.0);
    assert_eq!(report.body_composition.estimated_bmi, 24.7);
    assert_eq!(report.recommendations.daily_calories, 2600);

    // Stage two is fed the sanitized assessment, not the raw reply.
    let requests = stage_two.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].prompt.contains("mesomorph"));
    assert!(requests[0].images.is_empty());
    assert_eq!(stage_one.requests.lock().unwrap()[0].images.len(), 1);
}

#[tokio::test]
async fn test_out_of_range_values_are_sanitized() {
    let store = Arc::new(MemoryTaskStore::new());
    let stage_one = ScriptedClient::ok(json!({
        "measurements": {"bodyFatPercentage": 999, "muscleDefinition": "extreme"}
    }));
    let pipeline = Pipeline::new(store.clone(), stage_one, ScriptedClient::ok(plan()));

    let record = claimed(&store, body_input()).await;
    pipeline.run(record.clone(), &CancellationToken::new()).await.unwrap();

    let stored = store.get_by_id(&record.id).await.unwrap().unwrap();
    let Some(AnalysisReport::BodyAnalysis(report)) = stored.result else {
        panic!("expected a body analysis report");
    };
    assert_eq!(report.measurements.body_fat_percentage, 50.0);
    assert_eq!(report.measurements.muscle_definition, MuscleDefinition::Moderate);
}

#[tokio::test]
async fn test_unparseable_stage_one_fails_with_parse_error() {
    let store = Arc::new(MemoryTaskStore::new());
    let stage_one = ScriptedClient::new(vec![Ok("I cannot analyse this photo.".into())]);
    let stage_two = ScriptedClient::ok(plan());
    let pipeline = Pipeline::new(store.clone(), stage_one, stage_two.clone());

    let record = claimed(&store, body_input()).await;
    let status = pipeline
        .run(record.clone(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Failed);

    let stored = store.get_by_id(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert!(stored.result.is_none());
    let error = stored.error.unwrap();
    assert_eq!(error.kind, ErrorKind::ParseError);
    assert!(error.message.starts_with("stage one"));
    assert_eq!(stage_two.calls(), 0);
}

#[tokio::test]
async fn test_stage_two_failure_never_fabricates_a_plan() {
    let store = Arc::new(MemoryTaskStore::new());
    let stage_two = ScriptedClient::new(vec![Err(StageError::Status {
        status: 401,
        body: "invalid api key".into(),
    })]);
    let pipeline = Pipeline::new(store.clone(), ScriptedClient::ok(assessment()), stage_two.clone())
        .with_retry(fast_retry());

    let record = claimed(&store, body_input()).await;
    pipeline.run(record.clone(), &CancellationToken::new()).await.unwrap();

    let stored = store.get_by_id(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert!(stored.result.is_none());
    let error = stored.error.unwrap();
    assert_eq!(error.kind, ErrorKind::UpstreamModelError);
    assert!(error.message.contains("stage two"));
    assert!(error.message.contains("401"));
    // Client errors are not retried.
    assert_eq!(stage_two.calls(), 1);
    assert!(stored.progress >= progress::STAGE_ONE_SANITIZED);
}

#[tokio::test]
async fn test_empty_reply_is_an_upstream_error() {
    let store = Arc::new(MemoryTaskStore::new());
    let stage_one = ScriptedClient::new(vec![Ok("```json\n```".into())]);
    let pipeline = Pipeline::new(store.clone(), stage_one.clone(), ScriptedClient::ok(plan()))
        .with_retry(RetryPolicy::None);

    let record = claimed(&store, body_input()).await;
    pipeline.run(record.clone(), &CancellationToken::new()).await.unwrap();

    let error = store.get_by_id(&record.id).await.unwrap().unwrap().error.unwrap();
    assert_eq!(error.kind, ErrorKind::UpstreamModelError);
    assert_eq!(stage_one.calls(), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let store = Arc::new(MemoryTaskStore::new());
    let stage_one = ScriptedClient::new(vec![
        Err(StageError::Transport("connection reset".into())),
        Err(StageError::Status {
            status: 503,
            body: "loading model".into(),
        }),
        Ok(assessment().to_string()),
    ]);
    let pipeline = Pipeline::new(store.clone(), stage_one.clone(), ScriptedClient::ok(plan()))
        .with_retry(fast_retry());

    let record = claimed(&store, body_input()).await;
    let status = pipeline
        .run(record.clone(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Completed);
    assert_eq!(stage_one.calls(), 3);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let store = Arc::new(MemoryTaskStore::new());
    let stage_one = ScriptedClient::new(vec![
        Err(StageError::Transport("down".into())),
        Err(StageError::Transport("down".into())),
        Err(StageError::Transport("down".into())),
        Ok(assessment().to_string()),
    ]);
    let pipeline = Pipeline::new(store.clone(), stage_one.clone(), ScriptedClient::ok(plan()))
        .with_retry(fast_retry());

    let record = claimed(&store, body_input()).await;
    let status = pipeline
        .run(record.clone(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Failed);
    assert_eq!(stage_one.calls(), 3);
}

#[tokio::test]
async fn test_stage_timeout_fails_with_timeout_error() {
    let store = Arc::new(MemoryTaskStore::new());
    let pipeline = Pipeline::new(store.clone(), ScriptedClient::ok(assessment()), Arc::new(HangingClient))
        .with_timeouts(Duration::from_secs(5), Duration::from_millis(50))
        .with_retry(RetryPolicy::None);

    let record = claimed(&store, body_input()).await;
    pipeline.run(record.clone(), &CancellationToken::new()).await.unwrap();

    let stored = store.get_by_id(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    let error = stored.error.unwrap();
    assert_eq!(error.kind, ErrorKind::TimeoutError);
    assert!(error.message.starts_with("stage two"));
}

#[tokio::test]
async fn test_cancellation_fails_task_as_cancelled() {
    let store = Arc::new(MemoryTaskStore::new());
    let pipeline = Pipeline::new(store.clone(), Arc::new(HangingClient), ScriptedClient::ok(plan()));

    let record = claimed(&store, body_input()).await;
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        let record = record.clone();
        async move { pipeline.run(record, &cancel).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let status = handle.await.unwrap().unwrap();
    assert_eq!(status, TaskStatus::Failed);
    let error = store.get_by_id(&record.id).await.unwrap().unwrap().error.unwrap();
    assert_eq!(error.kind, ErrorKind::Cancelled);
}

#[tokio::test]
async fn test_failing_sink_does_not_change_the_task() {
    let store = Arc::new(MemoryTaskStore::new());
    let sink = Arc::new(FailingSink {
        calls: AtomicU32::new(0),
    });
    let pipeline = Pipeline::new(store.clone(), ScriptedClient::ok(assessment()), ScriptedClient::ok(plan()))
        .with_sink(sink.clone());

    let record = claimed(&store, body_input()).await;
    let status = pipeline
        .run(record.clone(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(status, TaskStatus::Completed);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    let stored = store.get_by_id(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert!(stored.result.is_some());
}

#[tokio::test]
async fn test_meal_analysis_completes() {
    let store = Arc::new(MemoryTaskStore::new());
    let stage_one = ScriptedClient::ok(json!({
        "foods": [
            {"name": "Oatmeal", "quantity": "1 bowl", "calories": 300,
             "macronutrients": {"protein": 10, "carbs": 54, "fat": 5}, "category": "grains"},
            {"name": "Banana", "calories": "105 kcal", "category": "fruits"}
        ],
        "mealType": "dinner",
        "confidence": 0.9
    }));
    let stage_two = ScriptedClient::ok(json!({
        "recommendations": ["Add a protein source"],
        "healthScore": 7.5,
        "balance": "carb_heavy"
    }));
    let pipeline = Pipeline::new(store.clone(), stage_one, stage_two);

    let input = TaskInput::meal(
        "user-2",
        Payload::text("A bowl of oatmeal with a banana"),
        MealContext {
            meal_type: Some("breakfast".into()),
            servings: None,
        },
    );
    let record = claimed(&store, input).await;
    pipeline.run(record.clone(), &CancellationToken::new()).await.unwrap();

    let stored = store.get_by_id(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    let Some(AnalysisReport::MealAnalysis(report)) = stored.result else {
        panic!("expected a meal analysis report");
    };
    assert_eq!(report.foods.len(), 2);
    assert_eq!(report.total_calories, 405.0);
    assert_eq!(report.meal_type, MealType::Breakfast);
    assert_eq!(report.health_score, 7.5);
    assert_eq!(report.recommendations, vec!["Add a protein source".to_string()]);
    assert_eq!(report.disclaimer, DISCLAIMER);
}
