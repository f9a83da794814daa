//! Two-stage analysis of a single claimed task.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use physiq_core::sanitize::{
    decode_object, sanitize_body_assessment, sanitize_meal_breakdown, sanitize_meal_feedback,
    sanitize_nutrition_plan, strip_code_fence, ParseError,
};
use physiq_core::task::progress;
use physiq_core::{
    AnalysisReport, BodyAnalysisReport, MealAnalysisReport, TaskError, TaskId, TaskKind,
    TaskRecord, TaskStatus,
};
use physiq_store::{StoreError, TaskStore};

use crate::clients::{Stage, StageClient, StageError, StageRequest};
use crate::prompts;
use crate::retry::{with_retry, RetryPolicy};
use crate::sink::{CompletedTask, CompletionSink};

const DEFAULT_STAGE_ONE_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_STAGE_TWO_TIMEOUT: Duration = Duration::from_secs(60);

/// Drives one task through both stages and records the outcome.
pub struct Pipeline {
    store: Arc<dyn TaskStore>,
    stage_one: Arc<dyn StageClient>,
    stage_two: Arc<dyn StageClient>,
    stage_one_timeout: Duration,
    stage_two_timeout: Duration,
    retry: RetryPolicy,
    sinks: Vec<Arc<dyn CompletionSink>>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn TaskStore>,
        stage_one: Arc<dyn StageClient>,
        stage_two: Arc<dyn StageClient>,
    ) -> Self {
        Self {
            store,
            stage_one,
            stage_two,
            stage_one_timeout: DEFAULT_STAGE_ONE_TIMEOUT,
            stage_two_timeout: DEFAULT_STAGE_TWO_TIMEOUT,
            retry: RetryPolicy::default(),
            sinks: Vec::new(),
        }
    }

    /// Per-attempt deadlines for the two stage calls.
    pub fn with_timeouts(mut self, stage_one: Duration, stage_two: Duration) -> Self {
        self.stage_one_timeout = stage_one;
        self.stage_two_timeout = stage_two;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn CompletionSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Process a task already claimed (status `processing`) and write the
    /// terminal state. Returns that state.
    pub async fn run(
        &self,
        record: TaskRecord,
        cancel: &CancellationToken,
    ) -> Result<TaskStatus, StoreError> {
        let id = record.id.clone();
        let kind = record.kind();
        info!(task_id = %id, kind = %kind, "Processing task");

        match self.analyse(&record, cancel).await {
            Ok(report) => {
                self.store.complete(&id, &report).await?;
                info!(task_id = %id, kind = %kind, "Task completed");
                self.notify(&record, report).await;
                Ok(TaskStatus::Completed)
            }
            Err(task_error) => {
                warn!(
                    task_id = %id,
                    kind = %kind,
                    error_kind = %task_error.kind,
                    error = %task_error.message,
                    "Task failed"
                );
                self.store.fail(&id, &task_error).await?;
                Ok(TaskStatus::Failed)
            }
        }
    }

    async fn analyse(
        &self,
        record: &TaskRecord,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, TaskError> {
        match record.kind() {
            TaskKind::BodyAnalysis => self
                .analyse_body(record, cancel)
                .await
                .map(AnalysisReport::BodyAnalysis),
            TaskKind::MealAnalysis => self
                .analyse_meal(record, cancel)
                .await
                .map(AnalysisReport::MealAnalysis),
        }
    }

    async fn analyse_body(
        &self,
        record: &TaskRecord,
        cancel: &CancellationToken,
    ) -> Result<BodyAnalysisReport, TaskError> {
        let id = &record.id;
        let input = &record.input;

        let request = prompts::body_assessment(&input.payload, &input.profile);
        self.progress(id, progress::STAGE_ONE_STARTED).await;
        let raw = self.call(Stage::One, request, cancel).await?;
        self.progress(id, progress::STAGE_ONE_RESPONDED).await;

        let assessment = sanitize_body_assessment(&decode(Stage::One, &raw)?, &input.profile);
        self.progress(id, progress::STAGE_ONE_SANITIZED).await;

        let request = prompts::nutrition_plan(&assessment, &input.profile);
        let raw = self.call(Stage::Two, request, cancel).await?;
        self.progress(id, progress::STAGE_TWO_RESPONDED).await;

        let plan = sanitize_nutrition_plan(&decode(Stage::Two, &raw)?);
        Ok(BodyAnalysisReport::assemble(assessment, plan))
    }

    async fn analyse_meal(
        &self,
        record: &TaskRecord,
        cancel: &CancellationToken,
    ) -> Result<MealAnalysisReport, TaskError> {
        let id = &record.id;
        let input = &record.input;

        let request = prompts::meal_breakdown(&input.payload, &input.meal);
        self.progress(id, progress::STAGE_ONE_STARTED).await;
        let raw = self.call(Stage::One, request, cancel).await?;
        self.progress(id, progress::STAGE_ONE_RESPONDED).await;

        let breakdown = sanitize_meal_breakdown(&decode(Stage::One, &raw)?, &input.meal);
        self.progress(id, progress::STAGE_ONE_SANITIZED).await;

        let request = prompts::meal_feedback(&breakdown);
        let raw = self.call(Stage::Two, request, cancel).await?;
        self.progress(id, progress::STAGE_TWO_RESPONDED).await;

        let feedback = sanitize_meal_feedback(&decode(Stage::Two, &raw)?);
        Ok(MealAnalysisReport::assemble(breakdown, feedback))
    }

    /// Call a stage with its deadline, retrying transient failures.
    async fn call(
        &self,
        stage: Stage,
        request: StageRequest,
        cancel: &CancellationToken,
    ) -> Result<String, TaskError> {
        let (client, deadline) = match stage {
            Stage::One => (&self.stage_one, self.stage_one_timeout),
            Stage::Two => (&self.stage_two, self.stage_two_timeout),
        };

        with_retry(&self.retry, cancel, |attempt| {
            let request = request.clone();
            async move {
                debug!(stage = %stage, client = client.name(), attempt, "Calling stage");
                let text = tokio::select! {
                    _ = cancel.cancelled() => return Err(StageError::Cancelled),
                    result = tokio::time::timeout(deadline, client.generate(request)) => {
                        result.map_err(|_| StageError::Timeout(deadline))??
                    }
                };
                if strip_code_fence(&text).is_empty() {
                    return Err(StageError::Empty);
                }
                Ok(text)
            }
        })
        .await
        .map_err(|e| e.into_task_error(stage))
    }

    /// Progress is advisory: a failed write is logged and processing goes on.
    async fn progress(&self, id: &TaskId, value: u8) {
        match self.store.update_progress(id, value).await {
            Ok(()) => debug!(task_id = %id, progress = value, "Progress updated"),
            Err(e) => warn!(task_id = %id, progress = value, error = %e, "Progress update failed"),
        }
    }

    async fn notify(&self, record: &TaskRecord, report: AnalysisReport) {
        if self.sinks.is_empty() {
            return;
        }
        let completed = CompletedTask {
            task_id: record.id.clone(),
            user_id: record.input.user_id.clone(),
            kind: record.kind(),
            result: report,
            completed_at: Utc::now(),
        };
        for sink in &self.sinks {
            if let Err(e) = sink.on_completed(&completed).await {
                error!(
                    task_id = %record.id,
                    sink = sink.name(),
                    error = %e,
                    "Completion hand-off failed"
                );
            }
        }
    }
}

fn decode(stage: Stage, raw: &str) -> Result<Value, TaskError> {
    decode_object(raw).map_err(|e| match e {
        ParseError::Empty => StageError::Empty.into_task_error(stage),
        other => TaskError::parse(format!("{}: {}", stage, other)),
    })
}
