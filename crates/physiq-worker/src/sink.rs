//! Hand-off of completed analyses to downstream collaborators.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use physiq_core::{AnalysisReport, TaskId, TaskKind};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// A task that just reached `completed`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedTask {
    pub task_id: TaskId,
    pub user_id: String,
    pub kind: TaskKind,
    pub result: AnalysisReport,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("receiver returned HTTP {0}")]
    Status(u16),
}

/// Receives completed tasks. Failures are logged by the caller and never
/// change the task.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    fn name(&self) -> &str;

    async fn on_completed(&self, task: &CompletedTask) -> Result<(), SinkError>;
}

/// Logs every completion.
pub struct LogSink;

#[async_trait]
impl CompletionSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_completed(&self, task: &CompletedTask) -> Result<(), SinkError> {
        info!(
            task_id = %task.task_id,
            user_id = %task.user_id,
            kind = %task.kind,
            "Analysis completed"
        );
        Ok(())
    }
}

/// POSTs each completion as JSON to a fixed URL.
pub struct WebhookSink {
    http: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| SinkError::Delivery(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CompletionSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn on_completed(&self, task: &CompletedTask) -> Result<(), SinkError> {
        let response = self
            .http
            .post(&self.url)
            .json(task)
            .send()
            .await
            .map_err(|e| SinkError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
