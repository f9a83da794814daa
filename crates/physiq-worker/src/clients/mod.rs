//! Adapters to the external inference services.
//!
//! A stage call takes a prompt (plus optional images) and returns the raw
//! text the model produced. Interpreting that text is the sanitizer's job.

mod ollama;
mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::ValueEnum;
use thiserror::Error;

use physiq_core::TaskError;

pub use ollama::OllamaClient;
pub use openai::OpenAiChatClient;

/// Longest slice of an upstream error body kept in a [`StageError`].
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Which of the two chained calls is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    One,
    Two,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::One => f.write_str("stage one"),
            Self::Two => f.write_str("stage two"),
        }
    }
}

/// Base64 image attached to a stage call.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub data: String,
    pub mime_type: String,
}

/// A single inference request.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRequest {
    pub system: String,
    pub prompt: String,
    pub images: Vec<ImageInput>,
}

/// Errors returned by a stage call.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream returned an empty response")]
    Empty,

    #[error("unexpected response envelope: {0}")]
    InvalidResponse(String),

    #[error("call exceeded its {}s deadline", .0.as_secs())]
    Timeout(Duration),

    #[error("call cancelled")]
    Cancelled,
}

impl StageError {
    pub(crate) fn status(status: reqwest::StatusCode, body: &str) -> Self {
        Self::Status {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        }
    }

    /// Whether the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Empty | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::Cancelled => false,
        }
    }

    /// Convert into the error recorded on the task.
    pub fn into_task_error(self, stage: Stage) -> TaskError {
        match self {
            Self::Timeout(_) => TaskError::timeout(format!("{}: {}", stage, self)),
            Self::Cancelled => {
                TaskError::cancelled(format!("{}: interrupted by worker shutdown", stage))
            }
            other => TaskError::upstream(format!("{}: {}", stage, other)),
        }
    }
}

impl From<reqwest::Error> for StageError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// An inference backend.
#[async_trait]
pub trait StageClient: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Send the request and return the model's raw text.
    async fn generate(&self, request: StageRequest) -> Result<String, StageError>;
}

/// Supported inference backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    /// Ollama `/api/generate`.
    Ollama,
    /// OpenAI compatible `/chat/completions`.
    Openai,
}

/// Connection settings for one stage.
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Deadline for a single attempt.
    pub timeout: Duration,
}

/// Build the client described by `config`.
pub fn build(config: &StageConfig) -> Result<Arc<dyn StageClient>, StageError> {
    let client: Arc<dyn StageClient> = match config.provider {
        Provider::Ollama => Arc::new(OllamaClient::new(&config.base_url, &config.model)?),
        Provider::Openai => Arc::new(OpenAiChatClient::new(
            &config.base_url,
            &config.model,
            config.api_key.clone(),
        )?),
    };
    Ok(client)
}
