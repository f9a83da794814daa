//! Core domain errors and the failure record stored on a task.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest error message persisted on a task.
pub const MAX_ERROR_MESSAGE_BYTES: usize = 2000;

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Submission rejected before a task was created.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Category of a task failure.
///
/// Drives the retry decision in the worker and is exposed to pollers
/// alongside the human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad submission. Never stored on a task, only returned synchronously.
    ValidationError,
    /// Stage call failed in transport, returned a non-success status or an empty body.
    UpstreamModelError,
    /// Stage responded, but the body was not a usable JSON object.
    ParseError,
    /// Stage call exceeded its deadline.
    TimeoutError,
    /// Status or result query on an unknown id.
    TaskNotFound,
    /// Processing was interrupted by worker shutdown or restart.
    Cancelled,
}

impl ErrorKind {
    /// Whether a failure of this kind is worth another attempt with the same prompt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamModelError | Self::TimeoutError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::UpstreamModelError => "upstream_model_error",
            Self::ParseError => "parse_error",
            Self::TimeoutError => "timeout_error",
            Self::TaskNotFound => "task_not_found",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "validation_error" => Some(Self::ValidationError),
            "upstream_model_error" => Some(Self::UpstreamModelError),
            "parse_error" => Some(Self::ParseError),
            "timeout_error" => Some(Self::TimeoutError),
            "task_not_found" => Some(Self::TaskNotFound),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure recorded on a task when it transitions to `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    /// Create a new TaskError, truncating the message to the persisted limit.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > MAX_ERROR_MESSAGE_BYTES {
            let mut cut = MAX_ERROR_MESSAGE_BYTES;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        Self { kind, message }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamModelError, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TimeoutError, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }
}
