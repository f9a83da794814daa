//! API error type.

use thiserror::Error;

use physiq_core::{CoreError, ErrorKind, TaskId};
use physiq_store::StoreError;

/// Errors returned by submission and query operations.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Taxonomy kind reported to the caller.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError.as_str(),
            Self::PayloadTooLarge => "payload_too_large",
            Self::NotFound(_) => ErrorKind::TaskNotFound.as_str(),
            Self::Store(_) => "internal_error",
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::TaskNotFound(id) => Self::NotFound(TaskId::new(id)),
            other => Self::Validation(other.to_string()),
        }
    }
}
