//! HTTP request and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use physiq_core::{
    AnalysisReport, MealContext, Payload, SubjectProfile, TaskError, TaskId, TaskInput, TaskKind,
    TaskRecord, TaskStatus,
};

use crate::error::ApiError;

// ============================================================================
// Submission types
// ============================================================================

/// Request body for `POST /v1/analyses/body`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyAnalysisRequest {
    /// Base64 photo, optionally as a data URL.
    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub mime_type: Option<String>,

    #[serde(flatten)]
    pub profile: SubjectProfile,
}

impl BodyAnalysisRequest {
    pub fn into_input(self, user_id: String) -> TaskInput {
        let payload = Payload::Image {
            data: self.image,
            mime_type: self.mime_type,
        };
        TaskInput::body(user_id, payload, self.profile)
    }
}

/// Request body for `POST /v1/analyses/meal`.
///
/// Either a photo or a free-text ingredient description; the photo wins when
/// both are sent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealAnalysisRequest {
    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub mime_type: Option<String>,

    #[serde(default)]
    pub ingredients: Option<String>,

    #[serde(flatten)]
    pub meal: MealContext,
}

impl MealAnalysisRequest {
    pub fn into_input(self, user_id: String) -> Result<TaskInput, ApiError> {
        let payload = match (self.image, self.ingredients) {
            (Some(data), _) => Payload::Image {
                data,
                mime_type: self.mime_type,
            },
            (None, Some(description)) => Payload::Text { description },
            (None, None) => {
                return Err(ApiError::Validation(
                    "either image or ingredients is required".into(),
                ))
            }
        };
        Ok(TaskInput::meal(user_id, payload, self.meal))
    }
}

/// Response body for a successful submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

// ============================================================================
// Query types
// ============================================================================

/// Full view of a task. `result` and `error` are never both present.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl From<TaskRecord> for TaskResponse {
    fn from(record: TaskRecord) -> Self {
        let (result, error) = match record.status {
            TaskStatus::Completed => (record.result, None),
            TaskStatus::Failed => (None, record.error),
            _ => (None, None),
        };
        Self {
            task_id: record.id,
            kind: record.input.kind,
            status: record.status,
            progress: record.progress,
            created_at: record.created_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
            result,
            error,
        }
    }
}

/// Body of `GET /v1/tasks/:id/result`, one shape per outcome.
#[derive(Debug, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum ResultResponse {
    Completed {
        task_id: TaskId,
        status: TaskStatus,
        result: AnalysisReport,
    },
    Failed {
        task_id: TaskId,
        status: TaskStatus,
        error: TaskError,
    },
    Processing {
        task_id: TaskId,
        status: TaskStatus,
        progress: u8,
        message: &'static str,
    },
}

// ============================================================================
// Error types
// ============================================================================

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(e) => {
                error!(error = %e, "Task store error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorResponse {
            error: match &self {
                Self::Store(_) => "internal storage error".to_string(),
                other => other.to_string(),
            },
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}
