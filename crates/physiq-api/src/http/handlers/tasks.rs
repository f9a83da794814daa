//! Status and result handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use physiq_core::{TaskId, TaskOutcome, TaskStatus};

use crate::error::ApiError;
use crate::http::responses::{ResultResponse, TaskResponse};
use crate::state::AppState;

/// Full task view.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.tasks.get(&TaskId::new(id)).await?;
    Ok(Json(TaskResponse::from(record)))
}

pub async fn get_task_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.tasks.status(&TaskId::new(id)).await?;
    Ok(Json(summary))
}

/// 200 with the report, 202 while in flight, 422 with the recorded error.
pub async fn get_task_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let task_id = TaskId::new(id);
    let (code, body) = match state.tasks.outcome(&task_id).await? {
        TaskOutcome::Completed(result) => (
            StatusCode::OK,
            ResultResponse::Completed {
                task_id,
                status: TaskStatus::Completed,
                result,
            },
        ),
        TaskOutcome::Failed(error) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            ResultResponse::Failed {
                task_id,
                status: TaskStatus::Failed,
                error,
            },
        ),
        TaskOutcome::InFlight { status, progress } => (
            StatusCode::ACCEPTED,
            ResultResponse::Processing {
                task_id,
                status,
                progress,
                message: "still processing",
            },
        ),
    };
    Ok((code, Json(body)))
}
