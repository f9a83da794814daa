//! Submission handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use physiq_core::TaskInput;

use crate::error::ApiError;
use crate::http::responses::{BodyAnalysisRequest, MealAnalysisRequest, SubmitResponse};
use crate::state::AppState;

/// Header carrying the caller identity, authenticated upstream.
pub const USER_ID_HEADER: &str = "x-user-id";

const ANONYMOUS: &str = "anonymous";

fn caller(headers: &HeaderMap) -> String {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge,
            _ => ApiError::Validation(rejection.body_text()),
        })
}

async fn submit(state: &AppState, input: TaskInput) -> Result<impl IntoResponse, ApiError> {
    let record = state.tasks.submit(input).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id: record.id,
            status: record.status,
        }),
    ))
}

/// Submit a body photo for analysis.
pub async fn submit_body(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<BodyAnalysisRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let input = body(payload)?.into_input(caller(&headers));
    submit(&state, input).await
}

/// Submit a meal photo or ingredient list for analysis.
pub async fn submit_meal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<MealAnalysisRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let input = body(payload)?.into_input(caller(&headers))?;
    submit(&state, input).await
}
