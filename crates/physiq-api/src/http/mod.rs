//! HTTP server for the analysis API.
//!
//! Provides endpoints for:
//! - Task submission (`/v1/analyses/body`, `/v1/analyses/meal`)
//! - Status and result polling (`/v1/tasks/:id`, `/status`, `/result`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

pub use handlers::USER_ID_HEADER;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Submission
        .route("/v1/analyses/body", post(handlers::submit_body))
        .route("/v1/analyses/meal", post(handlers::submit_meal))
        // Queries
        .route("/v1/tasks/:id", get(handlers::get_task))
        .route("/v1/tasks/:id/status", get(handlers::get_task_status))
        .route("/v1/tasks/:id/result", get(handlers::get_task_result))
        // Observability
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
