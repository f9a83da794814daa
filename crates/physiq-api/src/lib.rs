//! physiq API Library
//!
//! Accepts analysis submissions, enqueues them in the shared task store and
//! answers status and result polls. Inference happens in the worker.

pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod service;
pub mod state;

pub use config::{Args, Config};
pub use error::ApiError;
pub use service::TaskService;
pub use state::AppState;
