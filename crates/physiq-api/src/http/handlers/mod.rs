//! HTTP request handlers.

mod analyses;
mod health;
mod tasks;

pub use analyses::{submit_body, submit_meal, USER_ID_HEADER};
pub use health::{health_check, metrics_handler};
pub use tasks::{get_task, get_task_result, get_task_status};
