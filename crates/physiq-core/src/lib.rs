//! physiq core domain types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network
//! - Database
//! - Runtime specifics
//!
//! Task lifecycle, analysis records, and the decoder/sanitizer that turns
//! untrusted model text into those records all live here.

pub mod body;
pub mod error;
pub mod ids;
pub mod meal;
pub mod nutrition;
pub mod report;
pub mod sanitize;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::{CoreError, ErrorKind, TaskError};
pub use ids::{TaskId, WorkerId};
pub use report::{AnalysisReport, BodyAnalysisReport, MealAnalysisReport, DISCLAIMER};
pub use status::TaskStatus;
pub use task::{
    MealContext, Payload, SubjectProfile, TaskInput, TaskKind, TaskOutcome, TaskRecord,
    TaskSummary,
};
