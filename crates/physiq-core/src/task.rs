//! Task input, the persisted task record, and the views handed to pollers.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, TaskError};
use crate::report::AnalysisReport;
use crate::{TaskId, TaskStatus, WorkerId};

/// Progress checkpoints written by the worker while a task is processing.
pub mod progress {
    /// Task claimed by a worker.
    pub const CLAIMED: u8 = 10;
    /// Stage one prompt built, call about to start.
    pub const STAGE_ONE_STARTED: u8 = 30;
    /// Stage one responded.
    pub const STAGE_ONE_RESPONDED: u8 = 60;
    /// Stage one output sanitized.
    pub const STAGE_ONE_SANITIZED: u8 = 80;
    /// Stage two responded.
    pub const STAGE_TWO_RESPONDED: u8 = 90;
    pub const DONE: u8 = 100;
}

/// The analysis family a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Stage one assesses a body photo, stage two derives a nutrition plan.
    BodyAnalysis,
    /// Stage one breaks a meal into foods, stage two scores the meal.
    MealAnalysis,
}

impl TaskKind {
    pub const ALL: [TaskKind; 2] = [TaskKind::BodyAnalysis, TaskKind::MealAnalysis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BodyAnalysis => "body_analysis",
            Self::MealAnalysis => "meal_analysis",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "body_analysis" => Ok(Self::BodyAnalysis),
            "meal_analysis" => Ok(Self::MealAnalysis),
            other => Err(CoreError::Serialization(format!(
                "unknown task kind '{}'",
                other
            ))),
        }
    }
}

/// What the caller submitted for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Base64 encoded image. A `data:<mime>;base64,` prefix is accepted and stripped.
    Image {
        data: String,
        #[serde(default, rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    /// Free-text description (e.g. a list of ingredients).
    Text { description: String },
}

impl Payload {
    pub fn image(data: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: None,
        }
    }

    pub fn text(description: impl Into<String>) -> Self {
        Self::Text {
            description: description.into(),
        }
    }

    /// Image bytes as base64, if this is an image payload.
    pub fn image_data(&self) -> Option<&str> {
        match self {
            Self::Image { data, .. } => Some(data),
            Self::Text { .. } => None,
        }
    }

    fn normalize(self) -> Result<Self, CoreError> {
        match self {
            Self::Image { data, mime_type } => {
                let (prefix_mime, body) = split_data_url(data.trim());
                let data: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
                if data.is_empty() {
                    return Err(CoreError::Validation("image payload is empty".into()));
                }
                STANDARD
                    .decode(data.as_bytes())
                    .map_err(|e| CoreError::Validation(format!("image is not valid base64: {}", e)))?;
                Ok(Self::Image {
                    data,
                    mime_type: mime_type.or(prefix_mime),
                })
            }
            Self::Text { description } => {
                let description = description.trim().to_string();
                if description.is_empty() {
                    return Err(CoreError::Validation("text payload is empty".into()));
                }
                Ok(Self::Text { description })
            }
        }
    }
}

/// Split `data:image/png;base64,AAAA` into (`Some("image/png")`, `"AAAA"`).
fn split_data_url(data: &str) -> (Option<String>, &str) {
    let Some(rest) = data.strip_prefix("data:") else {
        return (None, data);
    };
    match rest.split_once(',') {
        Some((meta, body)) => {
            let mime = meta.split(';').next().filter(|m| !m.is_empty());
            (mime.map(str::to_string), body)
        }
        None => (None, data),
    }
}

/// Personal context supplied with a body analysis.
///
/// Free-form on the way in; the sanitizer maps it onto bounded values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, alias = "height", skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
    #[serde(
        default,
        alias = "weight",
        alias = "currentWeight",
        skip_serializing_if = "Option::is_none"
    )]
    pub weight_kg: Option<f64>,
    #[serde(default, alias = "targetWeight", skip_serializing_if = "Option::is_none")]
    pub target_weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_level: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<String>,
}

/// Context supplied with a meal analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<f64>,
}

/// Immutable input of a task, fixed at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub kind: TaskKind,
    /// Authenticated caller, threaded through to the completion hand-off.
    pub user_id: String,
    pub payload: Payload,
    #[serde(default)]
    pub profile: SubjectProfile,
    #[serde(default)]
    pub meal: MealContext,
}

impl TaskInput {
    pub fn body(user_id: impl Into<String>, payload: Payload, profile: SubjectProfile) -> Self {
        Self {
            kind: TaskKind::BodyAnalysis,
            user_id: user_id.into(),
            payload,
            profile,
            meal: MealContext::default(),
        }
    }

    pub fn meal(user_id: impl Into<String>, payload: Payload, meal: MealContext) -> Self {
        Self {
            kind: TaskKind::MealAnalysis,
            user_id: user_id.into(),
            payload,
            profile: SubjectProfile::default(),
            meal,
        }
    }

    /// Check and normalize the input before it is enqueued.
    ///
    /// The payload must be non-empty; image payloads must decode as base64.
    pub fn validated(self) -> Result<Self, CoreError> {
        if self.user_id.trim().is_empty() {
            return Err(CoreError::Validation("user id is required".into()));
        }
        if let Some(servings) = self.meal.servings {
            if !servings.is_finite() || servings <= 0.0 {
                return Err(CoreError::Validation(
                    "servings must be a positive number".into(),
                ));
            }
        }
        let payload = self.payload.normalize()?;
        Ok(Self { payload, ..self })
    }
}

/// A task as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub status: TaskStatus,
    pub progress: u8,
    pub input: TaskInput,
    /// Present iff `status == Completed`.
    pub result: Option<AnalysisReport>,
    /// Present iff `status == Failed`.
    pub error: Option<TaskError>,
    /// Worker currently (or last) holding the task.
    pub worker_id: Option<WorkerId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Create a freshly queued record.
    pub fn new(input: TaskInput) -> Self {
        Self {
            id: TaskId::generate(),
            status: TaskStatus::Queued,
            progress: 0,
            input,
            result: None,
            error: None,
            worker_id: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.input.kind
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.id.clone(),
            kind: self.input.kind,
            status: self.status,
            progress: self.progress,
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }

    /// Collapse the record into what a result query may see.
    pub fn into_outcome(self) -> TaskOutcome {
        match (self.status, self.result, self.error) {
            (TaskStatus::Completed, Some(report), _) => TaskOutcome::Completed(report),
            (TaskStatus::Failed, _, Some(error)) => TaskOutcome::Failed(error),
            (status, _, _) => TaskOutcome::InFlight {
                status,
                progress: self.progress,
            },
        }
    }
}

/// Status view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Result view of a task: never carries both a report and an error.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    InFlight { status: TaskStatus, progress: u8 },
    Completed(AnalysisReport),
    Failed(TaskError),
}
