//! Error types for the CLI client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to the API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error body.
    #[error("API error ({status}, {kind}): {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },

    /// The analysis finished as failed.
    #[error("task failed ({kind}): {message}")]
    TaskFailed { kind: String, message: String },

    /// `wait` gave up before the task finished.
    #[error("task still running after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Reading an input file failed.
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}
