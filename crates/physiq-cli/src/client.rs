//! HTTP client for the analysis API.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_ID_HEADER: &str = "x-user-id";

/// Outcome of a result query.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPoll {
    /// 200: the analysis report.
    Completed(Value),
    /// 422: the recorded error.
    Failed(Value),
    /// 202: status and progress so far.
    Pending(Value),
}

/// HTTP client for the REST API.
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
    user_id: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client. `user_id` is sent as the caller identity.
    pub fn new(base_url: &str, user_id: Option<String>) -> Result<Self, ClientError> {
        let inner = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id,
        })
    }

    /// Submit an analysis to `/v1/analyses/{kind}`. Returns `{taskId, status}`.
    pub async fn submit(&self, kind: &str, body: &Value) -> Result<Value, ClientError> {
        let url = format!("{}/v1/analyses/{}", self.base_url, kind);
        debug!(url = %url, "POST request");

        let mut request = self.inner.post(&url).json(body);
        if let Some(user_id) = &self.user_id {
            request = request.header(USER_ID_HEADER, user_id);
        }
        let (status, body) = decode(request.send().await?).await?;
        match status {
            200..=299 => Ok(body),
            _ => Err(api_error(status, &body)),
        }
    }

    pub async fn status(&self, id: &str) -> Result<Value, ClientError> {
        let (status, body) = self.get(&format!("/v1/tasks/{}/status", id)).await?;
        match status {
            200 => Ok(body),
            _ => Err(api_error(status, &body)),
        }
    }

    pub async fn result(&self, id: &str) -> Result<ResultPoll, ClientError> {
        let (status, body) = self.get(&format!("/v1/tasks/{}/result", id)).await?;
        match status {
            200 => Ok(ResultPoll::Completed(body)),
            202 => Ok(ResultPoll::Pending(body)),
            422 => Ok(ResultPoll::Failed(body)),
            _ => Err(api_error(status, &body)),
        }
    }

    /// Poll the result until the task finishes or `timeout` elapses.
    pub async fn wait(
        &self,
        id: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.result(id).await? {
                ResultPoll::Completed(body) => return Ok(body),
                ResultPoll::Failed(body) => return Err(task_failed(&body)),
                ResultPoll::Pending(body) => {
                    debug!(
                        task_id = %id,
                        status = %body["status"],
                        progress = %body["progress"],
                        "Task still running"
                    );
                }
            }
            if Instant::now() + interval > deadline {
                return Err(ClientError::Timeout(timeout));
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn get(&self, path: &str) -> Result<(u16, Value), ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET request");
        decode(self.inner.get(&url).send().await?).await
    }
}

async fn decode(response: reqwest::Response) -> Result<(u16, Value), ClientError> {
    let status = response.status().as_u16();
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok((status, Value::Null));
    }
    let body = serde_json::from_str(&text).map_err(|e| {
        ClientError::Serialization(format!("HTTP {} with non-JSON body: {}", status, e))
    })?;
    Ok((status, body))
}

fn api_error(status: u16, body: &Value) -> ClientError {
    ClientError::Api {
        status,
        kind: body["kind"].as_str().unwrap_or("unknown").to_string(),
        message: body["error"].as_str().unwrap_or("no error message").to_string(),
    }
}

/// Build the error for a task whose result came back as failed.
pub fn task_failed(body: &Value) -> ClientError {
    ClientError::TaskFailed {
        kind: body["error"]["kind"].as_str().unwrap_or("unknown").to_string(),
        message: body["error"]["message"].as_str().unwrap_or("").to_string(),
    }
}
