//! OpenAI compatible chat completions client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{StageClient, StageError, StageRequest};

const TEMPERATURE: f64 = 0.3;

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Client for `/chat/completions` style APIs.
pub struct OpenAiChatClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Result<Self, StageError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
        })
    }

    fn body(&self, request: &StageRequest) -> Value {
        let user = if request.images.is_empty() {
            json!(request.prompt)
        } else {
            let mut parts = vec![json!({"type": "text", "text": request.prompt})];
            parts.extend(request.images.iter().map(|image| {
                json!({
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:{};base64,{}", image.mime_type, image.data)
                    }
                })
            }));
            Value::Array(parts)
        };

        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": user},
            ],
            "temperature": TEMPERATURE,
            "response_format": {"type": "json_object"},
        })
    }
}

#[async_trait]
impl StageClient for OpenAiChatClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: StageRequest) -> Result<String, StageError> {
        debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            images = request.images.len(),
            "Sending chat completion request"
        );

        let mut builder = self.http.post(&self.endpoint).json(&self.body(&request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(StageError::status(status, &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| StageError::InvalidResponse(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| StageError::InvalidResponse("no choices in response".into()))?;
        choice.message.content.ok_or(StageError::Empty)
    }
}
