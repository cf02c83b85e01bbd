//! OpenAI-compatible HTTP completion client.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::config::CompletionConfig;
use crate::error::LlmError;

use super::{CompletionClient, CompletionRequest, CompletionResponse};

/// REST client for a chat-completions endpoint.
pub struct HttpCompletionClient {
    client: reqwest::Client,
    config: CompletionConfig,
}

#[derive(Deserialize)]
struct ChatCompletionBody {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl HttpCompletionClient {
    pub fn new(config: CompletionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("api-key", self.config.api_key.expose_secret())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::BadStatus {
                status: status.as_u16(),
                detail,
            });
        }

        let parsed: ChatCompletionBody =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                reason: e.to_string(),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                reason: "completion response had no choices".to_string(),
            })?;

        debug!(model = %self.config.model, chars = content.len(), "Completion received");

        Ok(CompletionResponse { content })
    }
}
