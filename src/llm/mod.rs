//! Completion service integration.
//!
//! The pipeline and tools talk to a text-in/text-out completion service
//! through the [`CompletionClient`] trait. The concrete implementation is an
//! OpenAI-compatible REST client; tests substitute scripted mocks.

mod http;

pub use http::HttpCompletionClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request. Each pipeline call type uses a fixed temperature.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.0,
            max_tokens: 1024,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

/// Text-in/text-out completion backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Extract a JSON object from completion output, tolerating markdown fences
/// and surrounding prose. Scorers ask for bare JSON but models don't always
/// comply.
pub fn extract_json_object(raw: &str) -> Result<serde_json::Value, LlmError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e > s => {
            serde_json::from_str(&trimmed[s..=e]).map_err(LlmError::Json)
        }
        _ => Err(LlmError::InvalidResponse {
            reason: "no JSON object found in completion output".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_bare() {
        let value = extract_json_object(r#"{"reason": "on topic", "score": 4}"#).unwrap();
        assert_eq!(value["score"], 4);
    }

    #[test]
    fn extract_json_fenced() {
        let raw = "```json\n{\"reason\": \"x\", \"score\": 2}\n```";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["score"], 2);
    }

    #[test]
    fn extract_json_with_prose() {
        let raw = "Here is the score: {\"reason\": \"partial match\", \"score\": 3} as requested.";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["score"], 3);
    }

    #[test]
    fn extract_json_missing_object() {
        assert!(extract_json_object("no json here").is_err());
    }
}
