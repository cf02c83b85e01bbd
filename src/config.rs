//! Configuration types, loaded from the environment.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Completion service configuration (OpenAI-compatible chat endpoint).
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Full URL of the chat completions endpoint.
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: String,
}

/// Embedding service configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Full URL of the embeddings endpoint.
    pub endpoint: String,
    pub api_key: SecretString,
    pub model: String,
}

/// Hybrid search service configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Base URL of the search service (no trailing slash).
    pub endpoint: String,
    pub api_key: SecretString,
    pub index_name: String,
}

/// Email delegation service configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Base URL of the delegation API (no trailing slash).
    pub base_url: String,
}

/// Top-level settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub completion: CompletionConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub email: EmailConfig,
    /// Maximum (question, answer) turns kept per conversation.
    pub memory_cap: usize,
    /// Default approval timeout in minutes.
    pub approval_timeout_minutes: i64,
    /// Recipient for dynamically planned escalation emails.
    pub default_recipient: String,
    /// HTTP listen port.
    pub port: u16,
}

impl Settings {
    /// Load settings from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let completion = CompletionConfig {
            endpoint: require("PA_COMPLETION_ENDPOINT")?,
            api_key: SecretString::from(require("PA_COMPLETION_API_KEY")?),
            model: std::env::var("PA_COMPLETION_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
        };
        let embedding = EmbeddingConfig {
            endpoint: require("PA_EMBEDDING_ENDPOINT")?,
            api_key: SecretString::from(require("PA_EMBEDDING_API_KEY")?),
            model: std::env::var("PA_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
        };
        let search = SearchConfig {
            endpoint: require("PA_SEARCH_ENDPOINT")?,
            api_key: SecretString::from(require("PA_SEARCH_API_KEY")?),
            index_name: require("PA_SEARCH_INDEX")?,
        };
        let email = EmailConfig {
            base_url: std::env::var("PA_EMAIL_API_URL")
                .unwrap_or_else(|_| "https://graph.microsoft.com/v1.0".to_string()),
        };

        let memory_cap = parse_var("PA_MEMORY_CAP", 5usize)?;
        let approval_timeout_minutes = parse_var("PA_APPROVAL_TIMEOUT_MIN", 30i64)?;
        let default_recipient = std::env::var("PA_DEFAULT_RECIPIENT")
            .unwrap_or_else(|_| "procurement@example.edu".to_string());
        let port = parse_var("PA_PORT", 8080u16)?;

        Ok(Self {
            completion,
            embedding,
            search,
            email,
            memory_cap,
            approval_timeout_minutes,
            default_recipient,
            port,
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_uses_default_when_unset() {
        let cap: usize = parse_var("PA_TEST_UNSET_VAR", 5).unwrap();
        assert_eq!(cap, 5);
    }
}
