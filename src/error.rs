//! Error types for Procure Assist.

use uuid::Uuid;

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Completion error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Invalid request: {0}")]
    Validation(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Completion-service errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Completion request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Completion service returned status {status}: {detail}")]
    BadStatus { status: u16, detail: String },

    #[error("Invalid response from completion service: {reason}")]
    InvalidResponse { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Search-service errors. Retrieval degrades through these rather than
/// surfacing them to the pipeline; see `HybridRetriever`.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Search service returned status {status}")]
    BadStatus { status: u16 },

    #[error("Embedding generation failed: {reason}")]
    EmbeddingFailed { reason: String },
}

/// Email delegation errors.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Email send failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Email service returned status {status}: {detail}")]
    SendRejected { status: u16, detail: String },
}

/// Approval errors. Registry resolution failures (non-owner, already
/// resolved) report as `false` from the registry itself; these variants
/// cover the executor's resume-time checks.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("Approval request {id} not found")]
    NotFound { id: Uuid },

    #[error("Approval request {id} has not been approved")]
    NotApproved { id: Uuid },

    #[error("Approval request {id} has expired")]
    Expired { id: Uuid },
}

/// Workflow execution errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow {id} not found")]
    NotFound { id: Uuid },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("No step awaiting approval for this response")]
    NoStepAwaitingApproval,

    #[error("Step failed: {0}")]
    StepFailed(String),
}

/// Pipeline-stage errors. Per-document grading/scoring failures are absorbed
/// inside the pipeline and never reach this enum.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Query rewrite failed: {0}")]
    Rewrite(String),

    #[error("Answer generation failed: {0}")]
    Generation(String),

    #[error("Fallback generation failed: {0}")]
    Fallback(String),
}

/// Result type alias for the assistant.
pub type Result<T> = std::result::Result<T, Error>;
