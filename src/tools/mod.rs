//! Workflow tools.
//!
//! The tool surface is a closed set: knowledge-base retrieval, message
//! drafting, and message sending. Steps refer to tools by wire name; the
//! registry resolves names to variants at plan time so unknown tools fail
//! before execution starts.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::email::{simulated_send, EmailDelegate, OutboundEmail, SenderIdentity};
use crate::error::{Error, WorkflowError};
use crate::llm::{ChatMessage, CompletionClient, CompletionRequest};
use crate::pipeline::RagPipeline;

const DRAFT_TEMPERATURE: f32 = 0.3;

/// The closed set of tools a workflow step may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Retrieval,
    DraftMessage,
    SendMessage,
}

impl ToolKind {
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Retrieval => "retrieval",
            ToolKind::DraftMessage => "draft_communication",
            ToolKind::SendMessage => "send_communication",
        }
    }

    /// Sending leaves the system; it is the only gated tool.
    pub fn requires_approval(self) -> bool {
        matches!(self, ToolKind::SendMessage)
    }
}

/// Per-invocation context a tool may need.
pub struct ToolContext {
    pub user_id: String,
    pub conversation_id: String,
    pub identity: Option<SenderIdentity>,
}

/// Seam between the workflow executor and the tool implementations.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    fn resolve(&self, name: &str) -> Option<ToolKind>;
    fn default_recipient(&self) -> &str;
    /// Run one tool. Errors here mark the owning step failed; they do not
    /// crash the executor.
    async fn execute(
        &self,
        kind: ToolKind,
        args: &Value,
        ctx: &ToolContext,
    ) -> Result<String, Error>;
}

/// Resolves tool names and dispatches execution.
pub struct ToolRegistry {
    pipeline: Arc<RagPipeline>,
    llm: Arc<dyn CompletionClient>,
    email: Arc<dyn EmailDelegate>,
    default_recipient: String,
}

impl ToolRegistry {
    pub fn new(
        pipeline: Arc<RagPipeline>,
        llm: Arc<dyn CompletionClient>,
        email: Arc<dyn EmailDelegate>,
        default_recipient: String,
    ) -> Self {
        Self {
            pipeline,
            llm,
            email,
            default_recipient,
        }
    }

    async fn run_retrieval(&self, args: &Value, ctx: &ToolContext) -> Result<String, Error> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("retrieval requires a 'query' argument".into()))?;

        let outcome = self.pipeline.answer(query, &ctx.conversation_id).await?;
        Ok(outcome.answer)
    }

    async fn run_draft(&self, args: &Value) -> Result<String, Error> {
        let context = args
            .get("context")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("draft requires a 'context' argument".into()))?;
        let message_type = args
            .get("message_type")
            .and_then(Value::as_str)
            .unwrap_or("email");

        let format_instructions = if message_type == "teams" {
            "Write a concise, friendly chat message. No subject line, no formal \
             signature. Keep it under a short paragraph."
        } else {
            "Write a professional email. The FIRST line must be exactly \
             `Subject: <subject>`, followed by a blank line, then the body with a \
             courteous greeting and sign-off."
        };

        let prompt = format!(
            "You are a communications specialist for a university procurement department. \
             Draft a message based on the request below.\n\n\
             {format_instructions}\n\n\
             REQUEST:\n{context}\n\n\
             DRAFT:"
        );

        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(DRAFT_TEMPERATURE)
            .with_max_tokens(1024);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| Error::Workflow(WorkflowError::StepFailed(e.to_string())))?;

        Ok(response.content.trim().to_string())
    }

    async fn run_send(&self, args: &Value, ctx: &ToolContext) -> Result<String, Error> {
        let recipient = args
            .get("recipient")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_recipient)
            .to_string();
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("send requires a 'message' argument".into()))?;

        let (subject, body) = split_subject(message);
        let email = OutboundEmail {
            recipient,
            subject,
            body,
            body_format: "Text".to_string(),
        };

        let receipt = match &ctx.identity {
            Some(identity) => self.email.send(&email, identity).await?,
            None => {
                warn!(user_id = %ctx.user_id, "No delegated identity; send is simulated");
                simulated_send(&email)
            }
        };

        info!(
            recipient = %receipt.recipient,
            simulated = receipt.simulated,
            "Send tool completed"
        );

        if receipt.simulated {
            Ok(format!(
                "[SIMULATED] Email to {} with subject \"{}\" was prepared but not sent \
                 (no signed-in mailbox).",
                receipt.recipient, receipt.subject
            ))
        } else {
            Ok(format!(
                "Email sent to {} with subject \"{}\".",
                receipt.recipient, receipt.subject
            ))
        }
    }
}

#[async_trait]
impl ToolDispatch for ToolRegistry {
    fn resolve(&self, name: &str) -> Option<ToolKind> {
        match name {
            "retrieval" => Some(ToolKind::Retrieval),
            "draft_communication" => Some(ToolKind::DraftMessage),
            "send_communication" => Some(ToolKind::SendMessage),
            _ => None,
        }
    }

    fn default_recipient(&self) -> &str {
        &self.default_recipient
    }

    async fn execute(
        &self,
        kind: ToolKind,
        args: &Value,
        ctx: &ToolContext,
    ) -> Result<String, Error> {
        match kind {
            ToolKind::Retrieval => self.run_retrieval(args, ctx).await,
            ToolKind::DraftMessage => self.run_draft(args).await,
            ToolKind::SendMessage => self.run_send(args, ctx).await,
        }
    }
}

/// Split a drafted message into subject and body. The subject is the first
/// line when it carries a `Subject:` prefix; otherwise a generic subject is
/// used and the whole message becomes the body.
fn split_subject(message: &str) -> (String, String) {
    if let Some(rest) = message.trim_start().strip_prefix("Subject:") {
        let mut lines = rest.splitn(2, '\n');
        let subject = lines.next().unwrap_or("").trim().to_string();
        let body = lines.next().unwrap_or("").trim_start().to_string();
        if !subject.is_empty() {
            return (subject, body);
        }
    }
    ("Procurement assistance".to_string(), message.to_string())
}
