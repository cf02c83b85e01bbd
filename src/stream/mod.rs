//! Workflow event streaming.
//!
//! Executors emit named events through an [`EventSink`]; the HTTP layer
//! bridges a channel sink onto Server-Sent Events. Emission is best-effort:
//! a dropped receiver never fails the workflow.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Planning,
    PlanCreated,
    StepStarted,
    ApprovalRequired,
    StepCompleted,
    StepFailed,
    DynamicStepsAdded,
    WorkflowCompleted,
    WorkflowFailed,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Started => "started",
            EventKind::Planning => "planning",
            EventKind::PlanCreated => "plan_created",
            EventKind::StepStarted => "step_started",
            EventKind::ApprovalRequired => "approval_required",
            EventKind::StepCompleted => "step_completed",
            EventKind::StepFailed => "step_failed",
            EventKind::DynamicStepsAdded => "dynamic_steps_added",
            EventKind::WorkflowCompleted => "workflow_completed",
            EventKind::WorkflowFailed => "workflow_failed",
            EventKind::Error => "error",
        }
    }
}

/// One event on a workflow's stream.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowEvent {
    pub kind: EventKind,
    pub payload: Value,
}

impl WorkflowEvent {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self { kind, payload }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: WorkflowEvent);
}

/// Sink that forwards events to an mpsc channel (one consumer, usually an
/// SSE response). Send errors mean the client went away; they are ignored.
pub struct ChannelSink {
    tx: mpsc::Sender<WorkflowEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<WorkflowEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: WorkflowEvent) {
        let _ = self.tx.send(event).await;
    }
}

/// Sink for non-streaming runs.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: WorkflowEvent) {}
}
