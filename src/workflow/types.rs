//! Workflow data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Completed,
    Failed,
    AwaitingApproval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    AwaitingApproval,
    Completed,
    Failed,
}

/// One planned tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Position-derived id ("step_1", "step_2", ...). Dynamically appended
    /// steps continue the numbering.
    pub id: String,
    /// Wire name of the tool to invoke.
    pub tool: String,
    pub args: Value,
    pub requires_approval: bool,
    pub status: StepStatus,
    pub result: Option<String>,
    pub approval_id: Option<Uuid>,
}

impl WorkflowStep {
    pub fn new(index: usize, tool: &str, args: Value, requires_approval: bool) -> Self {
        Self {
            id: format!("step_{}", index + 1),
            tool: tool.to_string(),
            args,
            requires_approval,
            status: StepStatus::Pending,
            result: None,
            approval_id: None,
        }
    }
}

/// A workflow instance: the plan plus execution state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub user_id: String,
    pub conversation_id: String,
    pub initial_message: String,
    pub steps: Vec<WorkflowStep>,
    pub status: WorkflowStatus,
    pub final_result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecution {
    pub fn new(
        user_id: &str,
        conversation_id: &str,
        initial_message: &str,
        steps: Vec<WorkflowStep>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            conversation_id: conversation_id.to_string(),
            initial_message: initial_message.to_string(),
            steps,
            status: WorkflowStatus::Running,
            final_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
