//! Workflow execution engine.
//!
//! Steps run strictly in order. The loop re-reads the live step list length
//! on every iteration, so steps appended by dynamic replanning are executed
//! in the same run. A gated step halts the whole workflow until a human
//! responds; resuming executes the approved step directly, without passing
//! the gate a second time.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::approval::{ApprovalRegistry, ApprovalStatus};
use crate::error::{ApprovalError, Error, WorkflowError};
use crate::stream::{EventKind, EventSink, WorkflowEvent};
use crate::tools::{ToolContext, ToolDispatch, ToolKind};

use super::planner::PREVIOUS_RESULT_PLACEHOLDER;
use super::replan::ReplanTrigger;
use super::store::WorkflowStore;
use super::types::{StepStatus, WorkflowExecution, WorkflowStatus, WorkflowStep};

pub struct WorkflowExecutor {
    tools: Arc<dyn ToolDispatch>,
    store: Arc<dyn WorkflowStore>,
    approvals: Arc<ApprovalRegistry>,
    replan: Arc<dyn ReplanTrigger>,
}

impl WorkflowExecutor {
    pub fn new(
        tools: Arc<dyn ToolDispatch>,
        store: Arc<dyn WorkflowStore>,
        approvals: Arc<ApprovalRegistry>,
        replan: Arc<dyn ReplanTrigger>,
    ) -> Self {
        Self {
            tools,
            store,
            approvals,
            replan,
        }
    }

    /// Run a stored workflow from its first pending step.
    pub async fn run(
        &self,
        workflow_id: Uuid,
        ctx: &ToolContext,
        sink: &dyn EventSink,
    ) -> Result<(), Error> {
        let workflow = self
            .store
            .get(workflow_id)
            .await
            .ok_or(Error::Workflow(WorkflowError::NotFound { id: workflow_id }))?;

        sink.emit(WorkflowEvent::new(
            EventKind::Started,
            json!({ "workflow_id": workflow.id, "message": workflow.initial_message }),
        ))
        .await;
        sink.emit(WorkflowEvent::new(
            EventKind::PlanCreated,
            json!({
                "workflow_id": workflow.id,
                "steps": workflow.steps.iter().map(|s| json!({
                    "id": s.id,
                    "tool": s.tool,
                    "requires_approval": s.requires_approval,
                })).collect::<Vec<_>>(),
            }),
        ))
        .await;

        self.execute_from(workflow, 0, None, ctx, sink).await
    }

    /// Resume after an approval. The approved step runs directly; the loop
    /// then continues with any steps after it.
    pub async fn resume_approved(
        &self,
        approval_id: Uuid,
        edits: Option<Value>,
        ctx: &ToolContext,
        sink: &dyn EventSink,
    ) -> Result<Uuid, Error> {
        // The registry is the source of truth for the gate: resume only
        // proceeds for a request that actually resolved to Approved.
        let approval = self
            .approvals
            .get(approval_id)
            .await
            .ok_or(Error::Approval(ApprovalError::NotFound { id: approval_id }))?;
        match approval.status {
            ApprovalStatus::Approved => {}
            ApprovalStatus::Expired => {
                return Err(Error::Approval(ApprovalError::Expired { id: approval_id }));
            }
            _ => {
                return Err(Error::Approval(ApprovalError::NotApproved { id: approval_id }));
            }
        }

        let mut workflow = self
            .store
            .find_by_approval(approval_id)
            .await
            .ok_or(Error::Workflow(WorkflowError::NoStepAwaitingApproval))?;

        let index = awaiting_index(&workflow, approval_id)?;

        // Approver edits overlay the planned args (e.g. corrected recipient).
        if let Some(Value::Object(edit_map)) = edits {
            if let Value::Object(ref mut args) = workflow.steps[index].args {
                for (key, value) in edit_map {
                    args.insert(key, value);
                }
            }
        }

        workflow.steps[index].status = StepStatus::Pending;
        workflow.status = WorkflowStatus::Running;
        workflow.touch();
        let workflow_id = workflow.id;
        info!(workflow_id = %workflow_id, step = %workflow.steps[index].id, "Resuming approved step");

        self.execute_from(workflow, index, Some(index), ctx, sink)
            .await?;
        Ok(workflow_id)
    }

    /// Resume after a rejection: the gated step and the workflow both fail.
    pub async fn resume_rejected(
        &self,
        approval_id: Uuid,
        sink: &dyn EventSink,
    ) -> Result<Uuid, Error> {
        let mut workflow = self
            .store
            .find_by_approval(approval_id)
            .await
            .ok_or(Error::Workflow(WorkflowError::NoStepAwaitingApproval))?;

        let index = awaiting_index(&workflow, approval_id)?;
        workflow.steps[index].status = StepStatus::Failed;
        workflow.steps[index].result = Some("Action rejected by user.".to_string());
        workflow.status = WorkflowStatus::Failed;
        workflow.final_result = Some("The requested action was rejected.".to_string());
        workflow.touch();
        let workflow_id = workflow.id;
        let step_id = workflow.steps[index].id.clone();
        self.store.put(workflow).await;

        info!(workflow_id = %workflow_id, step = %step_id, "Workflow stopped by rejection");
        sink.emit(WorkflowEvent::new(
            EventKind::WorkflowFailed,
            json!({ "workflow_id": workflow_id, "reason": "rejected", "step_id": step_id }),
        ))
        .await;
        Ok(workflow_id)
    }

    async fn execute_from(
        &self,
        mut workflow: WorkflowExecution,
        start: usize,
        skip_gate_at: Option<usize>,
        ctx: &ToolContext,
        sink: &dyn EventSink,
    ) -> Result<(), Error> {
        let mut index = start;

        // The bound is re-evaluated each pass so appended steps get visited.
        while index < workflow.steps.len() {
            if workflow.steps[index].status != StepStatus::Pending {
                index += 1;
                continue;
            }

            let step = workflow.steps[index].clone();

            if step.requires_approval && skip_gate_at != Some(index) {
                return self.halt_for_approval(workflow, index, ctx, sink).await;
            }

            sink.emit(WorkflowEvent::new(
                EventKind::StepStarted,
                json!({ "workflow_id": workflow.id, "step_id": step.id, "tool": step.tool }),
            ))
            .await;

            let Some(kind) = self.tools.resolve(&step.tool) else {
                warn!(tool = %step.tool, "Plan referenced an unknown tool");
                return self
                    .fail(workflow, index, format!("Unknown tool: {}", step.tool), sink)
                    .await;
            };

            let args = resolve_placeholders(&step.args, &workflow.steps, index);

            match self.tools.execute(kind, &args, ctx).await {
                Ok(result) => {
                    workflow.steps[index].status = StepStatus::Completed;
                    workflow.steps[index].result = Some(result.clone());
                    workflow.touch();
                    self.store.put(workflow.clone()).await;

                    sink.emit(WorkflowEvent::new(
                        EventKind::StepCompleted,
                        json!({ "workflow_id": workflow.id, "step_id": step.id }),
                    ))
                    .await;

                    if kind == ToolKind::Retrieval {
                        self.maybe_extend(&mut workflow, &result, sink).await;
                    }
                }
                Err(e) => {
                    return self.fail(workflow, index, e.to_string(), sink).await;
                }
            }

            index += 1;
        }

        self.finalize(workflow, sink).await
    }

    async fn halt_for_approval(
        &self,
        mut workflow: WorkflowExecution,
        index: usize,
        ctx: &ToolContext,
        sink: &dyn EventSink,
    ) -> Result<(), Error> {
        let step = &workflow.steps[index];
        let action_type = format!("execute_tool_{}", step.tool);
        let message = format!(
            "The assistant wants to run \"{}\" on your behalf. Approve to continue.",
            step.tool
        );
        let approval_id = self
            .approvals
            .create(
                &ctx.user_id,
                &ctx.conversation_id,
                &action_type,
                step.args.clone(),
                &message,
                None,
            )
            .await;

        workflow.steps[index].status = StepStatus::AwaitingApproval;
        workflow.steps[index].approval_id = Some(approval_id);
        workflow.status = WorkflowStatus::AwaitingApproval;
        workflow.touch();

        let step_id = workflow.steps[index].id.clone();
        let workflow_id = workflow.id;
        self.store.put(workflow).await;

        info!(
            workflow_id = %workflow_id,
            step = %step_id,
            approval_id = %approval_id,
            "Workflow halted for approval"
        );
        sink.emit(WorkflowEvent::new(
            EventKind::ApprovalRequired,
            json!({
                "workflow_id": workflow_id,
                "step_id": step_id,
                "approval_id": approval_id,
            }),
        ))
        .await;
        Ok(())
    }

    /// Append follow-up communication steps when the replan trigger fires.
    /// Only ever extends a plan once.
    async fn maybe_extend(
        &self,
        workflow: &mut WorkflowExecution,
        retrieval_result: &str,
        sink: &dyn EventSink,
    ) {
        let already_communicating = workflow
            .steps
            .iter()
            .any(|s| s.tool == "draft_communication" || s.tool == "send_communication");
        if already_communicating {
            return;
        }
        if !self
            .replan
            .should_extend(retrieval_result, &workflow.initial_message)
        {
            return;
        }

        let base = workflow.steps.len();
        let context = format!(
            "Draft a follow-up email to the procurement team about this request:\n\
             {}\n\nWhat was found so far:\n{}",
            workflow.initial_message, retrieval_result
        );
        workflow.steps.push(WorkflowStep::new(
            base,
            "draft_communication",
            json!({ "context": context, "message_type": "email" }),
            false,
        ));
        workflow.steps.push(WorkflowStep::new(
            base + 1,
            "send_communication",
            json!({
                "recipient": self.tools.default_recipient(),
                "message": PREVIOUS_RESULT_PLACEHOLDER,
            }),
            true,
        ));
        workflow.touch();
        self.store.put(workflow.clone()).await;

        info!(workflow_id = %workflow.id, added = 2, "Plan extended dynamically");
        sink.emit(WorkflowEvent::new(
            EventKind::DynamicStepsAdded,
            json!({
                "workflow_id": workflow.id,
                "step_ids": [
                    workflow.steps[base].id,
                    workflow.steps[base + 1].id,
                ],
            }),
        ))
        .await;
    }

    async fn fail(
        &self,
        mut workflow: WorkflowExecution,
        index: usize,
        reason: String,
        sink: &dyn EventSink,
    ) -> Result<(), Error> {
        warn!(workflow_id = %workflow.id, step = %workflow.steps[index].id, %reason, "Step failed");

        workflow.steps[index].status = StepStatus::Failed;
        workflow.steps[index].result = Some(reason.clone());
        workflow.status = WorkflowStatus::Failed;
        workflow.final_result = Some(format!(
            "Workflow stopped: step {} failed ({reason})",
            workflow.steps[index].id
        ));
        workflow.touch();

        let workflow_id = workflow.id;
        let step_id = workflow.steps[index].id.clone();
        self.store.put(workflow).await;

        sink.emit(WorkflowEvent::new(
            EventKind::StepFailed,
            json!({ "workflow_id": workflow_id, "step_id": step_id, "reason": reason }),
        ))
        .await;
        sink.emit(WorkflowEvent::new(
            EventKind::WorkflowFailed,
            json!({ "workflow_id": workflow_id }),
        ))
        .await;
        Ok(())
    }

    async fn finalize(
        &self,
        mut workflow: WorkflowExecution,
        sink: &dyn EventSink,
    ) -> Result<(), Error> {
        let combined = workflow
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .filter_map(|s| s.result.as_deref())
            .collect::<Vec<_>>()
            .join("\n\n");

        workflow.status = WorkflowStatus::Completed;
        workflow.final_result = Some(combined.clone());
        workflow.touch();

        let workflow_id = workflow.id;
        self.store.put(workflow).await;

        info!(workflow_id = %workflow_id, "Workflow completed");
        sink.emit(WorkflowEvent::new(
            EventKind::WorkflowCompleted,
            json!({ "workflow_id": workflow_id, "final_result": combined }),
        ))
        .await;
        Ok(())
    }
}

fn awaiting_index(workflow: &WorkflowExecution, approval_id: Uuid) -> Result<usize, Error> {
    workflow
        .steps
        .iter()
        .position(|s| {
            s.approval_id == Some(approval_id) && s.status == StepStatus::AwaitingApproval
        })
        .ok_or(Error::Workflow(WorkflowError::NoStepAwaitingApproval))
}

/// Replace placeholder references in step args with the result of the most
/// recent completed step before `index`. An unresolvable placeholder becomes
/// an empty string.
fn resolve_placeholders(args: &Value, steps: &[WorkflowStep], index: usize) -> Value {
    let previous = steps[..index]
        .iter()
        .rev()
        .find(|s| s.status == StepStatus::Completed)
        .and_then(|s| s.result.clone());

    substitute(args, previous.as_deref())
}

fn substitute(value: &Value, previous: Option<&str>) -> Value {
    match value {
        Value::String(s) if s == PREVIOUS_RESULT_PLACEHOLDER => {
            if previous.is_none() {
                warn!("Placeholder had no completed step to bind to");
            }
            Value::String(previous.unwrap_or_default().to_string())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, previous)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| substitute(v, previous)).collect())
        }
        other => other.clone(),
    }
}
