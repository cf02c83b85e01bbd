//! Workflow persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::WorkflowExecution;

/// Storage seam for workflow instances. The in-memory table is the only
/// implementation today; a durable store would slot in here.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Option<WorkflowExecution>;
    async fn put(&self, workflow: WorkflowExecution);
    async fn remove(&self, id: Uuid) -> bool;
    /// Find the workflow whose halted step carries this approval id.
    async fn find_by_approval(&self, approval_id: Uuid) -> Option<WorkflowExecution>;
    /// Remove all workflows in a terminal state; returns how many.
    async fn cleanup_finished(&self) -> usize;
}

pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<Uuid, WorkflowExecution>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn get(&self, id: Uuid) -> Option<WorkflowExecution> {
        self.workflows.read().await.get(&id).cloned()
    }

    async fn put(&self, workflow: WorkflowExecution) {
        self.workflows.write().await.insert(workflow.id, workflow);
    }

    async fn remove(&self, id: Uuid) -> bool {
        self.workflows.write().await.remove(&id).is_some()
    }

    async fn find_by_approval(&self, approval_id: Uuid) -> Option<WorkflowExecution> {
        self.workflows
            .read()
            .await
            .values()
            .find(|w| {
                w.steps
                    .iter()
                    .any(|s| s.approval_id == Some(approval_id))
            })
            .cloned()
    }

    async fn cleanup_finished(&self) -> usize {
        use super::types::WorkflowStatus;
        let mut table = self.workflows.write().await;
        let before = table.len();
        table.retain(|_, w| {
            !matches!(w.status, WorkflowStatus::Completed | WorkflowStatus::Failed)
        });
        before - table.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::workflow::types::{StepStatus, WorkflowStatus, WorkflowStep};

    use super::*;

    fn workflow() -> WorkflowExecution {
        WorkflowExecution::new(
            "alice",
            "conv-1",
            "email the vendor",
            vec![WorkflowStep::new(0, "send_communication", json!({}), true)],
        )
    }

    #[tokio::test]
    async fn find_by_approval_matches_step() {
        let store = InMemoryWorkflowStore::new();
        let mut wf = workflow();
        let approval_id = Uuid::new_v4();
        wf.steps[0].approval_id = Some(approval_id);
        wf.steps[0].status = StepStatus::AwaitingApproval;
        let wf_id = wf.id;
        store.put(wf).await;

        let found = store.find_by_approval(approval_id).await.unwrap();
        assert_eq!(found.id, wf_id);
        assert!(store.find_by_approval(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn cleanup_keeps_in_flight_workflows() {
        let store = InMemoryWorkflowStore::new();
        let running = workflow();
        let running_id = running.id;
        store.put(running).await;

        let mut done = workflow();
        done.status = WorkflowStatus::Completed;
        store.put(done).await;

        assert_eq!(store.cleanup_finished().await, 1);
        assert!(store.get(running_id).await.is_some());
    }
}
