//! End-to-end workflow tests through the real tool registry, with scripted
//! service backends.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use procure_assist::approval::ApprovalRegistry;
use procure_assist::email::{DeliveryReceipt, EmailDelegate, OutboundEmail, SenderIdentity};
use procure_assist::error::{EmailError, LlmError, SearchError};
use procure_assist::llm::{CompletionClient, CompletionRequest, CompletionResponse};
use procure_assist::memory::InMemoryMemoryStore;
use procure_assist::pipeline::RagPipeline;
use procure_assist::retrieval::{
    Document, Embedder, HybridRetriever, SearchBackend, SearchRequest,
};
use procure_assist::stream::NullSink;
use procure_assist::tools::{ToolContext, ToolRegistry};
use procure_assist::workflow::{
    InMemoryWorkflowStore, ReplanTrigger, StepStatus, WorkflowExecution, WorkflowExecutor,
    WorkflowPlanner, WorkflowStatus, WorkflowStore,
};

struct ScriptedLlm {
    script: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl CompletionClient for ScriptedLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        match self.script.lock().await.pop_front() {
            Some(content) => Ok(CompletionResponse { content }),
            None => Err(LlmError::RequestFailed {
                reason: "script exhausted".to_string(),
            }),
        }
    }
}

struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, SearchError> {
        Ok(vec![0.0; 3])
    }
}

struct StaticBackend {
    documents: Vec<Document>,
}

#[async_trait]
impl SearchBackend for StaticBackend {
    async fn semantic_config(&self) -> Result<Option<String>, SearchError> {
        Ok(None)
    }
    async fn search(&self, _request: SearchRequest) -> Result<Vec<Document>, SearchError> {
        Ok(self.documents.clone())
    }
}

struct RefusingDelegate;

#[async_trait]
impl EmailDelegate for RefusingDelegate {
    async fn send(
        &self,
        _email: &OutboundEmail,
        _identity: &SenderIdentity,
    ) -> Result<DeliveryReceipt, EmailError> {
        panic!("delegate should not be called without an identity");
    }
}

struct NeverReplan;
impl ReplanTrigger for NeverReplan {
    fn should_extend(&self, _generated: &str, _initial: &str) -> bool {
        false
    }
}

fn document() -> Document {
    Document {
        chunk_id: "c1".to_string(),
        title: "purchasing-policy.pdf".to_string(),
        parent_id: "p1".to_string(),
        content: "Laptop purchases above $2,000 require pre-approval.".to_string(),
        keyword_score: 1.5,
        rerank_score: 0.0,
        caption: None,
    }
}

struct Harness {
    executor: WorkflowExecutor,
    planner: WorkflowPlanner,
    store: Arc<InMemoryWorkflowStore>,
    approvals: Arc<ApprovalRegistry>,
}

fn harness(llm: Arc<ScriptedLlm>, documents: Vec<Document>) -> Harness {
    let retriever = Arc::new(HybridRetriever::new(
        Arc::new(StaticBackend { documents }),
        Arc::new(FixedEmbedder),
    ));
    let memory = Arc::new(InMemoryMemoryStore::new(5));
    let pipeline = Arc::new(RagPipeline::new(llm.clone(), retriever, memory));
    let tools = Arc::new(ToolRegistry::new(
        pipeline,
        llm,
        Arc::new(RefusingDelegate),
        "procurement@example.edu".to_string(),
    ));

    let store = Arc::new(InMemoryWorkflowStore::new());
    let approvals = Arc::new(ApprovalRegistry::new(30));
    let executor = WorkflowExecutor::new(
        tools,
        store.clone(),
        approvals.clone(),
        Arc::new(NeverReplan),
    );
    Harness {
        executor,
        planner: WorkflowPlanner::new("procurement@example.edu".to_string()),
        store,
        approvals,
    }
}

fn ctx() -> ToolContext {
    ToolContext {
        user_id: "alice".to_string(),
        conversation_id: "conv-1".to_string(),
        identity: None,
    }
}

async fn start(h: &Harness, message: &str) -> uuid::Uuid {
    let workflow =
        WorkflowExecution::new("alice", "conv-1", message, h.planner.plan(message));
    let id = workflow.id;
    h.store.put(workflow).await;
    h.executor.run(id, &ctx(), &NullSink).await.unwrap();
    id
}

#[tokio::test]
async fn policy_question_flows_through_the_pipeline() {
    // No history, so no rewrite call. Script: grade, score, generate.
    let llm = ScriptedLlm::new(&[
        "RELEVANT",
        r#"{"reason": "directly on topic", "score": 5}"#,
        "Laptop purchases above $2,000 require pre-approval \
         [Source Name: purchasing-policy.pdf].",
    ]);
    let h = harness(llm, vec![document()]);

    let id = start(&h, "What is the policy for buying a laptop?").await;

    let workflow = h.store.get(id).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    let final_result = workflow.final_result.unwrap();
    assert!(final_result.contains("[Source Name: purchasing-policy.pdf]"));
}

#[tokio::test]
async fn email_request_halts_then_resumes_to_simulated_send() {
    // Script: one draft call. The send is gated and, once approved, runs
    // without an identity, so it is simulated rather than delivered.
    let llm = ScriptedLlm::new(&[
        "Subject: Pricing confirmation\n\nDear vendor,\n\nPlease confirm pricing.\n\nBest regards",
    ]);
    let h = harness(llm, vec![]);

    let id = start(&h, "Please email the vendor to confirm pricing").await;

    let halted = h.store.get(id).await.unwrap();
    assert_eq!(halted.status, WorkflowStatus::AwaitingApproval);
    assert_eq!(halted.steps[0].status, StepStatus::Completed);
    assert_eq!(halted.steps[1].status, StepStatus::AwaitingApproval);

    // The pending approval carries the unresolved planned args.
    let approval_id = halted.steps[1].approval_id.unwrap();
    let pending = h.approvals.list_pending("alice", Some("conv-1")).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].action_type, "execute_tool_send_communication");

    assert!(h.approvals.approve(approval_id, "alice", None).await);
    h.executor
        .resume_approved(approval_id, None, &ctx(), &NullSink)
        .await
        .unwrap();

    let done = h.store.get(id).await.unwrap();
    assert_eq!(done.status, WorkflowStatus::Completed);

    // Final result joins the draft and the simulated send receipt.
    let final_result = done.final_result.unwrap();
    assert!(final_result.contains("Dear vendor"));
    assert!(final_result.contains("[SIMULATED]"));
    assert!(final_result.contains("Pricing confirmation"));
}

#[tokio::test]
async fn rejection_stops_the_send() {
    let llm = ScriptedLlm::new(&["Subject: Hello\n\nBody"]);
    let h = harness(llm, vec![]);

    let id = start(&h, "Please email the vendor to confirm pricing").await;
    let approval_id = h.store.get(id).await.unwrap().steps[1].approval_id.unwrap();

    assert!(h.approvals.reject(approval_id, "alice", None).await);
    h.executor
        .resume_rejected(approval_id, &NullSink)
        .await
        .unwrap();

    let done = h.store.get(id).await.unwrap();
    assert_eq!(done.status, WorkflowStatus::Failed);
    assert_eq!(done.steps[1].status, StepStatus::Failed);
}

#[tokio::test]
async fn find_by_approval_links_response_to_workflow() {
    let llm = ScriptedLlm::new(&["Subject: Hello\n\nBody"]);
    let h = harness(llm, vec![]);

    let id = start(&h, "Please email the vendor to confirm pricing").await;
    let approval_id = h.store.get(id).await.unwrap().steps[1].approval_id.unwrap();

    let linked = h.store.find_by_approval(approval_id).await.unwrap();
    assert_eq!(linked.id, id);
}

#[tokio::test]
async fn approver_can_redirect_the_email() {
    let llm = ScriptedLlm::new(&["Subject: Hello\n\nBody"]);
    let h = harness(llm, vec![]);

    let id = start(&h, "Please email the vendor to confirm pricing").await;
    let approval_id = h.store.get(id).await.unwrap().steps[1].approval_id.unwrap();

    let edits: Value = serde_json::json!({ "recipient": "vendor@corrected.com" });
    assert!(
        h.approvals
            .approve(approval_id, "alice", Some(edits.clone()))
            .await
    );
    h.executor
        .resume_approved(approval_id, Some(edits), &ctx(), &NullSink)
        .await
        .unwrap();

    let done = h.store.get(id).await.unwrap();
    let send_result = done.steps[1].result.clone().unwrap();
    assert!(send_result.contains("vendor@corrected.com"));
}
