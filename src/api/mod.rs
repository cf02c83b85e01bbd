//! HTTP surface.
//!
//! Thin handlers over the pipeline, executor, and registries. Workflow
//! execution is detached: the start endpoints return (or begin streaming)
//! immediately and the run proceeds on its own task.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::Stream;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tracing::error;
use uuid::Uuid;

use crate::approval::{approval_card, ApprovalRegistry};
use crate::email::SenderIdentity;
use crate::error::{Error, WorkflowError};
use crate::pipeline::{RagOutcome, RagPipeline};
use crate::stream::{ChannelSink, EventKind, EventSink, NullSink, WorkflowEvent};
use crate::tools::{ToolContext, ToolDispatch};
use crate::workflow::{
    GraphReport, GraphRunner, GraphStep, WorkflowExecution, WorkflowExecutor, WorkflowPlanner,
    WorkflowStore,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
    pub planner: Arc<WorkflowPlanner>,
    pub executor: Arc<WorkflowExecutor>,
    pub tools: Arc<dyn ToolDispatch>,
    pub store: Arc<dyn WorkflowStore>,
    pub approvals: Arc<ApprovalRegistry>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/workflow/execute", post(execute_workflow))
        .route("/workflow/execute/stream", post(execute_workflow_stream))
        .route("/workflow/graph", post(execute_graph))
        .route("/workflow/status/{id}", get(workflow_status))
        .route("/workflow/cleanup", delete(workflow_cleanup))
        .route("/hitl/approvals/{user_id}", get(list_approvals))
        .route("/hitl/card/{approval_id}", get(approval_card_for))
        .route("/hitl/respond", post(respond))
        .route("/hitl/cleanup", delete(approvals_cleanup))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wrapper mapping domain errors onto HTTP statuses.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) | Error::Workflow(WorkflowError::UnknownTool { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Error::Workflow(WorkflowError::NotFound { .. })
            | Error::Workflow(WorkflowError::NoStepAwaitingApproval)
            | Error::Approval(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    conversation_id: String,
}

async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<RagOutcome>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(Error::Validation("question must not be empty".into()).into());
    }
    let outcome = state
        .pipeline
        .answer(&request.question, &request.conversation_id)
        .await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct ExecuteRequest {
    message: String,
    user_id: String,
    conversation_id: String,
}

#[derive(Serialize)]
struct ExecuteResponse {
    workflow_id: Uuid,
    planned_steps: Vec<Value>,
    status: &'static str,
}

fn planned_steps(workflow: &WorkflowExecution) -> Vec<Value> {
    workflow
        .steps
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "tool": s.tool,
                "requires_approval": s.requires_approval,
            })
        })
        .collect()
}

fn validate_execute(request: &ExecuteRequest) -> Result<(), Error> {
    if request.message.trim().is_empty() {
        return Err(Error::Validation("message must not be empty".into()));
    }
    if request.user_id.trim().is_empty() {
        return Err(Error::Validation("user_id must not be empty".into()));
    }
    Ok(())
}

fn identity_from_headers(headers: &HeaderMap) -> Option<SenderIdentity> {
    let token = headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .to_string();
    let email = headers
        .get("x-user-email")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let display_name = headers
        .get("x-user-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Some(SenderIdentity {
        access_token: SecretString::from(token),
        email,
        display_name,
    })
}

async fn execute_workflow(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    validate_execute(&request)?;

    let steps = state.planner.plan(&request.message);
    let workflow = WorkflowExecution::new(
        &request.user_id,
        &request.conversation_id,
        &request.message,
        steps,
    );
    let response = ExecuteResponse {
        workflow_id: workflow.id,
        planned_steps: planned_steps(&workflow),
        status: "started",
    };
    let workflow_id = workflow.id;
    state.store.put(workflow).await;

    let ctx = ToolContext {
        user_id: request.user_id,
        conversation_id: request.conversation_id,
        identity: identity_from_headers(&headers),
    };
    let executor = state.executor.clone();
    tokio::spawn(async move {
        if let Err(e) = executor.run(workflow_id, &ctx, &NullSink).await {
            error!(workflow_id = %workflow_id, error = %e, "Detached workflow run failed");
        }
    });

    Ok(Json(response))
}

async fn execute_workflow_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ExecuteRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    validate_execute(&request)?;

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let sink = ChannelSink::new(tx);

    sink.emit(WorkflowEvent::new(
        EventKind::Planning,
        json!({ "message": request.message }),
    ))
    .await;

    let steps = state.planner.plan(&request.message);
    let workflow = WorkflowExecution::new(
        &request.user_id,
        &request.conversation_id,
        &request.message,
        steps,
    );
    let workflow_id = workflow.id;
    state.store.put(workflow).await;

    let ctx = ToolContext {
        user_id: request.user_id,
        conversation_id: request.conversation_id,
        identity: identity_from_headers(&headers),
    };
    let executor = state.executor.clone();
    tokio::spawn(async move {
        if let Err(e) = executor.run(workflow_id, &ctx, &sink).await {
            error!(workflow_id = %workflow_id, error = %e, "Streaming workflow run failed");
            sink.emit(WorkflowEvent::new(
                EventKind::Error,
                json!({ "workflow_id": workflow_id, "error": e.to_string() }),
            ))
            .await;
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event.payload)
            .unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(event.kind.as_str()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Deserialize)]
struct GraphRequest {
    user_id: String,
    conversation_id: String,
    steps: Vec<GraphStep>,
}

/// Graphs fan out research steps concurrently; anything gated must go
/// through the linear executor so the approval flow applies.
fn validate_graph(tools: &dyn ToolDispatch, steps: &[GraphStep]) -> Result<(), Error> {
    if steps.is_empty() {
        return Err(Error::Validation("graph needs at least one step".into()));
    }
    for step in steps {
        match tools.resolve(&step.tool) {
            None => {
                return Err(Error::Workflow(WorkflowError::UnknownTool {
                    name: step.tool.clone(),
                }));
            }
            Some(kind) if kind.requires_approval() => {
                return Err(Error::Validation(format!(
                    "tool {} requires approval and cannot run in a graph",
                    step.tool
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

async fn execute_graph(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<GraphRequest>,
) -> Result<Json<GraphReport>, ApiError> {
    validate_graph(state.tools.as_ref(), &request.steps)?;

    let ctx = ToolContext {
        user_id: request.user_id,
        conversation_id: request.conversation_id,
        identity: identity_from_headers(&headers),
    };
    let runner = GraphRunner::new(state.tools.clone());
    let report = runner.run(request.steps, &ctx).await;
    Ok(Json(report))
}

async fn workflow_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowExecution>, ApiError> {
    let workflow = state
        .store
        .get(id)
        .await
        .ok_or(Error::Workflow(WorkflowError::NotFound { id }))?;
    Ok(Json(workflow))
}

async fn workflow_cleanup(State(state): State<Arc<AppState>>) -> Json<Value> {
    let removed = state.store.cleanup_finished().await;
    Json(json!({ "removed": removed }))
}

#[derive(Deserialize)]
struct ApprovalListQuery {
    conversation_id: Option<String>,
}

async fn list_approvals(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<ApprovalListQuery>,
) -> Json<Value> {
    let pending = state
        .approvals
        .list_pending(&user_id, query.conversation_id.as_deref())
        .await;
    Json(json!({ "approvals": pending }))
}

async fn approval_card_for(
    State(state): State<Arc<AppState>>,
    Path(approval_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let request = state
        .approvals
        .get(approval_id)
        .await
        .ok_or(Error::Approval(crate::error::ApprovalError::NotFound {
            id: approval_id,
        }))?;
    Ok(Json(approval_card(&request)))
}

#[derive(Deserialize)]
struct RespondRequest {
    approval_id: Uuid,
    user_id: String,
    action: String,
    response_data: Option<Value>,
}

#[derive(Serialize)]
struct RespondResponse {
    success: bool,
    workflow_id: Option<Uuid>,
}

async fn respond(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, ApiError> {
    match request.action.as_str() {
        "approve" => {
            let accepted = state
                .approvals
                .approve(
                    request.approval_id,
                    &request.user_id,
                    request.response_data.clone(),
                )
                .await;
            if !accepted {
                return Ok(Json(RespondResponse {
                    success: false,
                    workflow_id: None,
                }));
            }

            let workflow = state
                .store
                .find_by_approval(request.approval_id)
                .await
                .ok_or(Error::Workflow(WorkflowError::NoStepAwaitingApproval))?;

            let ctx = ToolContext {
                user_id: request.user_id,
                conversation_id: workflow.conversation_id.clone(),
                identity: identity_from_headers(&headers),
            };
            let executor = state.executor.clone();
            let approval_id = request.approval_id;
            let edits = request.response_data;
            let workflow_id = workflow.id;
            tokio::spawn(async move {
                if let Err(e) = executor
                    .resume_approved(approval_id, edits, &ctx, &NullSink)
                    .await
                {
                    error!(approval_id = %approval_id, error = %e, "Resume after approval failed");
                }
            });

            Ok(Json(RespondResponse {
                success: true,
                workflow_id: Some(workflow_id),
            }))
        }
        "reject" => {
            let accepted = state
                .approvals
                .reject(
                    request.approval_id,
                    &request.user_id,
                    request.response_data,
                )
                .await;
            if !accepted {
                return Ok(Json(RespondResponse {
                    success: false,
                    workflow_id: None,
                }));
            }
            let workflow_id = state
                .executor
                .resume_rejected(request.approval_id, &NullSink)
                .await?;
            Ok(Json(RespondResponse {
                success: true,
                workflow_id: Some(workflow_id),
            }))
        }
        other => Err(Error::Validation(format!("unknown action: {other}")).into()),
    }
}

async fn approvals_cleanup(State(state): State<Arc<AppState>>) -> Json<Value> {
    let purged = state.approvals.cleanup().await;
    Json(json!({ "purged": purged }))
}
