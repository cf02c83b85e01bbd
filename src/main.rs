use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use procure_assist::api::{self, AppState};
use procure_assist::approval::ApprovalRegistry;
use procure_assist::config::Settings;
use procure_assist::email::GraphEmailDelegate;
use procure_assist::llm::HttpCompletionClient;
use procure_assist::memory::InMemoryMemoryStore;
use procure_assist::pipeline::RagPipeline;
use procure_assist::retrieval::{HttpEmbedder, HttpSearchBackend, HybridRetriever};
use procure_assist::tools::ToolRegistry;
use procure_assist::workflow::{
    InMemoryWorkflowStore, KeywordReplanTrigger, WorkflowExecutor, WorkflowPlanner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let llm = Arc::new(HttpCompletionClient::new(settings.completion.clone()));
    let retriever = Arc::new(HybridRetriever::new(
        Arc::new(HttpSearchBackend::new(settings.search.clone())),
        Arc::new(HttpEmbedder::new(settings.embedding.clone())),
    ));
    let memory = Arc::new(InMemoryMemoryStore::new(settings.memory_cap));
    let pipeline = Arc::new(RagPipeline::new(llm.clone(), retriever, memory));

    let email = Arc::new(GraphEmailDelegate::new(settings.email.clone()));
    let tools = Arc::new(ToolRegistry::new(
        pipeline.clone(),
        llm,
        email,
        settings.default_recipient.clone(),
    ));

    let store = Arc::new(InMemoryWorkflowStore::new());
    let approvals = Arc::new(ApprovalRegistry::new(settings.approval_timeout_minutes));
    let executor = Arc::new(WorkflowExecutor::new(
        tools.clone(),
        store.clone(),
        approvals.clone(),
        Arc::new(KeywordReplanTrigger),
    ));
    let planner = Arc::new(WorkflowPlanner::new(settings.default_recipient.clone()));

    let state = Arc::new(AppState {
        pipeline,
        planner,
        executor,
        tools,
        store,
        approvals,
    });

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Procure Assist listening");
    axum::serve(listener, api::router(state)).await?;

    Ok(())
}
