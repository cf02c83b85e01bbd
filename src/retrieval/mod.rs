//! Document retrieval: types and backend traits for the hybrid search
//! service and the embedding service.

mod http;
mod hybrid;

pub use http::{HttpEmbedder, HttpSearchBackend};
pub use hybrid::HybridRetriever;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// A retrieved chunk. Immutable once retrieved; owned by the current
/// pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub chunk_id: String,
    pub title: String,
    pub parent_id: String,
    pub content: String,
    /// Keyword (BM25) relevance score from the search service.
    pub keyword_score: f64,
    /// Semantic reranker score; 0 when the capability is unavailable.
    pub rerank_score: f64,
    /// Extractive caption, when semantic search produced one.
    pub caption: Option<String>,
}

/// Semantic options attached to a search request when the index supports
/// semantic reranking.
#[derive(Debug, Clone)]
pub struct SemanticOptions {
    pub config_name: String,
    pub extractive_captions: bool,
}

/// A combined keyword + vector search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Keyword component; `None` for vector-only fallback queries.
    pub keyword_query: Option<String>,
    pub vector: Vec<f32>,
    /// Vector candidate pool size (k).
    pub candidate_pool: usize,
    /// Final result count; `None` lets the backend default apply.
    pub top: Option<usize>,
    pub semantic: Option<SemanticOptions>,
}

/// Search service backend.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Probe the index configuration: the semantic configuration name if
    /// semantic reranking is available, `None` otherwise.
    async fn semantic_config(&self) -> Result<Option<String>, SearchError>;

    /// Run a search and return ranked documents.
    async fn search(&self, request: SearchRequest) -> Result<Vec<Document>, SearchError>;
}

/// Query embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError>;
}
