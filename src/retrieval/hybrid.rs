//! Adaptive hybrid retriever.
//!
//! Combines keyword and vector search in one query, upgrading to semantic
//! reranking when the index supports it and degrading to vector-only search,
//! then to an empty result set, when requests fail. Callers never see a
//! retrieval error; zero documents is a valid outcome.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::{Document, Embedder, SearchBackend, SearchRequest, SemanticOptions};

/// Vector candidate pool for the hybrid query.
const HYBRID_CANDIDATE_POOL: usize = 10;

/// Final result count for the hybrid query.
const HYBRID_TOP: usize = 5;

/// Smaller candidate pool for the vector-only fallback.
const FALLBACK_CANDIDATE_POOL: usize = 5;

/// Cached outcome of the semantic capability probe.
#[derive(Debug, Clone)]
enum SemanticCapability {
    Available { config_name: String },
    Unavailable,
}

/// Adaptive search client. The semantic probe runs once, lazily, and its
/// result is reused for the retriever's lifetime.
pub struct HybridRetriever {
    backend: Arc<dyn SearchBackend>,
    embedder: Arc<dyn Embedder>,
    semantic: OnceCell<SemanticCapability>,
}

impl HybridRetriever {
    pub fn new(backend: Arc<dyn SearchBackend>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            backend,
            embedder,
            semantic: OnceCell::new(),
        }
    }

    /// Retrieve documents for a query.
    ///
    /// Embedding failure is treated like a search failure chain that has run
    /// out of options: logged, empty result.
    pub async fn retrieve(&self, query: &str) -> Vec<Document> {
        let vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Query embedding failed; returning no documents");
                return Vec::new();
            }
        };

        let capability = self.detect_semantic().await;
        let semantic = match &capability {
            SemanticCapability::Available { config_name } => Some(SemanticOptions {
                config_name: config_name.clone(),
                extractive_captions: true,
            }),
            SemanticCapability::Unavailable => None,
        };

        let hybrid = SearchRequest {
            keyword_query: Some(query.to_string()),
            vector: vector.clone(),
            candidate_pool: HYBRID_CANDIDATE_POOL,
            top: Some(HYBRID_TOP),
            semantic,
        };

        match self.backend.search(hybrid).await {
            Ok(documents) => {
                info!(
                    count = documents.len(),
                    semantic = matches!(capability, SemanticCapability::Available { .. }),
                    "Hybrid search succeeded"
                );
                documents
            }
            Err(e) => {
                warn!(error = %e, "Hybrid search failed; falling back to vector-only");
                self.vector_only(vector).await
            }
        }
    }

    async fn vector_only(&self, vector: Vec<f32>) -> Vec<Document> {
        let request = SearchRequest {
            keyword_query: None,
            vector,
            candidate_pool: FALLBACK_CANDIDATE_POOL,
            top: None,
            semantic: None,
        };

        match self.backend.search(request).await {
            Ok(documents) => {
                info!(count = documents.len(), "Vector-only fallback search succeeded");
                documents
            }
            Err(e) => {
                warn!(error = %e, "Vector-only search also failed; returning no documents");
                Vec::new()
            }
        }
    }

    /// Probe the index once and cache the result. A failed probe caches
    /// "unavailable"; the retriever keeps working with standard hybrid
    /// search instead of retrying the probe on every query.
    async fn detect_semantic(&self) -> SemanticCapability {
        self.semantic
            .get_or_init(|| async {
                match self.backend.semantic_config().await {
                    Ok(Some(config_name)) => {
                        info!(config = %config_name, "Semantic reranking detected");
                        SemanticCapability::Available { config_name }
                    }
                    Ok(None) => {
                        info!("No semantic configuration; using standard hybrid search");
                        SemanticCapability::Unavailable
                    }
                    Err(e) => {
                        warn!(error = %e, "Semantic capability probe failed; assuming unavailable");
                        SemanticCapability::Unavailable
                    }
                }
            })
            .await
            .clone()
    }
}
