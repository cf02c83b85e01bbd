//! Shared types for the RAG pipeline.

use serde::{Deserialize, Serialize};

use crate::retrieval::Document;

/// Mutable state threaded through one pipeline run. Created per query,
/// discarded when the run completes; never shared across runs.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// The question exactly as the user asked it.
    pub original_question: String,
    /// The search-optimized rewrite (falls back to the original).
    pub rewritten_question: String,
    /// Documents as returned by retrieval, before grading.
    pub raw_documents: Vec<Document>,
    /// Working document list, filtered by grading and reordered by reranking.
    pub documents: Vec<Document>,
    /// The generated answer (or fallback response).
    pub generation: String,
}

/// A citation-bearing source reference surfaced alongside an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub chunk_id: String,
    pub keyword_score: f64,
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagOutcome {
    pub answer: String,
    /// Empty when the fallback path produced the answer.
    pub sources: Vec<SourceRef>,
    pub used_fallback: bool,
}
