//! The RAG state machine.
//!
//! Linear flow with one branch:
//! rewrite → retrieve → grade → rerank → (generate | fallback) → update memory.
//!
//! Per-document grading and scoring failures degrade (drop / score 0) and
//! never abort the run. Failures in rewrite, generation, or fallback are
//! fatal and surface to the caller.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::{Error, PipelineError};
use crate::llm::{extract_json_object, ChatMessage, CompletionClient, CompletionRequest};
use crate::memory::{format_history, ConversationTurn, MemoryStore};
use crate::pipeline::types::{PipelineState, RagOutcome, SourceRef};
use crate::retrieval::{Document, HybridRetriever};

/// Temperatures are fixed per call type.
const REWRITE_TEMPERATURE: f32 = 0.1;
const GRADE_TEMPERATURE: f32 = 0.0;
const SCORE_TEMPERATURE: f32 = 0.0;
const GENERATE_TEMPERATURE: f32 = 0.1;
const FALLBACK_TEMPERATURE: f32 = 0.2;

/// Rewrites shorter than this fall back to the original question.
const MIN_REWRITE_CHARS: usize = 5;

/// Turns of history fed to the rewrite and generation prompts.
const HISTORY_TURNS: usize = 2;

static CONTACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Name:\s*(.*?)\s*Email:\s*(\S+@\S+)").expect("contact regex")
});

/// The pipeline orchestrator. One instance serves all conversations; each
/// `answer` call runs strictly sequentially with its own [`PipelineState`].
pub struct RagPipeline {
    llm: Arc<dyn CompletionClient>,
    retriever: Arc<HybridRetriever>,
    memory: Arc<dyn MemoryStore>,
}

impl RagPipeline {
    pub fn new(
        llm: Arc<dyn CompletionClient>,
        retriever: Arc<HybridRetriever>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            llm,
            retriever,
            memory,
        }
    }

    /// Answer a question, running the full state machine.
    pub async fn answer(&self, question: &str, conversation_id: &str) -> Result<RagOutcome, Error> {
        let history = self.memory.get(conversation_id).await;

        let mut state = PipelineState {
            original_question: question.to_string(),
            ..Default::default()
        };

        // Rewrite
        state.rewritten_question = self.rewrite_query(question, &history).await?;
        info!(
            original = %state.original_question,
            rewritten = %state.rewritten_question,
            "Query rewritten"
        );

        // Retrieve degrades internally and never errors.
        state.raw_documents = self.retriever.retrieve(&state.rewritten_question).await;
        state.documents = state.raw_documents.clone();
        info!(count = state.documents.len(), "Documents retrieved");

        // Grade
        state.documents = self.grade_documents(question, state.documents).await;
        info!(count = state.documents.len(), "Documents graded");

        // Rerank
        state.documents = self.rerank_documents(question, state.documents).await;

        // Decide, then generate or fall back.
        let used_fallback = state.documents.is_empty();
        state.generation = if used_fallback {
            info!("No relevant documents; producing fallback response");
            self.fallback(question).await?
        } else {
            self.generate(question, &state.documents, &history).await?
        };

        // Update memory
        let mut turns = history;
        turns.push(ConversationTurn::new(question, state.generation.clone()));
        self.memory.put(conversation_id, turns).await;

        let sources = if used_fallback {
            Vec::new()
        } else {
            state
                .documents
                .iter()
                .map(|d| SourceRef {
                    title: d.title.clone(),
                    chunk_id: d.chunk_id.clone(),
                    keyword_score: d.keyword_score,
                })
                .collect()
        };

        Ok(RagOutcome {
            answer: state.generation,
            sources,
            used_fallback,
        })
    }

    /// Rewrite the question into a search-optimized query.
    ///
    /// Skips the completion call entirely when there is no history to draw
    /// on. Rewrites that come back empty or shorter than
    /// [`MIN_REWRITE_CHARS`] are discarded in favor of the original.
    async fn rewrite_query(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<String, Error> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let history_context = format_history(history, HISTORY_TURNS, 200);
        let prompt = format!(
            "You are a query optimization expert. Rewrite the user's question into a more \
             effective search query based on their original intent and the conversation history.\n\n\
             CRITICAL RULE: Do not add new topics, subjects, or concepts that are not present in \
             the user's original question or the conversation history. Your goal is to clarify \
             and add relevant keywords, not to change the topic.\n\n\
             CONVERSATION HISTORY:\n{history_context}\n\n\
             USER QUESTION: \"{question}\"\n\n\
             Optimized Search Query:"
        );

        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(REWRITE_TEMPERATURE)
            .with_max_tokens(256);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| Error::Pipeline(PipelineError::Rewrite(e.to_string())))?;

        let rewritten = response.content.trim().to_string();
        if rewritten.chars().count() < MIN_REWRITE_CHARS {
            warn!(rewritten = %rewritten, "Rewritten query too short; using original");
            return Ok(question.to_string());
        }

        Ok(rewritten)
    }

    /// Grade each document independently for relevance, preserving input
    /// order. A failed grading call drops that document and logs.
    async fn grade_documents(&self, question: &str, documents: Vec<Document>) -> Vec<Document> {
        let mut relevant = Vec::with_capacity(documents.len());

        for document in documents {
            let prompt = format!(
                "You are a helpful assistant grading document relevance for a procurement \
                 question. A document is RELEVANT if it contains any information that could \
                 help answer the user's question, including general guidelines or contact \
                 details.\n\n\
                 User Question: {question}\n\
                 Document Content: {content}\n\n\
                 Is this document relevant? Respond with a single word: RELEVANT or NOT_RELEVANT.",
                content = document.content
            );

            let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
                .with_temperature(GRADE_TEMPERATURE)
                .with_max_tokens(16);

            match self.llm.complete(request).await {
                Ok(response) => {
                    let verdict = response.content.to_uppercase();
                    if !verdict.contains("NOT_RELEVANT") && verdict.contains("RELEVANT") {
                        relevant.push(document);
                    }
                }
                Err(e) => {
                    warn!(
                        chunk_id = %document.chunk_id,
                        error = %e,
                        "Grading call failed; dropping document"
                    );
                }
            }
        }

        relevant
    }

    /// Score each surviving document 1–5 via a structured {reason, score}
    /// call and sort descending. Scoring failures score 0 and log. The sort
    /// is stable: equal scores keep their grading-output order.
    async fn rerank_documents(&self, question: &str, documents: Vec<Document>) -> Vec<Document> {
        if documents.is_empty() {
            return documents;
        }

        let mut scored: Vec<(Document, f64)> = Vec::with_capacity(documents.len());

        for document in documents {
            let prompt = format!(
                "You are a document re-ranking expert. Score the following document's relevance \
                 to the user's question on a scale from 1 (least relevant) to 5 (most relevant).\n\
                 Your output MUST be a JSON object with two keys: \"reason\" and \"score\".\n\n\
                 User Question: {question}\n\
                 Document Content: {content}\n\n\
                 JSON Output:",
                content = document.content
            );

            let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
                .with_temperature(SCORE_TEMPERATURE)
                .with_max_tokens(256);

            let score = match self.llm.complete(request).await {
                Ok(response) => match extract_json_object(&response.content) {
                    Ok(value) => value.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0),
                    Err(e) => {
                        warn!(
                            chunk_id = %document.chunk_id,
                            error = %e,
                            "Unparseable rerank response; scoring 0"
                        );
                        0.0
                    }
                },
                Err(e) => {
                    warn!(
                        chunk_id = %document.chunk_id,
                        error = %e,
                        "Rerank call failed; scoring 0"
                    );
                    0.0
                }
            };

            scored.push((document, score));
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(document, _)| document).collect()
    }

    /// Generate the final answer from the surviving documents plus recent
    /// history. Every claim must carry an inline citation; contacts found in
    /// document text seed the closing guidance.
    async fn generate(
        &self,
        question: &str,
        documents: &[Document],
        history: &[ConversationTurn],
    ) -> Result<String, Error> {
        let history_context = format_history(history, HISTORY_TURNS, 100);

        let doc_context = documents
            .iter()
            .map(|d| format!("Source Name: {}\nContent: {}", d.title, d.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let contacts = extract_contacts(documents);
        let contact_guidance = if contacts.is_empty() {
            "No specific contact information was found in the documents.".to_string()
        } else {
            format!("Specific contact(s) found: {}", contacts.join(", "))
        };

        let prompt = format!(
            "You are a professional, helpful, and highly-trained assistant for the procurement \
             department.\n\n\
             CRITICAL INSTRUCTIONS:\n\
             1. Your entire response MUST be based ONLY on the \"SOURCE DOCUMENTS\". Never use \
             outside knowledge.\n\
             2. You MUST add inline citations after each claim, like \
             `[Source Name: filename.pdf]`.\n\
             3. If the documents don't answer the question, state that clearly.\n\
             4. Conclude naturally: after the main answer, provide a helpful closing informed by \
             the \"GUIDANCE FOR CLOSING\" section. Vary your language to sound human.\n\n\
             ---\nCONVERSATION HISTORY:\n{history_context}\n\
             ---\nSOURCE DOCUMENTS:\n{doc_context}\n\
             ---\nGUIDANCE FOR CLOSING:\n{contact_guidance}\n---\n\n\
             USER'S QUESTION: \"{question}\"\n\n\
             YOUR PROFESSIONAL RESPONSE (with citations and a natural closing):"
        );

        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(GENERATE_TEMPERATURE)
            .with_max_tokens(1024);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| Error::Pipeline(PipelineError::Generation(e.to_string())))?;

        Ok(response.content.trim().to_string())
    }

    /// Produce the no-documents response: acknowledge, state the limitation,
    /// suggest a next step. Never invents an answer.
    async fn fallback(&self, question: &str) -> Result<String, Error> {
        let prompt = format!(
            "You are a helpful procurement assistant. A search was performed for a user's \
             question, but no directly relevant documents were found.\n\n\
             Your task is to inform the user of this limitation in a professional and helpful \
             way. DO NOT invent an answer.\n\n\
             USER'S QUESTION: \"{question}\"\n\n\
             Compose a brief response that:\n\
             1. Acknowledges their question.\n\
             2. States that you were unable to find specific information in the available \
             documents.\n\
             3. Suggests a general next step, such as contacting the procurement department \
             directly for the most accurate guidance.\n\n\
             Response:"
        );

        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_temperature(FALLBACK_TEMPERATURE)
            .with_max_tokens(512);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| Error::Pipeline(PipelineError::Fallback(e.to_string())))?;

        Ok(response.content.trim().to_string())
    }
}

/// Extract "Name: X Email: Y" pairs from document text as "X (Y)" strings,
/// deduplicated while preserving first-seen order.
fn extract_contacts(documents: &[Document]) -> Vec<String> {
    let mut contacts = Vec::new();
    for document in documents {
        for capture in CONTACT_RE.captures_iter(&document.content) {
            let contact = format!("{} ({})", capture[1].trim(), capture[2].trim());
            if !contacts.contains(&contact) {
                contacts.push(contact);
            }
        }
    }
    contacts
}
