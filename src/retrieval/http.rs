//! HTTP backends for the search and embedding services.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::{EmbeddingConfig, SearchConfig};
use crate::error::SearchError;

use super::{Document, Embedder, SearchBackend, SearchRequest};

const SEARCH_API_VERSION: &str = "2023-11-01";

/// REST client for the hybrid search service.
pub struct HttpSearchBackend {
    client: reqwest::Client,
    config: SearchConfig,
}

impl HttpSearchBackend {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn index_url(&self) -> String {
        format!(
            "{}/indexes/{}?api-version={}",
            self.config.endpoint, self.config.index_name, SEARCH_API_VERSION
        )
    }

    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.config.endpoint, self.config.index_name, SEARCH_API_VERSION
        )
    }
}

#[derive(Deserialize)]
struct IndexSchema {
    #[serde(default)]
    semantic: Option<SemanticSchema>,
}

#[derive(Deserialize)]
struct SemanticSchema {
    #[serde(default)]
    configurations: Vec<SemanticConfiguration>,
}

#[derive(Deserialize)]
struct SemanticConfiguration {
    name: Option<String>,
}

#[derive(Deserialize)]
struct SearchResults {
    #[serde(default)]
    value: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(default)]
    chunk_id: String,
    #[serde(default)]
    chunk: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    parent_id: String,
    #[serde(rename = "@search.score", default)]
    search_score: f64,
    #[serde(rename = "@search.rerankerScore", default)]
    reranker_score: f64,
    #[serde(rename = "@search.captions", default)]
    captions: Vec<SearchCaption>,
}

#[derive(Deserialize)]
struct SearchCaption {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn semantic_config(&self) -> Result<Option<String>, SearchError> {
        let response = self
            .client
            .get(self.index_url())
            .header("api-key", self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(SearchError::BadStatus {
                status: response.status().as_u16(),
            });
        }

        let schema: IndexSchema = response.json().await.map_err(|e| SearchError::RequestFailed {
            reason: e.to_string(),
        })?;

        Ok(schema
            .semantic
            .and_then(|s| s.configurations.into_iter().next())
            .and_then(|c| c.name))
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<Document>, SearchError> {
        let mut body = json!({
            "vectorQueries": [{
                "kind": "vector",
                "vector": request.vector,
                "fields": "text_vector",
                "k": request.candidate_pool,
            }],
            "select": "chunk_id,chunk,title,parent_id",
        });

        if let Some(ref keyword) = request.keyword_query {
            body["search"] = json!(keyword);
        }
        if let Some(top) = request.top {
            body["top"] = json!(top);
        }
        let has_semantic = request.semantic.is_some();
        if let Some(ref semantic) = request.semantic {
            body["queryType"] = json!("semantic");
            body["semanticConfiguration"] = json!(semantic.config_name);
            if semantic.extractive_captions {
                body["captions"] = json!("extractive");
                body["answers"] = json!("extractive");
            }
        }

        let response = self
            .client
            .post(self.search_url())
            .header("api-key", self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(SearchError::BadStatus {
                status: response.status().as_u16(),
            });
        }

        let results: SearchResults =
            response.json().await.map_err(|e| SearchError::RequestFailed {
                reason: e.to_string(),
            })?;

        debug!(hits = results.value.len(), semantic = has_semantic, "Search response parsed");

        Ok(results
            .value
            .into_iter()
            .map(|hit| Document {
                chunk_id: hit.chunk_id,
                title: hit.title,
                parent_id: hit.parent_id,
                content: hit.chunk,
                keyword_score: hit.search_score,
                rerank_score: if has_semantic { hit.reranker_score } else { 0.0 },
                caption: hit
                    .captions
                    .into_iter()
                    .next()
                    .map(|c| c.text)
                    .filter(|t| !t.is_empty()),
            })
            .collect())
    }
}

/// REST client for the embedding service (OpenAI-style embeddings endpoint).
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingBody {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let body = json!({
            "model": self.config.model,
            "input": text,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("api-key", self.config.api_key.expose_secret())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::EmbeddingFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(SearchError::EmbeddingFailed {
                reason: format!("status {}", response.status().as_u16()),
            });
        }

        let parsed: EmbeddingBody =
            response.json().await.map_err(|e| SearchError::EmbeddingFailed {
                reason: e.to_string(),
            })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| SearchError::EmbeddingFailed {
                reason: "embedding response had no data".to_string(),
            })
    }
}
