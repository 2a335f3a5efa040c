//! Qdrant vector store over the REST API.
//!
//! Points are expected in the layout LangChain-style ingestion writes:
//! payload `{ "page_content": "...", "metadata": { "course_id": ..., ... } }`
//! in a collection configured with cosine distance. Qdrant reports cosine
//! *similarity* as `score`; it is converted to a distance (`1 - score`)
//! before leaving this module.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use unidesk_core::error::RetrievalError;
use unidesk_core::retrieval::{Document, MetadataFilter, VectorStore};

/// A Qdrant collection reached over HTTP.
pub struct QdrantStore {
    base_url: String,
    collection: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantStore {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        }
    }

    fn search_url(&self) -> String {
        format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        )
    }

    fn search_body(embedding: &[f32], k: usize, filter: &MetadataFilter) -> Value {
        serde_json::json!({
            "vector": embedding,
            "limit": k,
            "with_payload": true,
            "filter": {
                "must": [{
                    "key": format!("metadata.{}", filter.key),
                    "match": { "value": filter.value }
                }]
            }
        })
    }

    fn into_hits(points: Vec<ScoredPoint>) -> Vec<(Document, f32)> {
        let mut hits: Vec<(Document, f32)> = points
            .into_iter()
            .map(|p| {
                let mut payload = p.payload.unwrap_or_default();
                let content = match payload.remove("page_content") {
                    Some(Value::String(s)) => s,
                    _ => String::new(),
                };
                let metadata = match payload.remove("metadata") {
                    Some(Value::Object(m)) => m,
                    _ => Map::new(),
                };
                let distance = (1.0 - p.score).max(0.0);
                (Document { content, metadata }, distance)
            })
            .collect();
        // Qdrant already returns best-first; keep that order on ties.
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<(Document, f32)>, RetrievalError> {
        let mut request = self
            .client
            .post(self.search_url())
            .json(&Self::search_body(embedding, k, filter));
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RetrievalError::StoreUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(collection = %self.collection, status = status.as_u16(), body = %body, "Qdrant search failed");
            return Err(RetrievalError::SearchFailed(format!(
                "Qdrant returned {status}: {body}"
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::SearchFailed(format!("Invalid Qdrant response: {e}")))?;

        debug!(collection = %self.collection, hits = parsed.result.len(), "Qdrant search complete");
        Ok(Self::into_hits(parsed.result))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}
