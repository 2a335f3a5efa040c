//! Retrieval domain types — documents, chunks, and the store/embedder seams.
//!
//! Stores report `(document, distance)` pairs in ascending distance order.
//! Relevance is always derived from distance as `1 / (1 + distance)`;
//! stores that natively report a similarity convert it to a distance first.

use crate::error::RetrievalError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default number of chunks to retrieve.
pub const DEFAULT_K: usize = 5;

/// Upper bound on chunks per retrieval.
pub const MAX_K: usize = 20;

/// Metadata key every indexed chunk carries.
pub const COURSE_ID_KEY: &str = "course_id";

/// A stored chunk of source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One retrieval hit, scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub metadata: Map<String, Value>,
    /// `1 / (1 + distance)`, in (0, 1]
    pub relevance_score: f32,
    pub distance: f32,
}

impl RetrievedChunk {
    pub fn from_hit(document: Document, distance: f32) -> Self {
        let distance = distance.max(0.0);
        Self {
            content: document.content,
            metadata: document.metadata,
            relevance_score: relevance_from_distance(distance),
            distance,
        }
    }
}

/// Exact-match filter on one metadata key.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFilter {
    pub key: String,
    pub value: Value,
}

impl MetadataFilter {
    pub fn course(course_id: impl Into<String>) -> Self {
        Self {
            key: COURSE_ID_KEY.to_string(),
            value: Value::String(course_id.into()),
        }
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        metadata.get(&self.key) == Some(&self.value)
    }
}

/// Parameters of one similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    pub query: String,
    pub course_id: Option<String>,
    pub k: usize,
    pub score_threshold: f32,
}

impl RetrievalQuery {
    pub fn new(query: impl Into<String>, course_id: Option<String>) -> Self {
        Self {
            query: query.into(),
            course_id,
            k: DEFAULT_K,
            score_threshold: 0.0,
        }
    }

    /// Set `k`, clamped to `[1, MAX_K]`.
    pub fn with_k(mut self, k: i64) -> Self {
        self.k = clamp_k(k);
        self
    }

    pub fn with_threshold(mut self, score_threshold: f32) -> Self {
        self.score_threshold = score_threshold;
        self
    }
}

/// Clamp a requested chunk count to `[1, MAX_K]`.
pub fn clamp_k(k: i64) -> usize {
    k.clamp(1, MAX_K as i64) as usize
}

pub fn relevance_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// A vector similarity index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `k` documents matching `filter`, nearest first.
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> std::result::Result<Vec<(Document, f32)>, RetrievalError>;
}

/// Text to fixed-length vector. Must be deterministic for identical input.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, RetrievalError>;
}
