//! In-process vector index with cosine distance.
//!
//! Used for tests and for small, locally ingested document sets where a
//! Qdrant server would be overkill.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use unidesk_core::error::RetrievalError;
use unidesk_core::retrieval::{Document, MetadataFilter, VectorStore};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Cosine distance in [0, 2]; 0 means same direction.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).max(0.0)
}

struct IndexedDocument {
    document: Document,
    embedding: Vec<f32>,
}

/// Brute-force cosine index over documents held in memory.
#[derive(Clone, Default)]
pub struct InMemoryVectorStore {
    entries: Arc<RwLock<Vec<IndexedDocument>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, document: Document, embedding: Vec<f32>) {
        self.entries.write().await.push(IndexedDocument {
            document,
            embedding,
        });
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<(Document, f32)>, RetrievalError> {
        let entries = self.entries.read().await;

        let mut hits: Vec<(Document, f32)> = entries
            .iter()
            .filter(|e| filter.matches(&e.document.metadata))
            .map(|e| (e.document.clone(), cosine_distance(&e.embedding, embedding)))
            .collect();

        // Stable: equal distances keep insertion order.
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(k);
        Ok(hits)
    }
}
