//! Course-scoped similarity retrieval.

use std::sync::Arc;
use tracing::{debug, info};
use unidesk_core::error::RetrievalError;
use unidesk_core::retrieval::{
    Embedder, MAX_K, MetadataFilter, RetrievalQuery, RetrievedChunk, VectorStore,
};

/// Embeds a query, searches one course's chunks and scores the hits.
///
/// Output is ordered nearest first (so non-increasing by relevance) and
/// never contains a chunk scoring below the query's threshold.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub async fn retrieve(
        &self,
        query: &RetrievalQuery,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let course_id = query
            .course_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(RetrievalError::MissingCourseId)?;

        let k = query.k.clamp(1, MAX_K);
        let embedding = self.embedder.embed(&query.query).await?;

        let mut hits = self
            .store
            .search(&embedding, k, &MetadataFilter::course(course_id))
            .await?;

        // Stores promise ascending order; enforce it without disturbing ties.
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(k);
        let found = hits.len();

        let chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .map(|(doc, distance)| RetrievedChunk::from_hit(doc, distance))
            .filter(|c| c.relevance_score >= query.score_threshold)
            .collect();

        debug!(course_id, k, found, kept = chunks.len(), "Retrieval scored");
        info!(
            store = self.store.name(),
            course_id,
            results = chunks.len(),
            "Retrieved course materials"
        );
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::InMemoryVectorStore;
    use async_trait::async_trait;
    use unidesk_core::retrieval::{COURSE_ID_KEY, Document};

    /// Embeds every query to the same vector so the store's fixed
    /// distances decide the ranking.
    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
            Ok(vec![1.0, 0.0])
        }
    }

    /// Returns canned `(document, distance)` pairs.
    struct FixedStore {
        hits: Vec<(Document, f32)>,
        fail: bool,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn search(
            &self,
            _embedding: &[f32],
            k: usize,
            filter: &MetadataFilter,
        ) -> Result<Vec<(Document, f32)>, RetrievalError> {
            if self.fail {
                return Err(RetrievalError::StoreUnavailable("connection refused".into()));
            }
            Ok(self
                .hits
                .iter()
                .filter(|(d, _)| filter.matches(&d.metadata))
                .take(k)
                .cloned()
                .collect())
        }
    }

    fn chunk(content: &str) -> Document {
        Document::new(content).with_metadata(COURSE_ID_KEY, "regulations")
    }

    fn retriever(hits: Vec<(Document, f32)>) -> Retriever {
        Retriever::new(
            Arc::new(ConstEmbedder),
            Arc::new(FixedStore { hits, fail: false }),
        )
    }

    #[tokio::test]
    async fn threshold_drops_far_chunks() {
        let r = retriever(vec![(chunk("A"), 0.2), (chunk("B"), 3.0)]);
        let query = RetrievalQuery::new("staj", Some("regulations".into())).with_threshold(0.5);

        let chunks = r.retrieve(&query).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "A");
        assert!((chunks[0].relevance_score - 1.0 / 1.2).abs() < 1e-5);
        assert!((chunks[0].distance - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn relevance_is_non_increasing() {
        let r = retriever(vec![
            (chunk("a"), 0.1),
            (chunk("b"), 0.5),
            (chunk("c"), 0.5),
            (chunk("d"), 2.0),
        ]);
        let chunks = r
            .retrieve(&RetrievalQuery::new("q", Some("regulations".into())))
            .await
            .unwrap();
        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c", "d"]);
        assert!(chunks.windows(2).all(|w| w[0].relevance_score >= w[1].relevance_score));
    }

    #[tokio::test]
    async fn missing_course_id_is_an_error() {
        let r = retriever(vec![(chunk("A"), 0.2)]);
        let err = r.retrieve(&RetrievalQuery::new("q", None)).await.unwrap_err();
        assert!(matches!(err, RetrievalError::MissingCourseId));

        let blank = RetrievalQuery::new("q", Some("  ".into()));
        assert!(matches!(
            r.retrieve(&blank).await.unwrap_err(),
            RetrievalError::MissingCourseId
        ));
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let r = Retriever::new(
            Arc::new(ConstEmbedder),
            Arc::new(FixedStore {
                hits: vec![],
                fail: true,
            }),
        );
        let err = r
            .retrieve(&RetrievalQuery::new("q", Some("regulations".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn k_is_clamped_and_results_are_idempotent() {
        let store = InMemoryVectorStore::new();
        for i in 0..30 {
            store
                .insert(chunk(&format!("c{i:02}")), vec![1.0, i as f32 / 10.0])
                .await;
        }
        let r = Retriever::new(Arc::new(ConstEmbedder), Arc::new(store));
        let query = RetrievalQuery::new("q", Some("regulations".into())).with_k(100);
        assert_eq!(query.k, 20);

        let first = r.retrieve(&query).await.unwrap();
        let second = r.retrieve(&query).await.unwrap();
        assert_eq!(first.len(), 20);
        assert_eq!(first, second);
        assert_eq!(first[0].content, "c00");
    }
}
