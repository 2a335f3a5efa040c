//! Embedding adapters.

use async_trait::async_trait;
use std::sync::Arc;
use unidesk_core::error::RetrievalError;
use unidesk_core::provider::{EmbeddingRequest, Provider};
use unidesk_core::retrieval::Embedder;

/// Embeds text through an LLM provider's embeddings endpoint.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::EmbeddingFailed("Provider returned no embedding".into()))
    }
}

/// Deterministic, offline embedder: a normalized byte-hash projection.
///
/// Similar strings do not get similar vectors; use it only where the
/// ranking itself is not under test.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let hash = text
            .bytes()
            .fold(0xcbf29ce484222325u64, |acc, b| {
                (acc ^ b as u64).wrapping_mul(0x100000001b3)
            });
        let mut embedding: Vec<f32> = (0..self.dimension)
            .map(|i| ((hash.rotate_left(i as u32 % 64) ^ i as u64) % 1000) as f32 / 1000.0 - 0.5)
            .collect();
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unidesk_core::error::ProviderError;
    use unidesk_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};

    struct FakeEmbeddingProvider {
        fail: bool,
    }

    #[async_trait]
    impl Provider for FakeEmbeddingProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("chat not supported".into()))
        }

        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            if self.fail {
                return Err(ProviderError::RateLimited { retry_after_secs: 5 });
            }
            Ok(EmbeddingResponse {
                embeddings: request
                    .inputs
                    .iter()
                    .map(|t| vec![t.len() as f32, 1.0])
                    .collect(),
                model: request.model,
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn provider_embedder_returns_first_vector() {
        let embedder = ProviderEmbedder::new(
            Arc::new(FakeEmbeddingProvider { fail: false }),
            "text-embedding-3-large",
        );
        assert_eq!(embedder.embed("abc").await.unwrap(), vec![3.0, 1.0]);
    }

    #[tokio::test]
    async fn provider_failure_is_embedding_error() {
        let embedder = ProviderEmbedder::new(Arc::new(FakeEmbeddingProvider { fail: true }), "m");
        let err = embedder.embed("abc").await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingFailed(_)));
    }

    #[tokio::test]
    async fn hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("aynı metin").await.unwrap();
        let b = embedder.embed("aynı metin").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }
}
