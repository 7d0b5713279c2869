//! Embedding provider trait and timeout plumbing.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text.
///
/// Implementations wrap specific backends behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends with native batching should override it. Chunks are embedded
/// independently, so batching never changes results.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// The dimensionality of embeddings produced by this provider.
    ///
    /// Must be constant for the provider's lifetime; an index records it
    /// in its manifest and rejects anything else.
    fn dimensions(&self) -> usize;

    /// A stable identifier for the underlying model, recorded in the
    /// index manifest.
    fn model_id(&self) -> &str;
}

/// Embed a single text with the configured timeout.
pub(crate) async fn embed_timed(
    provider: &dyn EmbeddingProvider,
    text: &str,
    limit: Duration,
) -> Result<Vec<f32>> {
    tokio::time::timeout(limit, provider.embed(text))
        .await
        .map_err(|_| RagError::Timeout { operation: "embedding".to_string(), limit })?
}

/// Embed a batch of texts with the configured timeout.
pub(crate) async fn embed_batch_timed(
    provider: &dyn EmbeddingProvider,
    texts: &[&str],
    limit: Duration,
) -> Result<Vec<Vec<f32>>> {
    tokio::time::timeout(limit, provider.embed_batch(texts))
        .await
        .map_err(|_| RagError::Timeout { operation: "embedding".to_string(), limit })?
}

/// A deterministic local embedder based on hashed bag-of-words.
///
/// Each lowercase alphanumeric token is hashed into one of `dimensions`
/// buckets and the resulting count vector is L2-normalized, so texts
/// sharing vocabulary score high under cosine similarity. No network,
/// no model weights; intended for tests, offline development, and as
/// the fallback when no remote embedding backend is configured.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashEmbedder {
    /// Create a hash embedder producing vectors of the given dimension.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, model_id: format!("hash-bow-{dimensions}") }
    }
}

/// FNV-1a, so bucket assignment is stable across processes.
fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
        {
            let bucket = (fnv1a(&token) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        debug!(model = %self.model_id, text_len = text.len(), "embedded text");
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("net income was two million").await.unwrap();
        let b = embedder.embed("net income was two million").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::new(128);
        let query = embedder.embed("what was net income").await.unwrap();
        let close = embedder.embed("net income was $2M").await.unwrap();
        let far = embedder.embed("revenue grew ten percent in the quarter").await.unwrap();

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&query, &close) > dot(&query, &far));
    }

    #[tokio::test]
    async fn slow_embedders_surface_timeouts() {
        struct Stalled;

        #[async_trait]
        impl EmbeddingProvider for Stalled {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(vec![0.0])
            }

            fn dimensions(&self) -> usize {
                1
            }

            fn model_id(&self) -> &str {
                "stalled"
            }
        }

        let err = embed_timed(&Stalled, "hi", Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, RagError::Timeout { .. }));
    }
}
