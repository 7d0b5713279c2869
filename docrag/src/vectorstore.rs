//! Vector store capability trait and shared ranking logic.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, ScoredChunk};
use crate::error::{RagError, Result};

/// A chunk together with its embedding, as persisted in a store.
///
/// Invariant: a record always carries both halves; a chunk without a
/// vector (or the reverse) is never a valid state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// The chunk.
    pub chunk: Chunk,
    /// Its embedding vector.
    pub embedding: Vec<f32>,
}

/// A storage backend for embeddings with nearest-neighbor search.
///
/// The interface is deliberately narrow — put, query, delete-all, count —
/// so any concrete engine can be swapped without touching the index
/// manager or the retriever.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store records. Records with an existing chunk ID replace the old
    /// record.
    async fn put(&self, records: &[VectorRecord]) -> Result<()>;

    /// Return the `top_k` records most similar to `embedding`, ordered
    /// by descending score with ties broken by `(document_id, ordinal)`.
    ///
    /// Fails with [`RagError::DimensionMismatch`] if the query vector's
    /// dimensionality differs from the stored vectors'.
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;

    /// Remove every record.
    async fn delete_all(&self) -> Result<()>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize>;
}

/// Cosine similarity; 0.0 if either vector has zero magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Check that a query vector matches the dimensionality of the stored
/// records (no-op on an empty store).
pub(crate) fn check_dimensions(records: &[&VectorRecord], query: &[f32]) -> Result<()> {
    if let Some(first) = records.first() {
        if first.embedding.len() != query.len() {
            return Err(RagError::DimensionMismatch {
                expected: first.embedding.len(),
                actual: query.len(),
            });
        }
    }
    Ok(())
}

/// Score records against a query vector and return the top `k`, ordered
/// by descending score with `(document_id, ordinal)` tie-break.
pub(crate) fn rank(records: &[&VectorRecord], query: &[f32], top_k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = records
        .iter()
        .map(|record| ScoredChunk {
            chunk: record.chunk.clone(),
            score: cosine_similarity(&record.embedding, query),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
            .then_with(|| a.chunk.ordinal.cmp(&b.chunk.ordinal))
    });
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::Modality;

    fn record(document_id: &str, ordinal: usize, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk: Chunk {
                id: format!("{document_id}:{ordinal}"),
                document_id: document_id.to_string(),
                ordinal,
                text: "text".to_string(),
                modality: Modality::Text,
                metadata: HashMap::new(),
            },
            embedding,
        }
    }

    #[test]
    fn equal_scores_break_ties_by_document_then_ordinal() {
        let records = vec![
            record("doc", 2, vec![1.0, 0.0]),
            record("doc", 0, vec![1.0, 0.0]),
            record("doc", 1, vec![1.0, 0.0]),
        ];
        let refs: Vec<&VectorRecord> = records.iter().collect();
        let ranked = rank(&refs, &[1.0, 0.0], 3);
        let ordinals: Vec<usize> = ranked.iter().map(|r| r.chunk.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn rank_caps_at_top_k() {
        let records = vec![
            record("doc", 0, vec![1.0, 0.0]),
            record("doc", 1, vec![0.5, 0.5]),
            record("doc", 2, vec![0.0, 1.0]),
        ];
        let refs: Vec<&VectorRecord> = records.iter().collect();
        assert_eq!(rank(&refs, &[1.0, 0.0], 2).len(), 2);
        assert_eq!(rank(&refs, &[1.0, 0.0], 10).len(), 3);
    }

    #[test]
    fn mismatched_query_dimension_is_rejected() {
        let records = vec![record("doc", 0, vec![1.0, 0.0, 0.0])];
        let refs: Vec<&VectorRecord> = records.iter().collect();
        let err = check_dimensions(&refs, &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));
    }
}
