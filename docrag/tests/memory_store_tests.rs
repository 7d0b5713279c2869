//! Property tests for vector store search ordering.

use std::collections::HashMap;

use docrag::{Chunk, MemoryVectorStore, Modality, VectorRecord, VectorStore};
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

/// Generate a record with a normalized embedding.
fn arb_record(dim: usize) -> impl Strategy<Value = VectorRecord> {
    ("[a-z]{3,8}", 0usize..50, "[a-z ]{5,30}", arb_normalized_embedding(dim)).prop_map(
        |(document_id, ordinal, text, embedding)| VectorRecord {
            chunk: Chunk {
                id: format!("{document_id}:{ordinal}"),
                document_id,
                ordinal,
                text,
                modality: Modality::Text,
                metadata: HashMap::new(),
            },
            embedding,
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// For any stored records and query, results come back ordered by
    /// descending score, capped at `min(top_k, stored)`.
    #[test]
    fn results_ordered_descending_and_bounded_by_top_k(
        records in proptest::collection::vec(arb_record(16), 1..20),
        query in arb_normalized_embedding(16),
        top_k in 1usize..25,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (results, unique_count) = rt.block_on(async {
            let store = MemoryVectorStore::new();

            let mut deduped: HashMap<String, VectorRecord> = HashMap::new();
            for record in &records {
                deduped.entry(record.chunk.id.clone()).or_insert_with(|| record.clone());
            }
            let unique: Vec<VectorRecord> = deduped.into_values().collect();
            let count = unique.len();

            store.put(&unique).await.unwrap();
            (store.query(&query, top_k).await.unwrap(), count)
        });

        prop_assert!(results.len() <= top_k);
        prop_assert!(results.len() <= unique_count);
        prop_assert_eq!(results.len(), top_k.min(unique_count));

        for window in results.windows(2) {
            prop_assert!(
                window[0].score >= window[1].score,
                "results not in descending order: {} < {}",
                window[0].score,
                window[1].score,
            );
        }
    }

    /// Records with identical embeddings tie on score and come back in
    /// `(document_id, ordinal)` order.
    #[test]
    fn ties_are_broken_by_document_then_ordinal(
        embedding in arb_normalized_embedding(8),
        ordinals in proptest::collection::hash_set(0usize..30, 2..8),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let results = rt.block_on(async {
            let store = MemoryVectorStore::new();
            let records: Vec<VectorRecord> = ordinals
                .iter()
                .map(|&ordinal| VectorRecord {
                    chunk: Chunk {
                        id: format!("doc:{ordinal}"),
                        document_id: "doc".to_string(),
                        ordinal,
                        text: "same".to_string(),
                        modality: Modality::Text,
                        metadata: HashMap::new(),
                    },
                    embedding: embedding.clone(),
                })
                .collect();
            store.put(&records).await.unwrap();
            store.query(&embedding, records.len()).await.unwrap()
        });

        let returned: Vec<usize> = results.iter().map(|r| r.chunk.ordinal).collect();
        let mut sorted = returned.clone();
        sorted.sort_unstable();
        prop_assert_eq!(returned, sorted);
    }
}
