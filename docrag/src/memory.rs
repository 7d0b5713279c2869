//! In-memory vector store using cosine similarity.
//!
//! Suitable for tests, development, and small corpora; nothing survives
//! the process. The persistent counterpart is
//! [`DiskVectorStore`](crate::diskstore::DiskVectorStore).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::ScoredChunk;
use crate::error::Result;
use crate::vectorstore::{check_dimensions, rank, VectorRecord, VectorStore};

/// An in-memory vector store keyed by chunk ID.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl MemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn put(&self, records: &[VectorRecord]) -> Result<()> {
        let mut map = self.records.write().await;
        for record in records {
            map.insert(record.chunk.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let map = self.records.read().await;
        let records: Vec<&VectorRecord> = map.values().collect();
        check_dimensions(&records, embedding)?;
        Ok(rank(&records, embedding, top_k))
    }

    async fn delete_all(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::{Chunk, Modality};

    fn record(id: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk: Chunk {
                id: id.to_string(),
                document_id: "doc".to_string(),
                ordinal: 0,
                text: format!("chunk {id}"),
                modality: Modality::Text,
                metadata: HashMap::new(),
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn put_replaces_records_with_the_same_id() {
        let store = MemoryVectorStore::new();
        store.put(&[record("a", vec![1.0, 0.0])]).await.unwrap();
        store.put(&[record("a", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let results = store.query(&[0.0, 1.0], 1).await.unwrap();
        assert!(results[0].score > 0.99);
    }

    #[tokio::test]
    async fn delete_all_empties_the_store() {
        let store = MemoryVectorStore::new();
        store.put(&[record("a", vec![1.0]), record("b", vec![0.5])]).await.unwrap();
        store.delete_all().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.query(&[1.0], 5).await.unwrap().is_empty());
    }
}
