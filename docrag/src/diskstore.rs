//! Persistent vector store backed by a JSON-lines segment file.
//!
//! Each record is one serialized [`VectorRecord`] per line. The whole
//! segment is loaded into memory on open and queried with cosine
//! similarity; writes append to the segment. Duplicate chunk IDs keep
//! the last-written record, both in memory and on reload.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::ScoredChunk;
use crate::error::{RagError, Result};
use crate::vectorstore::{check_dimensions, rank, VectorRecord, VectorStore};

const SEGMENT_FILE: &str = "records.jsonl";

/// A [`VectorStore`] persisted under a directory on disk.
#[derive(Debug)]
pub struct DiskVectorStore {
    segment: PathBuf,
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl DiskVectorStore {
    /// Create a fresh, empty store under `dir`, creating the directory
    /// and an empty segment file.
    pub async fn create(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| RagError::IndexBuild(format!("failed to create {}: {e}", dir.display())))?;
        let segment = dir.join(SEGMENT_FILE);
        tokio::fs::write(&segment, b"")
            .await
            .map_err(|e| RagError::IndexBuild(format!("failed to create segment: {e}")))?;
        Ok(Self { segment, records: RwLock::new(HashMap::new()) })
    }

    /// Reopen a previously persisted store under `dir`.
    ///
    /// Fails if the segment file is missing or any line fails to parse.
    pub async fn open(dir: &Path) -> Result<Self> {
        let segment = dir.join(SEGMENT_FILE);
        let raw = tokio::fs::read_to_string(&segment).await.map_err(|e| {
            RagError::IndexBuild(format!("failed to read {}: {e}", segment.display()))
        })?;

        let mut records = HashMap::new();
        for (number, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: VectorRecord = serde_json::from_str(line).map_err(|e| {
                RagError::IndexBuild(format!("bad record at line {}: {e}", number + 1))
            })?;
            records.insert(record.chunk.id.clone(), record);
        }

        debug!(path = %segment.display(), count = records.len(), "opened disk vector store");
        Ok(Self { segment, records: RwLock::new(records) })
    }

    /// Whether every stored vector has the expected dimensionality.
    pub async fn verify_dimensions(&self, expected: usize) -> bool {
        self.records.read().await.values().all(|r| r.embedding.len() == expected)
    }
}

#[async_trait]
impl VectorStore for DiskVectorStore {
    async fn put(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut lines = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| RagError::IndexBuild(format!("failed to serialize record: {e}")))?;
            lines.push_str(&line);
            lines.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.segment)
            .await
            .map_err(|e| RagError::IndexBuild(format!("failed to open segment: {e}")))?;
        file.write_all(lines.as_bytes())
            .await
            .map_err(|e| RagError::IndexBuild(format!("failed to write segment: {e}")))?;
        file.flush()
            .await
            .map_err(|e| RagError::IndexBuild(format!("failed to flush segment: {e}")))?;

        let mut map = self.records.write().await;
        for record in records {
            map.insert(record.chunk.id.clone(), record.clone());
        }
        debug!(count = records.len(), "persisted records");
        Ok(())
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let map = self.records.read().await;
        let records: Vec<&VectorRecord> = map.values().collect();
        check_dimensions(&records, embedding)?;
        Ok(rank(&records, embedding, top_k))
    }

    async fn delete_all(&self) -> Result<()> {
        tokio::fs::write(&self.segment, b"")
            .await
            .map_err(|e| RagError::IndexBuild(format!("failed to truncate segment: {e}")))?;
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
    async fn records_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let store = DiskVectorStore::create(dir.path()).await.unwrap();
        store.put(&[record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])]).await.unwrap();
        drop(store);

        let reopened = DiskVectorStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);

        let results = reopened.query(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].chunk.id, "a");
    }

    #[tokio::test]
    async fn opening_a_missing_store_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DiskVectorStore::open(&dir.path().join("absent")).await.is_err());
    }

    #[tokio::test]
    async fn corrupt_lines_are_rejected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SEGMENT_FILE), "{not json}\n").unwrap();
        assert!(DiskVectorStore::open(dir.path()).await.is_err());
    }
}
