//! Index lifecycle: build, load, clear.
//!
//! The [`IndexManager`] exclusively owns the persisted state at its
//! configured location. Two on-disk artifacts live under the storage
//! root — `vectors/` (chunk + embedding records) and `index/` (the
//! manifest) — and are always created and removed together. Builds
//! write into a staging directory and swap it in only on full success,
//! so a failed build never disturbs the previous index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::RagConfig;
use crate::diskstore::DiskVectorStore;
use crate::document::Chunk;
use crate::embedding::{embed_batch_timed, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorRecord, VectorStore};

const FORMAT_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";

/// Metadata persisted alongside the vector records.
///
/// `load` rejects any persisted state whose manifest disagrees with the
/// vector store (count or dimensionality) or with this crate's format
/// version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    /// On-disk format version.
    pub version: u32,
    /// Identifier of the embedding model the index was built with.
    pub model_id: String,
    /// Dimensionality of every stored vector.
    pub dimensions: usize,
    /// Number of stored chunks.
    pub chunk_count: usize,
    /// When the build completed.
    pub built_at: DateTime<Utc>,
}

/// The fixed directory layout under a storage root.
#[derive(Debug, Clone)]
struct Layout {
    root: PathBuf,
}

impl Layout {
    fn vectors(&self) -> PathBuf {
        self.root.join("vectors")
    }

    fn index(&self) -> PathBuf {
        self.root.join("index")
    }

    fn staging(&self) -> PathBuf {
        self.root.join(".staging")
    }

    fn manifest(&self) -> PathBuf {
        self.index().join(MANIFEST_FILE)
    }
}

/// A handle to a loaded index: read-only, cheap to clone behind an
/// `Arc`, and safe to query from any number of tasks concurrently.
pub struct Index {
    pub(crate) manifest: IndexManifest,
    pub(crate) store: Arc<dyn VectorStore>,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) embed_timeout: std::time::Duration,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("manifest", &self.manifest)
            .field("embed_timeout", &self.embed_timeout)
            .finish_non_exhaustive()
    }
}

impl Index {
    /// The manifest the index was opened with.
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Number of chunks in the index.
    pub fn chunk_count(&self) -> usize {
        self.manifest.chunk_count
    }
}

/// Owns the lifecycle of the persistent index at one storage location.
pub struct IndexManager {
    layout: Layout,
    embedder: Arc<dyn EmbeddingProvider>,
    embed_timeout: std::time::Duration,
    // Serializes build and clear per location; queries never take it.
    build_lock: Mutex<()>,
}

impl IndexManager {
    /// Create a manager for the storage location in `config`, using the
    /// given embedder for builds and for queries against loaded indexes.
    pub fn new(config: &RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            layout: Layout { root: config.storage_dir.clone() },
            embedder,
            embed_timeout: config.embed_timeout,
            build_lock: Mutex::new(()),
        }
    }

    /// The storage root this manager owns.
    pub fn location(&self) -> &Path {
        &self.layout.root
    }

    /// Build a fresh index from `chunks`, replacing any existing index
    /// at this location wholesale.
    ///
    /// Embeds every chunk (any embedding failure aborts the build),
    /// writes both artifacts into a staging directory, and swaps them in
    /// atomically on full success. The previous index is untouched if
    /// anything fails before the swap.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexBusy`] if another build or clear is running here
    /// - [`RagError::IndexBuild`] on invalid input or store write failure
    /// - [`RagError::Embedding`] / [`RagError::Timeout`] from the embedder
    pub async fn build(&self, chunks: &[Chunk]) -> Result<Index> {
        let _guard = self
            .build_lock
            .try_lock()
            .map_err(|_| RagError::IndexBusy { location: self.layout.root.clone() })?;

        validate_chunks(chunks)?;

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings =
            embed_batch_timed(self.embedder.as_ref(), &texts, self.embed_timeout).await?;

        if embeddings.len() != chunks.len() {
            return Err(RagError::Embedding {
                provider: self.embedder.model_id().to_string(),
                message: format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    chunks.len()
                ),
            });
        }

        let dimensions = self.embedder.dimensions();
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                if embedding.len() != dimensions {
                    return Err(RagError::Embedding {
                        provider: self.embedder.model_id().to_string(),
                        message: format!(
                            "vector of dimension {} from a {dimensions}-dimension model",
                            embedding.len()
                        ),
                    });
                }
                Ok(VectorRecord { chunk: chunk.clone(), embedding })
            })
            .collect::<Result<_>>()?;

        let manifest = IndexManifest {
            version: FORMAT_VERSION,
            model_id: self.embedder.model_id().to_string(),
            dimensions,
            chunk_count: records.len(),
            built_at: Utc::now(),
        };

        self.write_staging(&records, &manifest).await?;
        self.swap_staging_in().await?;

        info!(
            location = %self.layout.root.display(),
            chunks = manifest.chunk_count,
            dimensions,
            model = %manifest.model_id,
            "index built"
        );

        let store = DiskVectorStore::open(&self.layout.vectors()).await?;
        Ok(Index {
            manifest,
            store: Arc::new(store),
            embedder: Arc::clone(&self.embedder),
            embed_timeout: self.embed_timeout,
        })
    }

    /// Reopen the persisted index at this location.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFound`] if nothing has been built here —
    ///   recoverable, the caller should build and retry
    /// - [`RagError::IndexCorrupt`] if only one artifact is present or
    ///   the manifest disagrees with the stored vectors — requires an
    ///   explicit [`clear`](IndexManager::clear)
    pub async fn load(&self) -> Result<Index> {
        let corrupt = |reason: String| RagError::IndexCorrupt {
            location: self.layout.root.clone(),
            reason,
        };

        let have_vectors = path_exists(&self.layout.vectors()).await;
        let have_index = path_exists(&self.layout.index()).await;

        match (have_vectors, have_index) {
            (false, false) => {
                return Err(RagError::IndexNotFound { location: self.layout.root.clone() })
            }
            (true, true) => {}
            _ => {
                return Err(corrupt(
                    "vector store and index structure are out of sync; \
                     clear the index and rebuild"
                        .to_string(),
                ))
            }
        }

        let raw = tokio::fs::read_to_string(self.layout.manifest())
            .await
            .map_err(|e| corrupt(format!("unreadable manifest: {e}")))?;
        let manifest: IndexManifest =
            serde_json::from_str(&raw).map_err(|e| corrupt(format!("bad manifest: {e}")))?;

        if manifest.version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                manifest.version
            )));
        }

        let store = DiskVectorStore::open(&self.layout.vectors())
            .await
            .map_err(|e| corrupt(e.to_string()))?;

        let count = store.count().await?;
        if count != manifest.chunk_count {
            return Err(corrupt(format!(
                "manifest records {} chunks but the store holds {count}",
                manifest.chunk_count
            )));
        }
        if !store.verify_dimensions(manifest.dimensions).await {
            return Err(corrupt(format!(
                "stored vectors do not all have the manifest dimensionality {}",
                manifest.dimensions
            )));
        }

        info!(
            location = %self.layout.root.display(),
            chunks = manifest.chunk_count,
            model = %manifest.model_id,
            "index loaded"
        );

        Ok(Index {
            manifest,
            store: Arc::new(store),
            embedder: Arc::clone(&self.embedder),
            embed_timeout: self.embed_timeout,
        })
    }

    /// Delete all persisted state at this location.
    ///
    /// Removes both artifacts and any staging leftovers. Idempotent:
    /// clearing an already-empty location is a no-op.
    ///
    /// # Errors
    ///
    /// [`RagError::IndexBusy`] if a build is running here;
    /// [`RagError::IndexBuild`] if removal fails for any reason other
    /// than the path already being absent.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self
            .build_lock
            .try_lock()
            .map_err(|_| RagError::IndexBusy { location: self.layout.root.clone() })?;

        for dir in [self.layout.vectors(), self.layout.index(), self.layout.staging()] {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(RagError::IndexBuild(format!(
                        "failed to remove {}: {e}",
                        dir.display()
                    )))
                }
            }
        }

        info!(location = %self.layout.root.display(), "index cleared");
        Ok(())
    }

    /// Write both artifacts under the staging directory.
    async fn write_staging(&self, records: &[VectorRecord], manifest: &IndexManifest) -> Result<()> {
        let staging = self.layout.staging();
        if path_exists(&staging).await {
            warn!(path = %staging.display(), "removing stale staging directory");
            tokio::fs::remove_dir_all(&staging).await.map_err(|e| {
                RagError::IndexBuild(format!("failed to remove stale staging: {e}"))
            })?;
        }

        let store = DiskVectorStore::create(&staging.join("vectors")).await?;
        store.put(records).await?;

        let index_dir = staging.join("index");
        tokio::fs::create_dir_all(&index_dir)
            .await
            .map_err(|e| RagError::IndexBuild(format!("failed to create index dir: {e}")))?;
        let body = serde_json::to_vec_pretty(manifest)
            .map_err(|e| RagError::IndexBuild(format!("failed to serialize manifest: {e}")))?;
        tokio::fs::write(index_dir.join(MANIFEST_FILE), body)
            .await
            .map_err(|e| RagError::IndexBuild(format!("failed to write manifest: {e}")))?;

        Ok(())
    }

    /// Replace the live artifacts with the staged ones.
    async fn swap_staging_in(&self) -> Result<()> {
        let staging = self.layout.staging();

        for name in ["vectors", "index"] {
            let dest = self.layout.root.join(name);
            match tokio::fs::remove_dir_all(&dest).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(RagError::IndexBuild(format!(
                        "failed to replace {}: {e}",
                        dest.display()
                    )))
                }
            }
            tokio::fs::rename(staging.join(name), &dest).await.map_err(|e| {
                RagError::IndexBuild(format!("failed to move staged {name} into place: {e}"))
            })?;
        }

        // Leftover staging root is harmless; the next build removes it.
        let _ = tokio::fs::remove_dir_all(&staging).await;
        Ok(())
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Reject chunk sets that would violate index invariants.
fn validate_chunks(chunks: &[Chunk]) -> Result<()> {
    if chunks.is_empty() {
        return Err(RagError::IndexBuild("cannot build an index from zero chunks".to_string()));
    }

    let mut seen = std::collections::HashSet::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.text.trim().is_empty() {
            return Err(RagError::IndexBuild(format!("chunk '{}' has empty text", chunk.id)));
        }
        if !seen.insert(chunk.id.as_str()) {
            return Err(RagError::IndexBuild(format!("duplicate chunk id '{}'", chunk.id)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::Modality;
    use crate::embedding::HashEmbedder;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            ordinal: 0,
            text: text.to_string(),
            modality: Modality::Text,
            metadata: HashMap::new(),
        }
    }

    fn manager(dir: &Path) -> IndexManager {
        let config = RagConfig::builder().storage_dir(dir).build().unwrap();
        IndexManager::new(&config, Arc::new(HashEmbedder::new(32)))
    }

    #[tokio::test]
    async fn empty_chunk_sets_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = manager(dir.path()).build(&[]).await.unwrap_err();
        assert!(matches!(err, RagError::IndexBuild(_)));
    }

    #[tokio::test]
    async fn empty_chunk_text_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = manager(dir.path()).build(&[chunk("a", "  ")]).await.unwrap_err();
        assert!(matches!(err, RagError::IndexBuild(_)));
    }

    #[tokio::test]
    async fn duplicate_chunk_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = vec![chunk("a", "one"), chunk("a", "two")];
        let err = manager(dir.path()).build(&chunks).await.unwrap_err();
        assert!(matches!(err, RagError::IndexBuild(_)));
    }

    #[tokio::test]
    async fn build_leaves_no_staging_directory_behind() {
        let dir = tempfile::tempdir().unwrap();
        manager(dir.path()).build(&[chunk("a", "hello world")]).await.unwrap();
        assert!(!dir.path().join(".staging").exists());
        assert!(dir.path().join("vectors").exists());
        assert!(dir.path().join("index").exists());
    }
}
