//! Query-time retrieval against a loaded index.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::document::Retrieved;
use crate::embedding::embed_timed;
use crate::error::{RagError, Result};
use crate::index::Index;

/// Retrieves the top-K most relevant chunks for a query.
///
/// Holds only a shared read-only [`Index`] handle, so any number of
/// retrievers can run concurrently and dropping one mid-query has no
/// side effects (queries never write).
pub struct Retriever {
    index: Arc<Index>,
}

impl Retriever {
    /// Create a retriever over the given index.
    pub fn new(index: Arc<Index>) -> Self {
        Self { index }
    }

    /// Retrieve at most `top_k` chunks relevant to `query`, ordered by
    /// descending similarity with ties broken by `(document_id, ordinal)`.
    ///
    /// Asking for more results than the index holds returns everything
    /// available without error.
    ///
    /// # Errors
    ///
    /// - [`RagError::Config`] if `top_k` is zero
    /// - [`RagError::DimensionMismatch`] if the configured embedder's
    ///   dimensionality differs from the index's — a configuration
    ///   error, surfaced before any search runs
    /// - [`RagError::Timeout`] if the query embedding exceeds its limit
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Retrieved> {
        if top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }

        let manifest = self.index.manifest();
        let embedder = self.index.embedder.as_ref();

        if embedder.dimensions() != manifest.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: manifest.dimensions,
                actual: embedder.dimensions(),
            });
        }
        if embedder.model_id() != manifest.model_id {
            // Same dimensionality, different model: scores would be
            // meaningless but the mismatch is undetectable in general.
            warn!(
                index_model = %manifest.model_id,
                embedder_model = %embedder.model_id(),
                "embedding model differs from the one the index was built with"
            );
        }

        let vector = embed_timed(embedder, query, self.index.embed_timeout).await?;
        let results = self.index.store.query(&vector, top_k).await?;

        debug!(top_k, returned = results.len(), "retrieval complete");
        Ok(Retrieved { results })
    }
}

impl Index {
    /// Create a [`Retriever`] sharing this index handle.
    pub fn retriever(self: &Arc<Self>) -> Retriever {
        Retriever::new(Arc::clone(self))
    }
}
