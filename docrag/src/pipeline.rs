//! Pipeline facade: the only surface a front end calls.
//!
//! [`RagPipeline`] composes a [`DocumentParser`], an
//! [`EmbeddingProvider`], the [`IndexManager`], and a [`LanguageModel`],
//! and exposes ingest, build, load, clear, retrieve, and query. Nothing
//! else is public surface for a CLI, web UI, or API layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docrag::{HashEmbedder, MarkdownParser, RagConfig, RagPipeline};
//!
//! let config = RagConfig::builder().data_dir("data").storage_dir("storage").build()?;
//! let pipeline = RagPipeline::builder()
//!     .config(config.clone())
//!     .parser(Arc::new(MarkdownParser::new(config.chunk_size, config.chunk_overlap)))
//!     .embedder(Arc::new(HashEmbedder::new(256)))
//!     .model(Arc::new(my_model))
//!     .build()?;
//!
//! let report = pipeline.ingest_and_build().await?;
//! let answer = pipeline.query("What was net income?").await?;
//! ```

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::RagConfig;
use crate::document::{Answer, Chunk, Retrieved};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generator::{AnswerGenerator, LanguageModel};
use crate::index::{Index, IndexManager};
use crate::parser::{ingest_dir, DocumentParser, IngestReport};

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`]. All query-time methods
/// take `&self` and share a read-only index handle, so concurrent
/// queries need no coordination; builds are serialized per location by
/// the index manager.
pub struct RagPipeline {
    config: RagConfig,
    parser: Arc<dyn DocumentParser>,
    manager: IndexManager,
    generator: AnswerGenerator,
    current: RwLock<Option<Arc<Index>>>,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Parse every supported document under the configured data
    /// directory, reporting per-document failures alongside whatever
    /// parsed successfully.
    pub async fn ingest(&self) -> Result<IngestReport> {
        ingest_dir(self.parser.as_ref(), &self.config.data_dir).await
    }

    /// Build a fresh index from `chunks`, replacing any existing index
    /// at the configured location, and keep the new index loaded.
    pub async fn build(&self, chunks: &[Chunk]) -> Result<()> {
        let index = self.manager.build(chunks).await?;
        *self.current.write().await = Some(Arc::new(index));
        Ok(())
    }

    /// Ingest the data directory and build an index from the result.
    ///
    /// Per-document parse failures do not abort the build as long as at
    /// least one document parsed; the returned report says what was
    /// skipped.
    pub async fn ingest_and_build(&self) -> Result<IngestReport> {
        let report = self.ingest().await?;
        if report.chunks.is_empty() {
            return Err(RagError::IndexBuild(format!(
                "no indexable content in {} ({} documents failed to parse)",
                self.config.data_dir.display(),
                report.failures.len()
            )));
        }
        self.build(&report.chunks).await?;
        Ok(report)
    }

    /// Load the previously persisted index at the configured location.
    ///
    /// # Errors
    ///
    /// [`RagError::IndexNotFound`] if nothing has been built — the
    /// caller should build and retry; [`RagError::IndexCorrupt`] if the
    /// persisted state is inconsistent.
    pub async fn load(&self) -> Result<()> {
        let index = self.manager.load().await?;
        *self.current.write().await = Some(Arc::new(index));
        Ok(())
    }

    /// Delete all persisted state and drop the loaded index. Idempotent.
    pub async fn clear(&self) -> Result<()> {
        self.manager.clear().await?;
        *self.current.write().await = None;
        Ok(())
    }

    /// Number of chunks in the currently loaded index, if any.
    pub async fn chunk_count(&self) -> Option<usize> {
        self.current.read().await.as_ref().map(|index| index.chunk_count())
    }

    /// Retrieve the `top_k` most relevant chunks for `query` from the
    /// loaded index.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Retrieved> {
        let index = self.current_index().await?;
        index.retriever().retrieve(query, top_k).await
    }

    /// Answer `query`: retrieve with the configured `top_k`, then
    /// generate a grounded answer citing the retrieved chunks.
    ///
    /// Each query runs the full idle → retrieving → generating cycle
    /// fresh; nothing persists across queries, and a failure in either
    /// phase leaves the index untouched.
    pub async fn query(&self, query: &str) -> Result<Answer> {
        debug!(query_len = query.len(), "query: retrieving");
        let retrieved = self.retrieve(query, self.config.top_k).await?;

        debug!(retrieved = retrieved.len(), "query: generating");
        let answer = self.generator.generate(query, retrieved).await?;

        info!(sources = answer.sources.len(), truncated = answer.truncated, "query complete");
        Ok(answer)
    }

    async fn current_index(&self) -> Result<Arc<Index>> {
        self.current
            .read()
            .await
            .clone()
            .ok_or_else(|| RagError::IndexNotFound { location: self.config.storage_dir.clone() })
    }
}

/// Builder for constructing a [`RagPipeline`]. All fields are required.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    parser: Option<Arc<dyn DocumentParser>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    model: Option<Arc<dyn LanguageModel>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document parser.
    pub fn parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Set the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the language model.
    pub fn model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Build the [`RagPipeline`], validating that all fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if any field is missing.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::Config("config is required".to_string()))?;
        let parser =
            self.parser.ok_or_else(|| RagError::Config("parser is required".to_string()))?;
        let embedder =
            self.embedder.ok_or_else(|| RagError::Config("embedder is required".to_string()))?;
        let model = self.model.ok_or_else(|| RagError::Config("model is required".to_string()))?;

        let manager = IndexManager::new(&config, embedder);
        let generator = AnswerGenerator::new(model, config.context_budget, config.generate_timeout);

        Ok(RagPipeline { config, parser, manager, generator, current: RwLock::new(None) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_every_component() {
        let err = RagPipeline::builder().build().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }
}
