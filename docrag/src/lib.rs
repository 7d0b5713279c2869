//! # docrag
//!
//! Retrieval-augmented question answering over uploaded documents:
//! parse heterogeneous files into modality-tagged chunks, embed them,
//! persist them in a vector index, and answer natural-language
//! questions with cited sources.
//!
//! ## Architecture
//!
//! - [`parser`] — files → ordered [`Chunk`]s (text, tables, image text)
//! - [`embedding`] — chunk text → fixed-dimension vectors
//! - [`index`] — build/load/clear of the persistent index
//! - [`retriever`] — query → top-K scored chunks
//! - [`generator`] — query + chunks → grounded [`Answer`]
//! - [`pipeline`] — the facade front ends call
//!
//! Every external service (parsing, embedding, vector storage,
//! generation) sits behind a narrow trait so concrete backends are
//! substitutable; the `gemini` feature provides remote backends for
//! embedding and generation.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docrag::{HashEmbedder, MarkdownParser, RagConfig, RagPipeline};
//! # use docrag::{LanguageModel, Result};
//! # use async_trait::async_trait;
//! # struct MyModel;
//! # #[async_trait]
//! # impl LanguageModel for MyModel {
//! #     async fn generate(&self, _p: &str) -> Result<String> { Ok(String::new()) }
//! #     fn name(&self) -> &str { "my-model" }
//! # }
//!
//! # async fn run() -> Result<()> {
//! let config = RagConfig::default();
//! let pipeline = RagPipeline::builder()
//!     .config(config.clone())
//!     .parser(Arc::new(MarkdownParser::new(config.chunk_size, config.chunk_overlap)))
//!     .embedder(Arc::new(HashEmbedder::new(256)))
//!     .model(Arc::new(MyModel))
//!     .build()?;
//!
//! pipeline.ingest_and_build().await?;
//! let answer = pipeline.query("What was net income?").await?;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diskstore;
pub mod document;
pub mod embedding;
pub mod error;
#[cfg(feature = "gemini")]
pub mod gemini;
pub mod generator;
pub mod index;
pub mod memory;
pub mod parser;
pub mod pipeline;
pub mod retriever;
pub mod vectorstore;

pub use config::{RagConfig, RagConfigBuilder};
pub use diskstore::DiskVectorStore;
pub use document::{Answer, Chunk, Document, Modality, Retrieved, ScoredChunk};
pub use embedding::{EmbeddingProvider, HashEmbedder};
pub use error::{RagError, Result};
#[cfg(feature = "gemini")]
pub use gemini::{GeminiEmbedder, GeminiModel};
pub use generator::{AnswerGenerator, LanguageModel};
pub use index::{Index, IndexManager, IndexManifest};
pub use memory::MemoryVectorStore;
pub use parser::{ingest_dir, DocumentParser, IngestFailure, IngestReport, MarkdownParser};
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use retriever::Retriever;
pub use vectorstore::{VectorRecord, VectorStore};
