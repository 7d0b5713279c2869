//! Error types for the `docrag` crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the RAG pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// A single document could not be parsed. Non-fatal to a batch:
    /// ingestion reports these per document alongside partial success.
    #[error("parse error ({document}): {message}")]
    Parse {
        /// The source path or file name that failed.
        document: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding backend failed. Fatal to a build: no chunk may be
    /// persisted without its vector.
    #[error("embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The persistent store could not be created or written.
    #[error("index build error: {0}")]
    IndexBuild(String),

    /// No persisted index exists at the configured location. Recoverable:
    /// the caller should run a build and retry.
    #[error("no index found at {}", .location.display())]
    IndexNotFound {
        /// The configured storage location.
        location: PathBuf,
    },

    /// Persisted state is inconsistent (for example, only one of the two
    /// on-disk artifacts is present). Requires an explicit clear.
    #[error("index at {} is corrupt: {reason}", .location.display())]
    IndexCorrupt {
        /// The configured storage location.
        location: PathBuf,
        /// Why the persisted state was rejected.
        reason: String,
    },

    /// Another build is already running against this location. Transient:
    /// retry after the running build finishes.
    #[error("index at {} is busy: another build is in progress", .location.display())]
    IndexBusy {
        /// The configured storage location.
        location: PathBuf,
    },

    /// The configured embedder's dimensionality does not match the index.
    /// A configuration error, never retried.
    #[error("embedding dimension mismatch: index has {expected}, embedder produces {actual}")]
    DimensionMismatch {
        /// The dimensionality recorded in the index manifest.
        expected: usize,
        /// The dimensionality of the configured embedder.
        actual: usize,
    },

    /// The language model invocation failed. Retryable; does not affect
    /// the index or the retrieval result it was called with.
    #[error("generation error ({provider}): {message}")]
    Generation {
        /// The model backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An externally-latent call (embedding or generation) exceeded its
    /// configured timeout.
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The configured limit.
        limit: Duration,
    },

    /// A configuration validation error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RagError {
    /// Whether the caller may reasonably retry the failed operation
    /// without reconfiguring anything.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::Generation { .. } | RagError::Timeout { .. } | RagError::IndexBusy { .. }
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        let busy = RagError::IndexBusy { location: PathBuf::from("/tmp/x") };
        assert!(busy.is_retryable());

        let mismatch = RagError::DimensionMismatch { expected: 768, actual: 384 };
        assert!(!mismatch.is_retryable());
    }
}
