//! Error types for the `ragkit` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Chunking, search, or pipeline parameters are inconsistent.
    ///
    /// This is a caller bug and is never worth retrying.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector did not have the dimension the index or provider declared.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The declared dimension.
        expected: usize,
        /// The dimension that was observed.
        actual: usize,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An index with this name is already declared on the collection.
    #[error("Index '{index}' already exists on collection '{collection}'")]
    IndexAlreadyExists {
        /// The collection the index belongs to.
        collection: String,
        /// The index name.
        index: String,
    },

    /// The backend reported that the index build failed.
    #[error("Index '{index}' failed to build: {reason}")]
    IndexBuildFailed {
        /// The index name.
        index: String,
        /// The reason reported by the backend, if any.
        reason: String,
    },

    /// The index did not become ready before the deadline.
    #[error("Index '{index}' was not ready after {elapsed:?} (last state: {last_state})")]
    IndexBuildTimeout {
        /// The index name.
        index: String,
        /// Time spent waiting.
        elapsed: Duration,
        /// The last state observed before giving up.
        last_state: String,
    },

    /// The operation was aborted through its cancellation token.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// The language model invocation failed.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The language model provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The document could not be fetched from its source.
    #[error("Source error ({locator}): {message}")]
    SourceError {
        /// The locator that was being fetched.
        locator: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    /// Returns `true` for failures of external services that a caller may
    /// reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingError { .. }
                | RagError::GenerationError { .. }
                | RagError::VectorStoreError { .. }
                | RagError::SourceError { .. }
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
