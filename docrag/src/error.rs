//! Error types for the `docrag` crate.

use thiserror::Error;

/// Errors that can occur in RAG operations.
///
/// There is no variant for an empty retrieval: a query with no relevant
/// content completes with a structured [`RagAnswer`](crate::RagAnswer).
#[derive(Debug, Error)]
pub enum RagError {
    /// Malformed query or ingestion parameters, rejected before any work starts.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced document or chunk does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// The kind of entity that was looked up (`document`, `chunk`, ...).
        kind: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// An embedding, generation, or diagram provider failed.
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A provider call exceeded its deadline.
    #[error("Timeout during {operation} after {after_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that was exceeded, in milliseconds.
        after_ms: u64,
    },

    /// An error occurred in the vector or chunk store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStore {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The ingestion queue is full; the caller should retry with backoff.
    #[error("Ingestion queue is full (capacity {capacity})")]
    Backpressure {
        /// The configured queue capacity.
        capacity: usize,
    },

    /// A concurrent writer or an illegal lifecycle transition was rejected.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An error in the RAG pipeline orchestration.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl RagError {
    /// Shorthand for a [`RagError::Provider`].
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    /// Shorthand for a [`RagError::NotFound`] on a document.
    pub fn document_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "document", id: id.into() }
    }

    /// Whether retrying the same call might succeed.
    ///
    /// Only transient provider and store failures are retryable; validation,
    /// configuration, and conflict errors are returned as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Timeout { .. } | Self::VectorStore { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
