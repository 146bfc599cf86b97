//! Error taxonomy shared by every docrag component.
//!
//! Each variant maps to one failure class of the pipeline. The HTTP layer
//! turns them into status codes; the call policy uses
//! [`RagError::is_transient`] to decide whether a single retry is allowed.

use std::time::Duration;

use thiserror::Error;

/// Result alias used across the core crate.
pub type RagResult<T> = Result<T, RagError>;

#[derive(Debug, Clone, Error)]
pub enum RagError {
    /// A component was constructed with unusable parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Caller-supplied input was rejected (blank query, bad file name, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Document bytes are not valid UTF-8.
    #[error("document '{key}' is not valid UTF-8 (invalid byte at offset {offset})")]
    Decode { key: String, offset: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Retrieval produced nothing to ground an answer on.
    #[error("no supporting context found for query")]
    NoContext,

    /// Embedding failed part-way through an ingestion.
    #[error("embedding failed after {indexed} chunk(s) were indexed: {reason}")]
    EmbeddingFailed { indexed: usize, reason: String },

    #[error("completion failed: {0}")]
    CompletionFailed(String),

    #[error("{operation} timed out after {}ms", .timeout.as_millis())]
    ProviderTimeout {
        operation: String,
        timeout: Duration,
    },

    /// Error reported by an external provider (embedding or completion API).
    #[error("provider error: {message}")]
    Provider { message: String, transient: bool },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl RagError {
    /// A provider error that is worth one retry (network, 429, 5xx).
    pub fn transient(message: impl Into<String>) -> Self {
        RagError::Provider {
            message: message.into(),
            transient: true,
        }
    }

    /// A provider error that will not succeed on retry (4xx, bad payload).
    pub fn permanent(message: impl Into<String>) -> Self {
        RagError::Provider {
            message: message.into(),
            transient: false,
        }
    }

    /// Whether the call policy may retry the failed call once.
    ///
    /// Timeouts are deliberately excluded: a timed-out call aborts the
    /// surrounding ingest or answer.
    pub fn is_transient(&self) -> bool {
        match self {
            RagError::Provider { transient, .. } => *transient,
            RagError::StoreUnavailable(_) => true,
            _ => false,
        }
    }

    /// Whether the error is caused by the caller rather than a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RagError::InvalidInput(_)
                | RagError::Decode { .. }
                | RagError::DimensionMismatch { .. }
                | RagError::NotFound(_)
                | RagError::NoContext
        )
    }
}
