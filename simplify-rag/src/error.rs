//! Error types for the `simplify-rag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in RAG operations.
///
/// Per-file problems during ingestion ([`UnsupportedFormat`](RagError::UnsupportedFormat),
/// [`Decode`](RagError::Decode), [`ExtractionFailure`](RagError::ExtractionFailure) and
/// embedding failures) are collected into
/// [`IngestResult::failed`](crate::document::IngestResult::failed) instead of
/// aborting the batch. Everything else aborts the offending call.
#[derive(Debug, Error)]
pub enum RagError {
    /// The file extension is not one the extractor understands.
    #[error("Unsupported format for '{filename}': {extension}")]
    UnsupportedFormat {
        /// The offending file.
        filename: String,
        /// The extension that was not recognised (empty when missing).
        extension: String,
    },

    /// A plain-text file was not valid UTF-8.
    #[error("Cannot decode '{filename}' as UTF-8: {message}")]
    Decode {
        /// The offending file.
        filename: String,
        /// A description of the failure.
        message: String,
    },

    /// The document container could not be read at all.
    #[error("Extraction failed for '{filename}': {message}")]
    ExtractionFailure {
        /// The offending file.
        filename: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector's length disagrees with the index's established dimensionality.
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimensionality established for the index.
        expected: usize,
        /// The dimensionality of the rejected vector.
        actual: usize,
    },

    /// The embedding backend could not be reached or refused the request.
    #[error("Embedding backend unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The text-completion backend could not be reached or refused the request.
    #[error("Generation backend unavailable ({backend}): {message}")]
    GenerationUnavailable {
        /// The completion backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A backend answered, but with something we could not use.
    #[error("Malformed response from {backend}: {message}")]
    MalformedResponse {
        /// The backend that produced the response.
        backend: String,
        /// A description of what was wrong.
        message: String,
    },

    /// `ask` was called before any document was ingested.
    #[error("Nothing has been ingested yet; ingest documents before asking questions")]
    NotReady,

    /// A backend call did not finish within the configured timeout.
    #[error("{operation} timed out after {}s", timeout.as_secs_f32())]
    Timeout {
        /// The operation that timed out (e.g. `embed`, `generate`).
        operation: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The caller cancelled the operation.
    #[error("{operation} was cancelled")]
    Cancelled {
        /// The operation that was abandoned.
        operation: String,
    },

    /// An argument was outside its valid range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the vector index backend.
    #[error("Vector index error ({backend}): {message}")]
    VectorStoreError {
        /// The index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// Saving or loading a snapshot failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// An I/O error while reading source files or snapshots.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Returns `true` for errors that describe a single input file rather than
    /// the session as a whole.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat { .. }
                | Self::Decode { .. }
                | Self::ExtractionFailure { .. }
                | Self::EmbeddingUnavailable { .. }
                | Self::MalformedResponse { .. }
                | Self::Timeout { .. }
                | Self::Io(_)
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
