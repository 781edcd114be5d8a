//! Error types for the `kbase-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::PipelineState;

/// Errors that can occur while building or querying the retrieval index.
#[derive(Debug, Error)]
pub enum RagError {
    /// The document folder or one of its files could not be read.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// The path being accessed when the failure occurred.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The embedding provider failed or returned malformed data.
    #[error("Embedding provider error ({provider}): {message}")]
    Provider {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Vectors of different lengths were mixed in one index or query.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimensionality recorded by the index (or the first vector).
        expected: usize,
        /// The offending vector's length.
        actual: usize,
    },

    /// A query was issued before ingestion reached [`PipelineState::Ready`].
    #[error("Pipeline is not ready (state: {0})")]
    NotReady(PipelineState),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An error in the pipeline orchestration itself.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl RagError {
    /// Shorthand for a [`RagError::Provider`] error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    /// Shorthand for a [`RagError::Io`] error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
