//! Error types for indexing and retrieval

use ewiki_embed::GatewayError;
use std::path::PathBuf;

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that stop an index-wide operation.
///
/// Failures of individual embedding batches never surface here: the batch
/// scheduler absorbs and counts them. An `IndexError` means the whole build,
/// load or search could not complete.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A call to the embedding service failed (e.g. while embedding a query)
    #[error("Embedding gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A vector's length differs from the index dimension
    #[error("Dimension mismatch: index has dimension {expected}, vector has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// One or both index artifacts are missing
    #[error("No index found in {}", dir.display())]
    IndexNotFound { dir: PathBuf },

    /// A build produced nothing to index
    #[error("Nothing to index: {reason}")]
    EmptyIndex { reason: String },

    /// A planning response could not be interpreted
    #[error("Malformed plan: {message}")]
    MalformedPlan { message: String },

    /// A persisted artifact exists but cannot be trusted
    #[error("Corrupt index artifact {}: {message}", path.display())]
    CorruptIndex { path: PathBuf, message: String },

    /// Configuration rejected before any work started
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// IO errors while reading sources or writing artifacts
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Metadata (de)serialization failures
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// A blocking or background task panicked or was cancelled
    #[error("Background task failed: {source}")]
    Task {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl IndexError {
    /// Whether trying the same operation again could succeed.
    ///
    /// Only failures of the remote service qualify; everything else is a
    /// property of the inputs or the artifacts on disk.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Gateway(_))
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an empty index error with the reason nothing was indexed.
    pub fn empty<S: Into<String>>(reason: S) -> Self {
        Self::EmptyIndex {
            reason: reason.into(),
        }
    }

    /// Create a corrupt artifact error for `path`.
    pub fn corrupt<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::CorruptIndex {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a malformed plan error, raised when a page plan returned by the
    /// completion service cannot be interpreted.
    pub fn malformed_plan<S: Into<String>>(message: S) -> Self {
        Self::MalformedPlan {
            message: message.into(),
        }
    }
}
