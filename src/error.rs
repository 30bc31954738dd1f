use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Index is empty: no records have been indexed")]
    EmptyIndex,

    #[error("Index not found at {}: {reason}", path.display())]
    IndexNotFound { path: PathBuf, reason: String },

    #[error("Embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conversation session is closed")]
    SessionClosed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl RagError {
    /// Upstream failures worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RagError::Embedding(_) | RagError::Generation(_))
    }

    /// Errors that abort a whole evaluation batch instead of degrading one entry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RagError::Unauthorized(_) | RagError::InvalidArgument(_) | RagError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
