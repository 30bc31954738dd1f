//! Process exit codes for the `hireflow` binary.

use crate::error::RagError;

pub const EXIT_SUCCESS: i32 = 0;

/// Anything without a more specific code (I/O, serialization).
pub const EXIT_ERROR: i32 = 1;

/// Missing or invalid configuration, including a missing API key.
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Credentials rejected by the upstream service.
pub const EXIT_AUTH_ERROR: i32 = 3;

/// Embedding or generation service failure after retries.
pub const EXIT_UPSTREAM_ERROR: i32 = 4;

/// Bad arguments or input files.
pub const EXIT_INVALID_INPUT: i32 = 6;

/// Operation on a closed conversation.
pub const EXIT_SESSION_ERROR: i32 = 8;

/// No resumes indexed, or no usable persisted index.
pub const EXIT_INDEX_ERROR: i32 = 9;

/// Interrupted by the user (128 + SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;

pub fn for_error(err: &RagError) -> i32 {
    match err {
        RagError::Config(_) => EXIT_CONFIG_ERROR,
        RagError::Unauthorized(_) => EXIT_AUTH_ERROR,
        RagError::Embedding(_) | RagError::Generation(_) | RagError::Parse(_) => {
            EXIT_UPSTREAM_ERROR
        }
        RagError::InvalidArgument(_) | RagError::DimensionMismatch { .. } => EXIT_INVALID_INPUT,
        RagError::SessionClosed => EXIT_SESSION_ERROR,
        RagError::EmptyIndex | RagError::IndexNotFound { .. } => EXIT_INDEX_ERROR,
        RagError::Cancelled => EXIT_INTERRUPTED,
        RagError::Io(_) | RagError::Serde(_) => EXIT_ERROR,
    }
}
