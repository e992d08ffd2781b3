//! Typed error taxonomy for the RAG data plane (spec §6.7, §7).
//!
//! Every fallible operation exposed to an upstream caller (HTTP layer, CLI,
//! task queue) returns `RagError` so the caller can match on `kind()` rather
//! than parse a message string.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("unsupported file type: {filename} (extension {extension:?}); available parsers: {available_parsers:?}")]
    UnsupportedFileType {
        filename: String,
        extension: Option<String>,
        available_parsers: Vec<String>,
    },

    #[error("no parser succeeded for {filename}: tried {tried_parsers:?}, errors: {errors:?}")]
    ParserFailed {
        filename: String,
        tried_parsers: Vec<String>,
        errors: Vec<String>,
    },

    #[error("vector store error: {0}")]
    StoreError(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation timed out after {0:?}")]
    TimeoutError(std::time::Duration),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("context length exceeded: {message}")]
    ContextLengthExceeded { message: String },
}

impl RagError {
    /// Machine-readable kind tag for the wire format (spec §6.7).
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::UnsupportedFileType { .. } => "UnsupportedFileType",
            RagError::ParserFailed { .. } => "ParserFailed",
            RagError::StoreError(_) => "StoreError",
            RagError::InvalidArgument(_) => "InvalidArgument",
            RagError::TimeoutError(_) => "TimeoutError",
            RagError::NotFound(_) => "NotFound",
            RagError::ContextLengthExceeded { .. } => "ContextLengthExceeded",
        }
    }

    /// True for errors a batch driver should record per-file and continue past,
    /// rather than abort the whole batch (spec §4.1 Failures, §4.9, §7).
    pub fn is_batch_recoverable(&self) -> bool {
        matches!(
            self,
            RagError::UnsupportedFileType { .. } | RagError::ParserFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
