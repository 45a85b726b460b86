//! Error types for data-source reads.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for data-source reads.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors a data source can report. None of them are fatal to the process.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("source timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The source answered, but the payload is not in the expected shape.
    #[error("malformed reply: {0}")]
    MalformedReply(String),
}
