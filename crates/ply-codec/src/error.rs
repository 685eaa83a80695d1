//! Codec error types

use thiserror::Error;

/// Errors raised while parsing or writing point-cloud files.
///
/// All codec errors are synchronous and surface directly to the
/// conversion caller; none of them touch job state.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing element '{0}'")]
    MissingElement(String),

    #[error("Missing property '{0}'")]
    MissingProperty(String),

    #[error("Truncated payload: element '{element}' needs {expected} bytes, {actual} available")]
    TruncatedPayload {
        element: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
