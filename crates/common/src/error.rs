//! Pipeline error taxonomy

use thiserror::Error;

use crate::tool::ToolError;

/// Errors raised while preparing or driving a reconstruction job
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Dataset is missing, unreadable, or holds no usable input.
    /// Surfaced before any external tool runs.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An external tool exited non-zero; the message carries its stderr.
    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    /// Filesystem failure while laying out or tearing down a job workspace
    #[error("Workspace error: {0}")]
    Resource(String),

    /// The job was cancelled before or during a stage
    #[error("Job cancelled")]
    Cancelled,

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
