//! Job data model shared between the orchestrator and the request layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state of a reconstruction job.
///
/// `Success` and `Failure` are terminal; the job store refuses writes
/// once either is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Submitted, not yet picked up by a worker
    Pending,
    /// A worker claimed the job
    Started,
    /// A stage is running; the record's `stage_message` names it
    Progress,
    /// Trained model available at `output_model_path`
    Success,
    /// Pipeline aborted; the record's `error` holds the stage output
    Failure,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// Persisted state of one reconstruction job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Opaque job identifier (uuid v4)
    pub id: String,
    /// Owner the job directories are filed under
    pub owner_id: String,
    pub status: JobStatus,
    /// Human-readable label of the stage currently running
    #[serde(default)]
    pub stage_message: Option<String>,
    /// Captured error text, set together with `Failure`
    #[serde(default)]
    pub error: Option<String>,
    /// Training iterations requested at submission
    pub iteration_count: u32,
    /// Directory holding the uploaded images or video
    pub dataset_path: PathBuf,
    /// Root of the per-job directory tree
    pub workspace_path: PathBuf,
    #[serde(default)]
    pub thumbnail_path: Option<PathBuf>,
    /// Stable path of the trained model, set together with `Success`
    #[serde(default)]
    pub output_model_path: Option<PathBuf>,
    #[serde(default)]
    pub output_model_size_bytes: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a freshly submitted record in `Pending` state
    #[must_use]
    pub fn new(
        id: String,
        owner_id: String,
        dataset_path: PathBuf,
        workspace_path: PathBuf,
        iteration_count: u32,
    ) -> Self {
        Self {
            id,
            owner_id,
            status: JobStatus::Pending,
            stage_message: None,
            error: None,
            iteration_count,
            dataset_path,
            workspace_path,
            thumbnail_path: None,
            output_model_path: None,
            output_model_size_bytes: None,
            created_at: Utc::now(),
        }
    }
}
