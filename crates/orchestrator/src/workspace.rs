//! Per-job directory tree
//!
//! Lays out `<root>/<owner>/<job_id>/{workspace/{images,sparse,dense,staging,outputs}, export, result}`
//! and guarantees the intermediate `workspace` subtree is removed once a
//! job reaches a terminal state, whatever the outcome.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use splat_common::{PipelineError, Result};

/// Handle to one job's directory tree
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    job_dir: PathBuf,
}

impl JobWorkspace {
    /// Create the full directory layout for a job
    ///
    /// # Errors
    ///
    /// Maps filesystem failures to [`PipelineError::Resource`].
    pub fn create(data_root: &Path, owner_id: &str, job_id: &str) -> Result<Self> {
        let ws = Self::open(data_root, owner_id, job_id);
        for dir in [
            ws.images_dir(),
            ws.sparse_dir(),
            ws.dense_dir(),
            ws.staging_dir(),
            ws.outputs_dir(),
            ws.export_dir(),
            ws.result_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                PipelineError::Resource(format!("cannot create {}: {e}", dir.display()))
            })?;
        }
        Ok(ws)
    }

    /// Handle to an existing (or never-created) job tree; no filesystem access
    #[must_use]
    pub fn open(data_root: &Path, owner_id: &str, job_id: &str) -> Self {
        Self {
            job_dir: data_root.join(owner_id).join(job_id),
        }
    }

    #[must_use]
    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    /// Intermediate data; removed after the job finishes
    #[must_use]
    pub fn workspace_dir(&self) -> PathBuf {
        self.job_dir.join("workspace")
    }

    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.workspace_dir().join("images")
    }

    #[must_use]
    pub fn sparse_dir(&self) -> PathBuf {
        self.workspace_dir().join("sparse")
    }

    #[must_use]
    pub fn dense_dir(&self) -> PathBuf {
        self.workspace_dir().join("dense")
    }

    /// Flat layout the trainer reads
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.workspace_dir().join("staging")
    }

    #[must_use]
    pub fn outputs_dir(&self) -> PathBuf {
        self.workspace_dir().join("outputs")
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.workspace_dir().join("database.db")
    }

    #[must_use]
    pub fn export_dir(&self) -> PathBuf {
        self.job_dir.join("export")
    }

    /// Final artifacts; survives the post-job cleanup
    #[must_use]
    pub fn result_dir(&self) -> PathBuf {
        self.job_dir.join("result")
    }

    /// Remove the intermediate `workspace` subtree. Best-effort: failures
    /// are logged and never escalate past this call.
    pub fn remove_workspace(&self) {
        let dir = self.workspace_dir();
        if !dir.exists() {
            return;
        }
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => info!("Cleaned up workspace at {}", dir.display()),
            Err(e) => warn!("Failed to remove workspace {}: {e}", dir.display()),
        }
    }

    /// Remove the whole job tree. Best-effort, used by job deletion.
    pub fn remove_all(&self) {
        if !self.job_dir.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.job_dir) {
            warn!("Failed to remove job dir {}: {e}", self.job_dir.display());
        }
    }
}

/// Guard that removes the workspace subtree on every exit path of a job
pub struct WorkspaceCleanup<'a>(&'a JobWorkspace);

impl<'a> WorkspaceCleanup<'a> {
    #[must_use]
    pub fn new(workspace: &'a JobWorkspace) -> Self {
        Self(workspace)
    }
}

impl Drop for WorkspaceCleanup<'_> {
    fn drop(&mut self) {
        self.0.remove_workspace();
    }
}
