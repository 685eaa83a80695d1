//! Worker pool driving jobs to completion
//!
//! Each submitted job runs on its own blocking task, gated by a semaphore
//! of worker slots. Jobs are fully parallel with isolated workspaces; the
//! only shared mutation is the job store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use splat_common::{CancelFlag, JobRecord, PipelineError, Result};
use splat_frame_extractor as frames;

use crate::config::PipelineConfig;
use crate::pipeline::{run_job, PipelineContext};
use crate::store::JobStore;
use crate::workspace::JobWorkspace;

/// Submission parameters for one reconstruction job
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub owner_id: String,
    /// Directory already populated with images or a video
    pub dataset_path: PathBuf,
    pub iteration_count: Option<u32>,
}

/// Dispatches jobs onto worker slots and tracks active cancellation flags
pub struct JobRunner {
    ctx: Arc<PipelineContext>,
    slots: Arc<Semaphore>,
    active: Mutex<HashMap<String, CancelFlag>>,
}

impl JobRunner {
    /// Build a runner and its pipeline context
    ///
    /// # Errors
    ///
    /// Fails when the job store cannot be opened.
    pub fn new(config: PipelineConfig) -> Result<Arc<Self>> {
        let slots = Arc::new(Semaphore::new(config.worker_slots));
        let ctx = Arc::new(PipelineContext::new(config)?);
        Ok(Arc::new(Self {
            ctx,
            slots,
            active: Mutex::new(HashMap::new()),
        }))
    }

    #[must_use]
    pub fn store(&self) -> &JobStore {
        &self.ctx.store
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.ctx.config
    }

    /// Validate and enqueue a job; returns the PENDING record.
    ///
    /// Must be called from within a tokio runtime: execution is spawned
    /// onto a blocking task once a worker slot frees up.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the dataset directory is missing; store errors
    /// otherwise.
    pub fn submit(self: &Arc<Self>, request: SubmitRequest) -> Result<JobRecord> {
        if !request.dataset_path.is_dir() {
            return Err(PipelineError::InvalidInput(format!(
                "dataset directory does not exist: {}",
                request.dataset_path.display()
            )));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let workspace_path = self
            .ctx
            .config
            .data_root
            .join(&request.owner_id)
            .join(&job_id);
        let iterations = request
            .iteration_count
            .unwrap_or(self.ctx.config.default_iterations);

        let mut record = JobRecord::new(
            job_id.clone(),
            request.owner_id,
            request.dataset_path,
            workspace_path,
            iterations,
        );
        record.thumbnail_path = self.extract_thumbnail(&job_id, &record.dataset_path);
        self.ctx.store.create(&record)?;

        let cancel = CancelFlag::new();
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id.clone(), cancel.clone());

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let permit = runner.slots.clone().acquire_owned().await;
            if permit.is_err() {
                warn!("Worker pool closed before job {job_id} could run");
                return;
            }
            let ctx = Arc::clone(&runner.ctx);
            let worker_cancel = cancel.clone();
            let worker_id = job_id.clone();
            let _ = tokio::task::spawn_blocking(move || {
                run_job(&ctx, &worker_id, &worker_cancel);
            })
            .await;
            runner
                .active
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&job_id);
        });

        Ok(record)
    }

    /// First-frame thumbnail for video datasets; failures only log
    fn extract_thumbnail(&self, job_id: &str, dataset: &std::path::Path) -> Option<PathBuf> {
        let video = frames::find_video(dataset).ok().flatten()?;
        let thumbnail = self
            .ctx
            .config
            .data_root
            .join("thumbnails")
            .join(format!("{job_id}_thumbnail.jpg"));
        match frames::extract_thumbnail(
            &video,
            &thumbnail,
            &self.ctx.config.frame_extractor,
            &CancelFlag::new(),
        ) {
            Ok(()) => Some(thumbnail),
            Err(e) => {
                warn!("Thumbnail extraction failed for job {job_id}: {e}");
                None
            }
        }
    }

    /// Request cooperative cancellation; true when the job was active
    pub fn cancel(&self, job_id: &str) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.get(job_id) {
            Some(flag) => {
                info!("Cancelling job {job_id}");
                flag.cancel();
                true
            }
            None => false,
        }
    }

    /// Delete all data tied to a job: directories, dataset, thumbnail,
    /// and the stored record. Cancels the job first if still active;
    /// directory removal is best-effort.
    ///
    /// # Errors
    ///
    /// Only store failures escalate.
    pub fn delete(&self, job_id: &str) -> Result<()> {
        self.cancel(job_id);

        if let Some(record) = self.ctx.store.get(job_id)? {
            JobWorkspace::open(&self.ctx.config.data_root, &record.owner_id, job_id).remove_all();
            if record.dataset_path.exists() {
                if let Err(e) = std::fs::remove_dir_all(&record.dataset_path) {
                    warn!("Failed to remove dataset for job {job_id}: {e}");
                }
            }
            if let Some(thumbnail) = &record.thumbnail_path {
                if let Err(e) = std::fs::remove_file(thumbnail) {
                    warn!("Failed to remove thumbnail for job {job_id}: {e}");
                }
            }
        }

        self.ctx.store.delete(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            data_root: root.to_path_buf(),
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_missing_dataset() {
        let root = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(test_config(root.path())).unwrap();
        let err = runner
            .submit(SubmitRequest {
                owner_id: "owner".to_string(),
                dataset_path: root.path().join("nope"),
                iteration_count: None,
            })
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_cancel_unknown_job_is_false() {
        let root = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(test_config(root.path())).unwrap();
        assert!(!runner.cancel("nope"));
    }

    #[tokio::test]
    async fn test_delete_unknown_job_is_ok() {
        let root = tempfile::tempdir().unwrap();
        let runner = JobRunner::new(test_config(root.path())).unwrap();
        runner.delete("nope").unwrap();
    }
}
