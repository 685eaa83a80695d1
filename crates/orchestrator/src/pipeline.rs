//! Reconstruction pipeline state machine
//!
//! Drives one job through its ordered stages, persisting status at every
//! boundary. Stage functions return explicit results; the driver loop
//! stops at the first failure, records it, and the workspace cleanup
//! guard runs on every exit path.

use std::path::{Path, PathBuf};
use tracing::{error, info};

use splat_common::{CancelFlag, JobRecord, JobStatus, PipelineError, ToolError};
use splat_frame_extractor as frames;
use splat_photogrammetry as colmap;
use splat_trainer as trainer;

use crate::config::PipelineConfig;
use crate::store::JobStore;
use crate::workspace::{JobWorkspace, WorkspaceCleanup};

/// File extensions accepted as dataset images
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Ordered pipeline stages; each binds exactly one external invocation
/// except artifact collection, which is pure filesystem work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExtractFrames,
    FeatureExtraction,
    Matching,
    SparseMapping,
    DenseUndistortion,
    CollectArtifacts,
    Training,
}

impl Stage {
    /// Status label persisted while the stage runs
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ExtractFrames => "Extracting frames from video",
            Self::FeatureExtraction => "Running feature extraction",
            Self::Matching => "Running feature matching",
            Self::SparseMapping => "Running sparse mapping",
            Self::DenseUndistortion => "Running image undistortion",
            Self::CollectArtifacts => "Collecting reconstruction artifacts",
            Self::Training => "Training splat model",
        }
    }
}

/// Everything a job invocation needs, passed explicitly
#[derive(Debug)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub store: JobStore,
}

impl PipelineContext {
    /// Build a context, opening the job store under the data root
    ///
    /// # Errors
    ///
    /// Fails when the store directory cannot be created.
    pub fn new(config: PipelineConfig) -> splat_common::Result<Self> {
        let store = JobStore::open(&config.data_root)?;
        Ok(Self { config, store })
    }
}

/// Trained-model artifact produced by a successful run
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Run one job to its terminal state.
///
/// Never returns an error to the caller: every outcome, including
/// cancellation and workspace failures, is recorded in the job store and
/// observed by polling.
pub fn run_job(ctx: &PipelineContext, job_id: &str, cancel: &CancelFlag) {
    let record = match ctx.store.get(job_id) {
        Ok(Some(record)) => record,
        Ok(None) => {
            error!("Job {job_id} has no stored record, refusing to run");
            return;
        }
        Err(e) => {
            error!("Cannot load job {job_id}: {e}");
            return;
        }
    };

    info!("Starting job {job_id} for dataset {:?}", record.dataset_path);
    if ctx
        .store
        .set_status(job_id, JobStatus::Started, Some("Started processing"))
        .is_err()
    {
        error!("Cannot mark job {job_id} as started");
        return;
    }

    let workspace = match JobWorkspace::create(&ctx.config.data_root, &record.owner_id, job_id) {
        Ok(ws) => ws,
        Err(e) => {
            fail_job(ctx, job_id, &e);
            return;
        }
    };

    let outcome = {
        let _cleanup = WorkspaceCleanup::new(&workspace);
        execute_stages(ctx, &record, &workspace, cancel)
    };

    match outcome {
        Ok(model) => {
            info!("Job {job_id} succeeded, model at {:?}", model.path);
            let _ = ctx.store.update(job_id, |r| {
                r.status = JobStatus::Success;
                r.stage_message = Some("Completed".to_string());
                r.output_model_path = Some(model.path.clone());
                r.output_model_size_bytes = Some(model.size_bytes);
            });
        }
        Err(e) => fail_job(ctx, job_id, &e),
    }
}

fn fail_job(ctx: &PipelineContext, job_id: &str, err: &PipelineError) {
    error!("Job {job_id} failed: {err}");
    let _ = ctx.store.update(job_id, |r| {
        r.status = JobStatus::Failure;
        r.stage_message = Some("Failed".to_string());
        r.error = Some(err.to_string());
    });
}

/// Run the ordered stage sequence against a prepared workspace
fn execute_stages(
    ctx: &PipelineContext,
    record: &JobRecord,
    ws: &JobWorkspace,
    cancel: &CancelFlag,
) -> Result<TrainedModel, PipelineError> {
    let dataset = &record.dataset_path;
    if !dataset.is_dir() {
        return Err(PipelineError::InvalidInput(format!(
            "dataset directory does not exist: {}",
            dataset.display()
        )));
    }

    let images_dir = ws.images_dir();

    // Stage 1 runs only for video datasets; image datasets are copied in.
    match frames::find_video(dataset).map_err(|e| stage_err(Stage::ExtractFrames, &e))? {
        Some(video) => {
            enter_stage(ctx, &record.id, Stage::ExtractFrames, cancel)?;
            frames::extract_frames(&video, &images_dir, &ctx.config.frame_extractor, cancel)
                .map_err(|e| stage_err(Stage::ExtractFrames, &e))?;
        }
        None => copy_dataset_images(dataset, &images_dir)?,
    }

    if count_images(&images_dir)? == 0 {
        return Err(PipelineError::InvalidInput(format!(
            "no input images found in dataset {}",
            dataset.display()
        )));
    }

    let database = ws.database_path();

    enter_stage(ctx, &record.id, Stage::FeatureExtraction, cancel)?;
    colmap::extract_features(&ctx.config.colmap, &database, &images_dir, cancel)
        .map_err(|e| stage_err(Stage::FeatureExtraction, &e))?;

    enter_stage(ctx, &record.id, Stage::Matching, cancel)?;
    colmap::match_features(&ctx.config.colmap, &database, cancel)
        .map_err(|e| stage_err(Stage::Matching, &e))?;

    enter_stage(ctx, &record.id, Stage::SparseMapping, cancel)?;
    colmap::map_sparse(
        &ctx.config.colmap,
        &database,
        &images_dir,
        &ws.sparse_dir(),
        cancel,
    )
    .map_err(|e| stage_err(Stage::SparseMapping, &e))?;

    enter_stage(ctx, &record.id, Stage::DenseUndistortion, cancel)?;
    colmap::undistort_images(
        &ctx.config.colmap,
        &images_dir,
        &ws.sparse_dir().join("0"),
        &ws.dense_dir(),
        cancel,
    )
    .map_err(|e| stage_err(Stage::DenseUndistortion, &e))?;

    enter_stage(ctx, &record.id, Stage::CollectArtifacts, cancel)?;
    colmap::collect_artifacts(&ws.dense_dir(), &ws.staging_dir())
        .map_err(|e| stage_err(Stage::CollectArtifacts, &e))?;
    // Second copy outside the workspace subtree: this one survives cleanup
    // and backs the downloadable reconstruction bundle.
    colmap::collect_artifacts(&ws.dense_dir(), &ws.export_dir())
        .map_err(|e| stage_err(Stage::CollectArtifacts, &e))?;

    enter_stage(ctx, &record.id, Stage::Training, cancel)?;
    let model_name = format!("{}_model.ply", record.id);
    let trained_path = ws.outputs_dir().join(&model_name);
    trainer::train_model(
        &ctx.config.trainer,
        &ws.staging_dir(),
        record.iteration_count,
        &trained_path,
        cancel,
    )
    .map_err(|e| stage_err(Stage::Training, &e))?;

    // Copy the model out of the workspace before cleanup removes it.
    let result_path = ws.result_dir().join(&model_name);
    std::fs::copy(&trained_path, &result_path)?;
    let size_bytes = std::fs::metadata(&result_path)?.len();

    Ok(TrainedModel {
        path: result_path,
        size_bytes,
    })
}

/// Check cancellation and persist the PROGRESS transition for a stage
fn enter_stage(
    ctx: &PipelineContext,
    job_id: &str,
    stage: Stage,
    cancel: &CancelFlag,
) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    info!("Job {job_id}: {}", stage.label());
    ctx.store
        .set_status(job_id, JobStatus::Progress, Some(stage.label()))?;
    Ok(())
}

/// Adapter errors that wrap a cancelled tool run become [`PipelineError::Cancelled`]
trait StageFailure: std::fmt::Display {
    fn tool_error(&self) -> Option<&ToolError>;
}

impl StageFailure for frames::FrameExtractError {
    fn tool_error(&self) -> Option<&ToolError> {
        match self {
            Self::Tool(e) => Some(e),
            _ => None,
        }
    }
}

impl StageFailure for colmap::PhotogrammetryError {
    fn tool_error(&self) -> Option<&ToolError> {
        match self {
            Self::Tool(e) => Some(e),
            _ => None,
        }
    }
}

impl StageFailure for trainer::TrainerError {
    fn tool_error(&self) -> Option<&ToolError> {
        match self {
            Self::Tool(e) => Some(e),
            _ => None,
        }
    }
}

fn stage_err(stage: Stage, err: &impl StageFailure) -> PipelineError {
    if matches!(err.tool_error(), Some(ToolError::Cancelled { .. })) {
        return PipelineError::Cancelled;
    }
    PipelineError::Stage {
        stage: stage.label().to_string(),
        message: err.to_string(),
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|v| ext.eq_ignore_ascii_case(v))
        })
        .unwrap_or(false)
}

fn copy_dataset_images(dataset: &Path, images_dir: &Path) -> Result<(), PipelineError> {
    for entry in std::fs::read_dir(dataset)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && is_image(&path) {
            std::fs::copy(&path, images_dir.join(entry.file_name()))?;
        }
    }
    Ok(())
}

fn count_images(dir: &Path) -> Result<usize, PipelineError> {
    if !dir.is_dir() {
        return Ok(0);
    }
    Ok(std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .filter(|e| is_image(&e.path()))
        .count())
}
