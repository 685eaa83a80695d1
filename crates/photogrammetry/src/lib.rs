//! COLMAP stage adapters
//!
//! Wraps the four photogrammetry stages (feature extraction, sequential
//! matching, sparse mapping, dense undistortion) behind the fixed COLMAP
//! CLI contract, plus the artifact-collection step that flattens the dense
//! output into the layout the trainer consumes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use splat_common::{CancelFlag, ToolCommand, ToolError};

/// Sparse-model artifacts the trainer needs alongside the image set
const SPARSE_ARTIFACTS: &[&str] = &["cameras.bin", "images.bin", "points3D.bin"];

/// Errors specific to the photogrammetry stages
#[derive(Debug, Error)]
pub enum PhotogrammetryError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Expected reconstruction artifact not found: {0}")]
    MissingArtifact(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for COLMAP invocations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColmapConfig {
    /// COLMAP binary to invoke
    pub colmap_path: String,

    /// Whether SIFT extraction/matching and bundle adjustment may use the GPU
    pub use_gpu: bool,
}

impl Default for ColmapConfig {
    fn default() -> Self {
        Self {
            colmap_path: "colmap".to_string(),
            use_gpu: false,
        }
    }
}

impl ColmapConfig {
    fn gpu_flag(&self) -> &'static str {
        if self.use_gpu {
            "1"
        } else {
            "0"
        }
    }
}

/// Run SIFT feature extraction over the image set
///
/// # Errors
///
/// Propagates the tool's non-zero exit with its stderr.
pub fn extract_features(
    config: &ColmapConfig,
    database_path: &Path,
    image_dir: &Path,
    cancel: &CancelFlag,
) -> Result<(), PhotogrammetryError> {
    ToolCommand::new(&config.colmap_path)
        .arg("feature_extractor")
        .arg("--database_path")
        .arg(database_path)
        .arg("--image_path")
        .arg(image_dir)
        .arg("--SiftExtraction.use_gpu")
        .arg(config.gpu_flag())
        .arg("--ImageReader.single_camera")
        .arg("1")
        .run(cancel)?;
    Ok(())
}

/// Match features between sequential image pairs
///
/// # Errors
///
/// Propagates the tool's non-zero exit with its stderr.
pub fn match_features(
    config: &ColmapConfig,
    database_path: &Path,
    cancel: &CancelFlag,
) -> Result<(), PhotogrammetryError> {
    ToolCommand::new(&config.colmap_path)
        .arg("sequential_matcher")
        .arg("--database_path")
        .arg(database_path)
        .arg("--SiftMatching.use_gpu")
        .arg(config.gpu_flag())
        .run(cancel)?;
    Ok(())
}

/// Run incremental sparse mapping into `sparse_dir`
///
/// # Errors
///
/// Propagates the tool's non-zero exit with its stderr.
pub fn map_sparse(
    config: &ColmapConfig,
    database_path: &Path,
    image_dir: &Path,
    sparse_dir: &Path,
    cancel: &CancelFlag,
) -> Result<(), PhotogrammetryError> {
    std::fs::create_dir_all(sparse_dir)?;
    ToolCommand::new(&config.colmap_path)
        .arg("mapper")
        .arg("--database_path")
        .arg(database_path)
        .arg("--image_path")
        .arg(image_dir)
        .arg("--output_path")
        .arg(sparse_dir)
        .arg("--Mapper.ba_use_gpu")
        .arg(config.gpu_flag())
        .arg("--Mapper.ba_global_function_tolerance")
        .arg("0.000001")
        .run(cancel)?;
    Ok(())
}

/// Undistort images against the first sparse model
///
/// # Errors
///
/// Propagates the tool's non-zero exit with its stderr.
pub fn undistort_images(
    config: &ColmapConfig,
    image_dir: &Path,
    sparse_model_dir: &Path,
    dense_dir: &Path,
    cancel: &CancelFlag,
) -> Result<(), PhotogrammetryError> {
    std::fs::create_dir_all(dense_dir)?;
    ToolCommand::new(&config.colmap_path)
        .arg("image_undistorter")
        .arg("--image_path")
        .arg(image_dir)
        .arg("--input_path")
        .arg(sparse_model_dir)
        .arg("--output_path")
        .arg(dense_dir)
        .arg("--output_type")
        .arg("COLMAP")
        .run(cancel)?;
    Ok(())
}

/// Flatten the dense reconstruction into the trainer's input layout:
/// undistorted images plus the three sparse-model binaries side by side.
///
/// # Errors
///
/// `MissingArtifact` when a required output of the dense stage is absent.
pub fn collect_artifacts(dense_dir: &Path, staging_dir: &Path) -> Result<(), PhotogrammetryError> {
    let undistorted_images = dense_dir.join("images");
    if !undistorted_images.is_dir() {
        return Err(PhotogrammetryError::MissingArtifact(undistorted_images));
    }

    std::fs::create_dir_all(staging_dir)?;
    copy_dir_recursive(&undistorted_images, &staging_dir.join("images"))?;

    for artifact in SPARSE_ARTIFACTS {
        let src = dense_dir.join("sparse").join(artifact);
        if !src.is_file() {
            return Err(PhotogrammetryError::MissingArtifact(src));
        }
        std::fs::copy(&src, staging_dir.join(artifact))?;
    }

    info!(
        "Collected reconstruction artifacts into {}",
        staging_dir.display()
    );
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
