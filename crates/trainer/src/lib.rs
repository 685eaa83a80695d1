//! Splat training adapter
//!
//! Invokes the OpenSplat trainer over a staged reconstruction and verifies
//! the model it claims to have written actually exists.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use splat_common::{CancelFlag, ToolCommand, ToolError};

/// Errors specific to model training
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Trainer exited cleanly but wrote no model at {0}")]
    MissingModel(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the training invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// OpenSplat binary to invoke
    pub opensplat_path: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            opensplat_path: "opensplat".to_string(),
        }
    }
}

/// Train a gaussian-splat model from a staged reconstruction.
///
/// `staging_dir` must hold the undistorted images and sparse-model
/// binaries side by side; the model is written to `output_path`.
///
/// # Errors
///
/// Propagates tool failures and reports a clean exit without an output
/// file as [`TrainerError::MissingModel`].
pub fn train_model(
    config: &TrainerConfig,
    staging_dir: &Path,
    iterations: u32,
    output_path: &Path,
    cancel: &CancelFlag,
) -> Result<(), TrainerError> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!(
        "Training splat model from {} for {} iterations",
        staging_dir.display(),
        iterations
    );

    ToolCommand::new(&config.opensplat_path)
        .arg(staging_dir)
        .arg("-n")
        .arg(iterations.to_string())
        .arg("-o")
        .arg(output_path)
        .run(cancel)?;

    if !output_path.is_file() {
        return Err(TrainerError::MissingModel(output_path.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_surfaces_as_tool_error() {
        let out = tempfile::tempdir().unwrap();
        let config = TrainerConfig {
            opensplat_path: "definitely-not-opensplat".to_string(),
        };
        let err = train_model(
            &config,
            Path::new("/tmp"),
            10,
            &out.path().join("model.ply"),
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert!(matches!(err, TrainerError::Tool(ToolError::Spawn { .. })));
    }

    #[test]
    fn test_clean_exit_without_model_is_an_error() {
        // `true` exits 0 and writes nothing, which must not count as success.
        let out = tempfile::tempdir().unwrap();
        let config = TrainerConfig {
            opensplat_path: "true".to_string(),
        };
        let err = train_model(
            &config,
            Path::new("/tmp"),
            10,
            &out.path().join("model.ply"),
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert!(matches!(err, TrainerError::MissingModel(_)));
    }
}
