//! Pipeline configuration
//!
//! One explicit context object carries every tunable the pipeline needs —
//! data root, tool paths, sampling rate, worker slots — so job execution
//! never reaches for ambient globals.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use splat_frame_extractor::FrameExtractorConfig;
use splat_photogrammetry::ColmapConfig;
use splat_trainer::TrainerConfig;

/// Configuration for the reconstruction pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory for job workspaces, results, and thumbnails
    pub data_root: PathBuf,

    pub frame_extractor: FrameExtractorConfig,
    pub colmap: ColmapConfig,
    pub trainer: TrainerConfig,

    /// Iterations used when a submission does not specify one
    pub default_iterations: u32,

    /// Number of jobs run concurrently, one per worker slot
    pub worker_slots: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            frame_extractor: FrameExtractorConfig::default(),
            colmap: ColmapConfig::default(),
            trainer: TrainerConfig::default(),
            default_iterations: 1000,
            worker_slots: num_cpus::get().clamp(1, 4),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden from `SPLAT_*` environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var("SPLAT_DATA_ROOT") {
            config.data_root = PathBuf::from(root);
        }
        if let Ok(path) = std::env::var("SPLAT_FFMPEG_PATH") {
            config.frame_extractor.ffmpeg_path = path;
        }
        if let Ok(rate) = std::env::var("SPLAT_FRAME_RATE") {
            if let Ok(rate) = rate.parse() {
                config.frame_extractor.frame_rate = rate;
            }
        }
        if let Ok(path) = std::env::var("SPLAT_COLMAP_PATH") {
            config.colmap.colmap_path = path;
        }
        if let Ok(path) = std::env::var("SPLAT_OPENSPLAT_PATH") {
            config.trainer.opensplat_path = path;
        }
        if let Ok(slots) = std::env::var("SPLAT_WORKER_SLOTS") {
            if let Ok(slots) = slots.parse::<usize>() {
                config.worker_slots = slots.max(1);
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = PipelineConfig::default();
        assert!(config.worker_slots >= 1);
        assert_eq!(config.frame_extractor.frame_rate, 1.0);
        assert_eq!(config.colmap.colmap_path, "colmap");
    }
}
