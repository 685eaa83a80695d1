//! Frame extraction module using the `FFmpeg` CLI
//!
//! Samples video frames at a fixed rate into a job's image directory and
//! grabs first-frame thumbnails for submitted videos.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use splat_common::{CancelFlag, ToolCommand, ToolError};

/// File extensions treated as video input
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

/// Errors specific to frame extraction
#[derive(Debug, Error)]
pub enum FrameExtractError {
    #[error("Video file not found: {0}")]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for frame extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameExtractorConfig {
    /// `FFmpeg` binary to invoke
    pub ffmpeg_path: String,

    /// Frames sampled per second of video
    pub frame_rate: f64,
}

impl Default for FrameExtractorConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            frame_rate: 1.0,
        }
    }
}

/// Whether a path looks like a video file by extension
#[must_use]
pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|v| ext.eq_ignore_ascii_case(v))
        })
        .unwrap_or(false)
}

/// First video file in a dataset directory, if any
///
/// # Errors
///
/// Returns an error when the directory cannot be read.
pub fn find_video(dataset_dir: &Path) -> Result<Option<PathBuf>, FrameExtractError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dataset_dir)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_video(p))
        .collect();
    entries.sort();
    Ok(entries.into_iter().next())
}

/// Sample frames from a video into `images_dir` at the configured rate
///
/// # Errors
///
/// Returns an error if the video is missing or `FFmpeg` fails.
pub fn extract_frames(
    video_path: &Path,
    images_dir: &Path,
    config: &FrameExtractorConfig,
    cancel: &CancelFlag,
) -> Result<(), FrameExtractError> {
    if !video_path.exists() {
        return Err(FrameExtractError::FileNotFound(video_path.to_path_buf()));
    }
    std::fs::create_dir_all(images_dir)?;

    info!(
        "Extracting frames from {} at {} fps",
        video_path.display(),
        config.frame_rate
    );

    ToolCommand::new(&config.ffmpeg_path)
        .arg("-i")
        .arg(video_path)
        .arg("-vf")
        .arg(format!("fps={}", config.frame_rate))
        .arg(images_dir.join("output_%04d.png"))
        .run(cancel)?;
    Ok(())
}

/// Grab the first frame of a video as a JPEG thumbnail
///
/// # Errors
///
/// Returns an error if the video is missing or `FFmpeg` fails.
pub fn extract_thumbnail(
    video_path: &Path,
    thumbnail_path: &Path,
    config: &FrameExtractorConfig,
    cancel: &CancelFlag,
) -> Result<(), FrameExtractError> {
    if !video_path.exists() {
        return Err(FrameExtractError::FileNotFound(video_path.to_path_buf()));
    }
    if let Some(parent) = thumbnail_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    ToolCommand::new(&config.ffmpeg_path)
        .arg("-y")
        .arg("-i")
        .arg(video_path)
        .arg("-vframes")
        .arg("1")
        .arg("-q:v")
        .arg("3")
        .arg(thumbnail_path)
        .run(cancel)?;
    Ok(())
}
