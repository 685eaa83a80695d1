//! HTTP request handlers for the job facade

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::io::Write;
use tracing::{error, info};

use splat_common::{JobRecord, JobStatus, PipelineError};
use splat_orchestrator::{JobWorkspace, SubmitRequest};
use splat_ply_codec as codec;

use crate::types::{
    DownloadFormat, HealthResponse, JobStatusResponse, MessageResponse, ModelQuery,
    SubmitJobRequest, SubmitJobResponse,
};
use crate::ApiState;

type HandlerError = (StatusCode, String);

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Submit a reconstruction job over an already-uploaded dataset
pub async fn submit_job(
    State(state): State<ApiState>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    info!(
        "Job submission from owner {} for dataset {}",
        request.owner_id, request.dataset_path
    );

    let record = state
        .runner
        .submit(SubmitRequest {
            owner_id: request.owner_id,
            dataset_path: request.dataset_path.into(),
            iteration_count: request.iteration_count,
        })
        .map_err(submit_error)?;

    let thumbnail_url = record
        .thumbnail_path
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|name| format!("/thumbnails/{}", name.to_string_lossy()));

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: record.id,
            thumbnail_url,
        }),
    ))
}

fn submit_error(err: PipelineError) -> HandlerError {
    match err {
        PipelineError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        other => {
            error!("Submission failed: {other}");
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

/// List all jobs, newest first
pub async fn list_jobs(
    State(state): State<ApiState>,
) -> Result<Json<Vec<JobStatusResponse>>, HandlerError> {
    let records = state.runner.store().list().map_err(internal_error)?;
    Ok(Json(
        records.into_iter().map(JobStatusResponse::from).collect(),
    ))
}

/// Poll one job's status
pub async fn job_status(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, HandlerError> {
    let record = load_job(&state, &job_id)?;
    Ok(Json(JobStatusResponse::from(record)))
}

/// Delete a job: best-effort directory removal plus cancellation
pub async fn delete_job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<MessageResponse>, HandlerError> {
    state.runner.delete(&job_id).map_err(internal_error)?;
    Ok(Json(MessageResponse {
        message: format!("Data for job {job_id} deleted successfully"),
    }))
}

/// Download the trained model, converted on demand.
///
/// The source encoding (raw vs chunk-compressed) is detected from the
/// file header; codec failures map to HTTP statuses here and never touch
/// job state.
pub async fn download_model(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
    Query(query): Query<ModelQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let record = load_job(&state, &job_id)?;
    if record.status != JobStatus::Success {
        return Err((
            StatusCode::NOT_FOUND,
            format!(
                "Result not ready or job failed. Current state: {:?}",
                record.status
            ),
        ));
    }
    let model_path = record.output_model_path.as_ref().ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Job succeeded but no output path was recorded".to_string(),
    ))?;
    let data = tokio::fs::read(model_path).await.map_err(|e| {
        error!("Cannot read model for job {job_id}: {e}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Output file not found at: {}", model_path.display()),
        )
    })?;

    // Conversion is CPU-bound; keep it off the async workers.
    let (bytes, filename) = tokio::task::spawn_blocking(move || {
        let source = codec::detect_format(&data)?;
        match query.format {
            DownloadFormat::Splat => codec::convert_with(
                &data,
                source,
                codec::TargetFormat::Splat,
                codec::DecodeBackend::Batch,
            )
            .map(|bytes| (bytes, "model.splat")),
            DownloadFormat::Ply => match source {
                codec::SourceFormat::Raw => Ok((data, "model.ply")),
                codec::SourceFormat::ChunkCompressed => {
                    codec::convert(&data, source, codec::TargetFormat::Raw)
                        .map(|bytes| (bytes, "model.ply"))
                }
            },
        }
    })
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Conversion task failed: {e}"),
        )
    })?
    .map_err(codec_error)?;

    Ok(download_response(&job_id, filename, bytes))
}

fn codec_error(err: codec::CodecError) -> HandlerError {
    error!("Model conversion failed: {err}");
    match err {
        codec::CodecError::MalformedHeader(_)
        | codec::CodecError::UnsupportedFormat(_)
        | codec::CodecError::MissingElement(_)
        | codec::CodecError::MissingProperty(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        codec::CodecError::TruncatedPayload { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// Download the reconstruction bundle (cameras, images, point cloud) as
/// one zip archive
pub async fn download_bundle(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let record = load_job(&state, &job_id)?;
    let export_dir = JobWorkspace::open(
        &state.runner.config().data_root,
        &record.owner_id,
        &record.id,
    )
    .export_dir();

    if !export_dir.is_dir() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("No reconstruction bundle for job {job_id}"),
        ));
    }

    let archive = tokio::task::spawn_blocking(move || zip_directory(&export_dir))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Bundle task failed: {e}"),
            )
        })?
        .map_err(|e| {
            error!("Bundle archive failed for job {job_id}: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    if archive.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("No reconstruction bundle for job {job_id}"),
        ));
    }

    Ok(download_response(
        &job_id,
        &format!("bundle_{job_id}.zip"),
        archive,
    ))
}

fn load_job(state: &ApiState, job_id: &str) -> Result<JobRecord, HandlerError> {
    state
        .runner
        .store()
        .get(job_id)
        .map_err(internal_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Job {job_id} not found")))
}

fn internal_error(err: PipelineError) -> HandlerError {
    error!("Request failed: {err}");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn download_response(job_id: &str, filename: &str, bytes: Vec<u8>) -> impl IntoResponse {
    info!("Serving {} ({} bytes) for job {job_id}", filename, bytes.len());
    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                "application/octet-stream".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        bytes,
    )
}

/// Deflate-zip every file under `dir`, keyed by its relative path.
/// Returns an empty archive for an empty directory.
fn zip_directory(dir: &std::path::Path) -> std::io::Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let mut stack = vec![dir.to_path_buf()];
    let mut wrote_any = false;
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let name = path
                    .strip_prefix(dir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                writer.start_file(name, options).map_err(zip_io_error)?;
                writer.write_all(&std::fs::read(&path)?)?;
                wrote_any = true;
            }
        }
    }

    if !wrote_any {
        return Ok(Vec::new());
    }
    let cursor = writer.finish().map_err(zip_io_error)?;
    Ok(cursor.into_inner())
}

fn zip_io_error(err: zip::result::ZipError) -> std::io::Error {
    std::io::Error::other(err)
}
