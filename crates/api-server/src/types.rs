//! API request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splat_common::{JobRecord, JobStatus};

/// Job submission request: the dataset directory is already populated
/// with images or a video by the upload layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub owner_id: String,
    pub dataset_path: String,
    #[serde(default)]
    pub iteration_count: Option<u32>,
}

/// Response to a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// External view of a job's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub output_size_bytes: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.id,
            status: record.status,
            stage: record.stage_message,
            error: record.error,
            output_path: record
                .output_model_path
                .map(|p| p.display().to_string()),
            output_size_bytes: record.output_model_size_bytes,
            created_at: record.created_at,
        }
    }
}

/// Download format for the trained model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadFormat {
    /// Importance-ordered flat records
    #[default]
    Splat,
    /// Raw gaussian PLY
    Ply,
}

/// Query parameters for the model download endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ModelQuery {
    #[serde(default)]
    pub format: DownloadFormat,
}

/// Simple message response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_format_parsing() {
        let q: ModelQuery = serde_json::from_str(r#"{"format":"ply"}"#).unwrap();
        assert_eq!(q.format, DownloadFormat::Ply);
        let q: ModelQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.format, DownloadFormat::Splat);
    }

    #[test]
    fn test_submit_request_deserialization() {
        let json = r#"{
            "owner_id": "user-7",
            "dataset_path": "/data/uploads/abc",
            "iteration_count": 200
        }"#;
        let request: SubmitJobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.owner_id, "user-7");
        assert_eq!(request.iteration_count, Some(200));
    }

    #[test]
    fn test_status_response_from_record() {
        let record = JobRecord::new(
            "job-9".to_string(),
            "user-7".to_string(),
            "/data/in".into(),
            "/data/jobs/user-7/job-9".into(),
            100,
        );
        let response = JobStatusResponse::from(record);
        assert_eq!(response.job_id, "job-9");
        assert_eq!(response.status, JobStatus::Pending);
        assert!(response.output_path.is_none());

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"PENDING\""));
    }
}
