//! REST facade over the reconstruction pipeline
//!
//! A thin read-mostly layer: submissions create jobs, everything else
//! polls persisted job state or converts finished artifacts for download.

mod handlers;
mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use splat_orchestrator::JobRunner;

pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// Worker pool and job store behind the facade
    pub runner: Arc<JobRunner>,
}

impl ApiState {
    #[must_use]
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self { runner }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/jobs", post(submit_job).get(list_jobs))
        .route("/api/jobs/{job_id}", get(job_status).delete(delete_job))
        .route("/api/jobs/{job_id}/model", get(download_model))
        .route("/api/jobs/{job_id}/bundle", get(download_bundle))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
///
/// # Errors
///
/// Returns the bind or serve error.
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await
}
