/// API server binary
use tracing::error;

use splat_api_server::{start_server, ApiState};
use splat_orchestrator::{JobRunner, PipelineConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = PipelineConfig::from_env();
    let runner = match JobRunner::new(config) {
        Ok(runner) => runner,
        Err(e) => {
            error!("Failed to initialize job runner: {e}");
            std::process::exit(1);
        }
    };

    let addr = std::env::var("SPLAT_API_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    if let Err(e) = start_server(&addr, ApiState::new(runner)).await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}
