/// Orchestrator worker binary: run one reconstruction job to completion
use std::path::PathBuf;
use tracing::{error, info};

use splat_common::{CancelFlag, JobRecord};
use splat_orchestrator::{run_job, PipelineConfig, PipelineContext};

fn main() {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <dataset-dir> [iterations]", args[0]);
        std::process::exit(1);
    }

    let dataset = PathBuf::from(&args[1]);
    if !dataset.is_dir() {
        error!("Dataset directory not found: {}", dataset.display());
        std::process::exit(1);
    }

    let config = PipelineConfig::from_env();
    let iterations = args
        .get(2)
        .and_then(|v| v.parse().ok())
        .unwrap_or(config.default_iterations);

    let ctx = match PipelineContext::new(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Failed to initialize pipeline: {e}");
            std::process::exit(1);
        }
    };

    let job_id = uuid::Uuid::new_v4().to_string();
    let record = JobRecord::new(
        job_id.clone(),
        "local".to_string(),
        dataset,
        ctx.config.data_root.join("local").join(&job_id),
        iterations,
    );
    if let Err(e) = ctx.store.create(&record) {
        error!("Failed to create job record: {e}");
        std::process::exit(1);
    }

    info!("Created job {job_id}");
    run_job(&ctx, &job_id, &CancelFlag::new());

    match ctx.store.get(&job_id) {
        Ok(Some(record)) => {
            println!("\n=== Job Result ===");
            println!("Job ID:  {}", record.id);
            println!("Status:  {:?}", record.status);
            if let Some(stage) = &record.stage_message {
                println!("Stage:   {stage}");
            }
            if let Some(err) = &record.error {
                println!("Error:   {err}");
            }
            if let Some(path) = &record.output_model_path {
                println!(
                    "Model:   {} ({} bytes)",
                    path.display(),
                    record.output_model_size_bytes.unwrap_or(0)
                );
            }
        }
        other => {
            error!("Job record unavailable after run: {other:?}");
            std::process::exit(1);
        }
    }
}
