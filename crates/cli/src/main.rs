//! Command-line frontend: convert point-cloud files and drive single jobs

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use splat_common::{CancelFlag, JobRecord, JobStatus};
use splat_orchestrator::{run_job, PipelineConfig, PipelineContext};
use splat_ply_codec as codec;

#[derive(Parser)]
#[command(
    name = "splat",
    version,
    about = "Gaussian-splat reconstruction pipeline and point-cloud converter"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a point-cloud file between formats
    Convert {
        input: PathBuf,
        output: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t)]
        to: TargetArg,

        /// Decode compressed input with the batch backend
        #[arg(long)]
        batch: bool,
    },

    /// Print a point-cloud file's header
    Inspect { input: PathBuf },

    /// Run one reconstruction job to completion
    Run {
        /// Dataset directory holding images or a video
        dataset: PathBuf,

        #[arg(long, default_value = "local")]
        owner: String,

        /// Training iterations (pipeline default when omitted)
        #[arg(long)]
        iterations: Option<u32>,
    },
}

#[derive(ValueEnum, Clone, Copy, Default)]
enum TargetArg {
    /// Importance-ordered flat records
    #[default]
    Splat,
    /// Chunk-compressed PLY
    Compressed,
    /// Raw gaussian PLY
    Ply,
}

impl From<TargetArg> for codec::TargetFormat {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Splat => Self::Splat,
            TargetArg::Compressed => Self::ChunkCompressed,
            TargetArg::Ply => Self::Raw,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Convert {
            input,
            output,
            to,
            batch,
        } => convert(&input, &output, to, batch),
        Commands::Inspect { input } => inspect(&input),
        Commands::Run {
            dataset,
            owner,
            iterations,
        } => run(dataset, &owner, iterations),
    }
}

fn convert(input: &Path, output: &Path, to: TargetArg, batch: bool) -> anyhow::Result<()> {
    let data = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let source = codec::detect_format(&data)?;
    let backend = if batch {
        codec::DecodeBackend::Batch
    } else {
        codec::DecodeBackend::Scalar
    };

    let converted = codec::convert_with(&data, source, to.into(), backend)?;
    std::fs::write(output, &converted)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "{} -> {} ({} bytes)",
        input.display(),
        output.display(),
        converted.len()
    );
    Ok(())
}

fn inspect(input: &Path) -> anyhow::Result<()> {
    let data = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let header = codec::PlyHeader::parse(&data)?;
    let format = codec::detect_format(&data)?;

    println!("format: {format:?}");
    for element in &header.elements {
        println!(
            "element {} x{} (stride {} bytes, offset {})",
            element.name, element.count, element.stride, element.data_offset
        );
        for property in &element.properties {
            println!("  property {:?} {}", property.ty, property.name);
        }
    }
    Ok(())
}

fn run(dataset: PathBuf, owner: &str, iterations: Option<u32>) -> anyhow::Result<()> {
    if !dataset.is_dir() {
        bail!("dataset directory does not exist: {}", dataset.display());
    }

    let config = PipelineConfig::from_env();
    let iterations = iterations.unwrap_or(config.default_iterations);
    let ctx = PipelineContext::new(config)?;

    let job_id = uuid::Uuid::new_v4().to_string();
    let record = JobRecord::new(
        job_id.clone(),
        owner.to_string(),
        dataset,
        ctx.config.data_root.join(owner).join(&job_id),
        iterations,
    );
    ctx.store.create(&record)?;

    println!("Running job {job_id}");
    run_job(&ctx, &job_id, &CancelFlag::new());

    let record = ctx
        .store
        .get(&job_id)?
        .context("job record vanished during run")?;
    match record.status {
        JobStatus::Success => {
            println!(
                "SUCCESS: {} ({} bytes)",
                record
                    .output_model_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                record.output_model_size_bytes.unwrap_or(0)
            );
            Ok(())
        }
        status => {
            bail!(
                "job ended {status:?}: {}",
                record.error.unwrap_or_else(|| "no error recorded".to_string())
            );
        }
    }
}
