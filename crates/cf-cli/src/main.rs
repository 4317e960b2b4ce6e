//! photomesh: turn a photo into a printable STL.
//!
//! # Commands
//!
//! - `photomesh process <IMAGE>` - Run one job in the foreground
//! - `photomesh submit <IMAGE>...` - Queue images and drain them with a worker pool
//! - `photomesh status <JOB_ID>` - Print a job's status record
//! - `photomesh sweep --max-age-secs N` - Fail jobs whose worker went quiet
//!
//! Settings come from the environment (and a `.env` file when present):
//! `POISSON_DEPTH`, `OUTLIER_NEIGHBORS`, `OUTLIER_STD_RATIO`,
//! `ORTHO_SCALE_FACTOR`, `INFERENCE_RESIZE`, `NORMAL_NEIGHBORS`,
//! `MAX_GRID_DEPTH`, `RESULT_PREFIX`, `UPLOAD_DIR`, `RESULT_DIR`,
//! `STATUS_DIR`, `WORKERS`, `DEPTH_CHECKPOINT`, `USE_GPU`.
//! Log verbosity follows `RUST_LOG` (default `info`).

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Photo to STL reconstruction
#[derive(Parser)]
#[command(name = "photomesh")]
#[command(about = "Turn a single photo into a printable STL mesh", long_about = None)]
#[command(version)]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct one image synchronously
    Process {
        /// Input photo
        #[arg(name = "IMAGE")]
        image: PathBuf,

        /// Directory for the STL (defaults to RESULT_DIR)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Job id to record under (defaults to a fresh UUID)
        #[arg(long)]
        job_id: Option<String>,

        /// Poisson depth (overrides POISSON_DEPTH)
        #[arg(long)]
        depth: Option<u32>,
    },

    /// Submit images and process them with a worker pool
    Submit {
        /// Input photos
        #[arg(name = "IMAGE", required = true)]
        images: Vec<PathBuf>,
    },

    /// Show the status of a job
    Status {
        /// Job to look up
        #[arg(name = "JOB_ID")]
        job_id: String,
    },

    /// Mark RUNNING jobs with a stale heartbeat as FAILURE
    Sweep {
        /// Maximum seconds since the last status write
        #[arg(long, default_value_t = 600)]
        max_age_secs: u64,
    },
}

fn main() -> Result<ExitCode> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = commands::Settings::load()?;

    match cli.command {
        Commands::Process {
            image,
            output_dir,
            job_id,
            depth,
        } => commands::process(settings, &image, output_dir, job_id, depth, cli.json),
        Commands::Submit { images } => commands::submit(settings, &images, cli.json),
        Commands::Status { job_id } => commands::status(&settings, &job_id),
        Commands::Sweep { max_age_secs } => commands::sweep(&settings, max_age_secs, cli.json),
    }
}
