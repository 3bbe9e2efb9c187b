mod error;
mod worker;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use bf_core::{Attribute, CancelToken, Config, ParentRole, Pipeline};
use crate::error::AppError;
use crate::worker::GenerationWorker;

#[derive(Parser)]
#[command(name = "babyface")]
#[command(about = "Generate a baby face from two parent photos", version)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Command-line overrides for values otherwise read from the environment
#[derive(Args)]
struct Overrides {
    /// Generation endpoint URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Give up waiting for a job after this many seconds
    #[arg(long, global = true)]
    poll_timeout: Option<u64>,

    /// Give up waiting for a job after this many status checks
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Directory generated images are written to
    #[arg(long, global = true)]
    results_dir: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(endpoint) = self.endpoint {
            config.client.endpoint_url = endpoint;
        }
        if let Some(secs) = self.poll_timeout {
            config.client.poll_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = self.max_attempts {
            config.client.max_attempts = n;
        }
        if let Some(dir) = self.results_dir {
            config.results_dir = dir;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Publish both parent photos and generate a baby image
    Generate {
        /// Father's photo
        #[arg(long)]
        father: PathBuf,

        /// Mother's photo
        #[arg(long)]
        mother: PathBuf,

        /// random, boy or girl
        #[arg(long, default_value = "random")]
        gender: Attribute,
    },

    /// Publish a single parent photo and print its public URL
    Publish {
        /// father or mother
        #[arg(long)]
        role: ParentRole,

        path: PathBuf,
    },

    /// Wait for an already submitted job and save its result
    Resume {
        job_id: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    cli.overrides.apply(&mut config);
    let pipeline = Pipeline::from_config(&config)?;

    match cli.command {
        Commands::Publish { role, path } => {
            let url = pipeline.publish(&path, role)?;
            println!("{url}");
        }
        Commands::Generate { father, mother, gender } => {
            println!("Generating ({gender})... Please wait...");
            let worker = GenerationWorker::new(pipeline);
            let request_id = worker.generate(father, mother, gender)?;
            finish(&worker, request_id)?;
        }
        Commands::Resume { job_id } => {
            let worker = GenerationWorker::new(pipeline);
            let request_id = worker.resume(job_id)?;
            finish(&worker, request_id)?;
        }
    }

    Ok(())
}

fn finish(worker: &GenerationWorker, request_id: uuid::Uuid) -> Result<(), AppError> {
    if let Some(token) = worker.cancel_token(request_id) {
        cancel_on_ctrl_c(token);
    }

    let image = worker.wait_for(request_id, |stage| println!("{stage}"))?;
    println!("Generation complete! Saved to {}", image.path.display());
    Ok(())
}

/// Ctrl-C cancels the running request instead of killing the process, so the
/// poll loop can stop cleanly.
fn cancel_on_ctrl_c(token: CancelToken) {
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("Cancelling...");
        token.cancel();
    }) {
        debug!("Ctrl-C handler unavailable: {}", e);
    }
}
