use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use artifact_fetch_lib::downloads::{
    ArtifactFetcher, CommitMode, DownloadManifestRunner, FetchOptions,
};
use artifact_fetch_lib::job::{run_job, ExternalPipeline, JobConfig};
use artifact_fetch_lib::paths;

#[derive(Parser)]
#[command(name = "artifact-fetch", version, about = "Fetch model weights and run a generation job")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download every manifest entry that is not cached yet
    Fetch {
        /// JSON manifest: {"relative/path": "https://... | hf://org/name"}
        #[arg(long, default_value = "downloads.json")]
        manifest: PathBuf,
        /// Directory manifest paths are resolved against
        #[arg(long)]
        base_dir: Option<PathBuf>,
        /// Download to <dest>.partial and rename when complete
        #[arg(long)]
        staged: bool,
        /// Per-request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Fetch the manifest, then run the generation pipeline once
    Job {
        #[arg(long, default_value = "job.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Fetch {
            manifest,
            base_dir,
            staged,
            timeout_secs,
        } => {
            let base_dir = match base_dir {
                Some(dir) => dir,
                None => paths::default_base_dir().map_err(|e| anyhow!(e))?,
            };
            let mut options = FetchOptions::default();
            if staged {
                options.commit_mode = CommitMode::Staged;
            }
            if let Some(secs) = timeout_secs {
                options.timeout = std::time::Duration::from_secs(secs);
            }

            let fetcher = ArtifactFetcher::from_options(&options)?;
            let report = DownloadManifestRunner::new(&fetcher)
                .run(&manifest, &base_dir)
                .await?;
            tracing::info!(
                "{} entries ready under {:?} ({} downloaded)",
                report.entries.len(),
                base_dir,
                report.fetched()
            );
        }
        Command::Job { config } => {
            let config = JobConfig::load(&config)?;
            let fetcher = ArtifactFetcher::from_options(&config.fetch)?;
            let pipeline = ExternalPipeline::new(
                config.pipeline.program.clone(),
                config.pipeline.args.clone(),
            );
            let outcome = run_job(&config, &fetcher, &pipeline).await?;
            tracing::info!("done! image saved to {:?}", outcome.output);
        }
    }

    Ok(())
}
