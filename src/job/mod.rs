/**
 * Job Module
 *
 * The single entry function the execution environment calls per request:
 * 1. Fetch every manifest entry into the cache volume
 * 2. Probe the GPUs
 * 3. Run the generation pipeline once and save the image
 */
mod config;
mod gpu;
mod pipeline;

pub use config::*;
pub use gpu::list_gpus;
pub use pipeline::*;

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use crate::downloads::{is_materialized, ArtifactFetcher, DownloadManifestRunner, RunReport};
use crate::paths;

/// What a completed job produced
#[derive(Debug)]
pub struct JobOutcome {
    pub report: RunReport,
    pub gpus: Vec<String>,
    pub output: PathBuf,
}

/// Run the job described by `config`
pub async fn run_job(
    config: &JobConfig,
    fetcher: &ArtifactFetcher,
    pipeline: &dyn GenerationPipeline,
) -> Result<JobOutcome> {
    let base_dir = &config.cache.base_dir;
    config.cache.check_on_volume();
    paths::ensure_dir_exists(base_dir).map_err(|e| anyhow!(e))?;

    let report = DownloadManifestRunner::new(fetcher)
        .run(&config.manifest, base_dir)
        .await?;
    tracing::info!(
        "Cache {:?} holds {:.2} MB",
        base_dir,
        paths::dir_size(base_dir) as f64 / 1_000_000.0
    );

    let gpus = list_gpus().await;

    let model_path = config.resolved_model_path();
    if !is_materialized(&model_path).await {
        return Err(anyhow!(
            "model weights not found at {:?}; add them to {:?}",
            model_path,
            config.manifest
        ));
    }

    config.generation.validate()?;
    tracing::info!("Generating image from {:?}", model_path);
    let generated = pipeline.generate(&model_path, &config.generation).await?;

    if let Some(parent) = config.output.parent() {
        if !parent.as_os_str().is_empty() {
            paths::ensure_dir_exists(parent).map_err(|e| anyhow!(e))?;
        }
    }
    tokio::fs::write(&config.output, &generated.image)
        .await
        .with_context(|| format!("Cannot save image to {:?}", config.output))?;
    tracing::info!("Saved {:?} ({} bytes)", config.output, generated.image.len());

    Ok(JobOutcome {
        report,
        gpus,
        output: config.output.clone(),
    })
}
