/**
 * Job Configuration
 *
 * Loaded once per invocation from a TOML file:
 *
 * ```toml
 * manifest = "/workspace/downloads.json"
 * model_path = "models/FLUX.1-schnell"
 * output = "output.jpg"
 *
 * [cache]
 * base_dir = "/data"
 * volume = { name = "downloads-cache", mount_point = "/data" }
 *
 * [transfer]
 * timeout_secs = 1800
 * staged = false
 *
 * [generation]
 * prompt = "On Christmas evening, this item sits on the road, covered in snow."
 * conditions = [{ kind = "subject", image = "assets/penguin.jpg" }]
 *
 * [pipeline]
 * program = "python"
 * args = ["pipeline.py"]
 * ```
 */
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::pipeline::GenerationRequest;
use crate::downloads::{CommitMode, FetchOptions, HttpTransport};
use crate::paths::{self, CacheConfig, VolumeHandle};

#[derive(Debug, Deserialize)]
struct JobConfigFile {
    manifest: PathBuf,
    model_path: PathBuf,
    #[serde(default = "default_output")]
    output: PathBuf,
    #[serde(default)]
    cache: CacheSection,
    #[serde(default)]
    transfer: TransferSection,
    generation: GenerationRequest,
    pipeline: PipelineCommand,
}

#[derive(Debug, Default, Deserialize)]
struct CacheSection {
    base_dir: Option<PathBuf>,
    volume: Option<VolumeHandle>,
}

#[derive(Debug, Default, Deserialize)]
struct TransferSection {
    timeout_secs: Option<u64>,
    #[serde(default)]
    staged: bool,
    hub_token: Option<String>,
}

/// Command line of the external generation pipeline
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_output() -> PathBuf {
    PathBuf::from("output.jpg")
}

/// Fully resolved job settings
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub cache: CacheConfig,
    pub manifest: PathBuf,
    /// Weights directory or file, relative to the cache base
    pub model_path: PathBuf,
    pub output: PathBuf,
    pub fetch: FetchOptions,
    pub generation: GenerationRequest,
    pub pipeline: PipelineCommand,
}

impl JobConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read job config {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Invalid job config {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: JobConfigFile = toml::from_str(content)?;

        if file.model_path.is_absolute() {
            return Err(anyhow!(
                "model_path {:?} must be relative to the cache base directory",
                file.model_path
            ));
        }

        let base_dir = match file.cache.base_dir {
            Some(dir) => dir,
            None => paths::default_base_dir().map_err(|e| anyhow!(e))?,
        };
        let mut cache = CacheConfig::new(base_dir);
        if let Some(volume) = file.cache.volume {
            cache = cache.with_volume(volume);
        }

        let fetch = FetchOptions {
            timeout: file
                .transfer
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(HttpTransport::DEFAULT_TIMEOUT),
            commit_mode: if file.transfer.staged {
                CommitMode::Staged
            } else {
                CommitMode::InPlace
            },
            hub_token: file.transfer.hub_token,
        };

        Ok(Self {
            cache,
            manifest: file.manifest,
            model_path: file.model_path,
            output: file.output,
            fetch,
            generation: file.generation,
            pipeline: file.pipeline,
        })
    }

    /// Absolute path of the pretrained weights
    pub fn resolved_model_path(&self) -> PathBuf {
        self.cache.resolve(&self.model_path)
    }
}
