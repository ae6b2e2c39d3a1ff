/**
 * Generation Pipeline
 *
 * The diffusion pipeline is an external collaborator. This module defines
 * the request handed to it and a command-backed implementation that runs
 * the pipeline as a separate process.
 */
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Conditioning type understood by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    Subject,
    Canny,
    Depth,
    Coloring,
    Deblurring,
    Fill,
}

/// A conditioning image plus its type tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub image: PathBuf,
}

/// LoRA weights loaded on top of the base model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraAdapter {
    pub repo_id: String,
    pub weight_name: String,
    pub adapter_name: String,
}

fn default_steps() -> u32 {
    8
}

fn default_side() -> u32 {
    512
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default = "default_steps")]
    pub num_inference_steps: u32,
    #[serde(default = "default_side")]
    pub height: u32,
    #[serde(default = "default_side")]
    pub width: u32,
    #[serde(default)]
    pub guidance_scale: Option<f32>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub lora: Option<LoraAdapter>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            conditions: Vec::new(),
            num_inference_steps: default_steps(),
            height: default_side(),
            width: default_side(),
            guidance_scale: None,
            seed: 0,
            lora: None,
        }
    }

    pub fn with_condition(mut self, kind: ConditionKind, image: impl Into<PathBuf>) -> Self {
        self.conditions.push(Condition {
            kind,
            image: image.into(),
        });
        self
    }

    /// Reject requests the pipeline could not run
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(anyhow!("prompt is empty"));
        }
        if self.num_inference_steps == 0 {
            return Err(anyhow!("num_inference_steps must be at least 1"));
        }
        if self.height == 0 || self.width == 0 {
            return Err(anyhow!(
                "output size {}x{} is invalid",
                self.width,
                self.height
            ));
        }
        if let Some(scale) = self.guidance_scale {
            if !scale.is_finite() || scale < 0.0 {
                return Err(anyhow!("guidance_scale {} is invalid", scale));
            }
        }
        for condition in &self.conditions {
            if !condition.image.exists() {
                return Err(anyhow!(
                    "condition image not found: {:?}",
                    condition.image
                ));
            }
        }
        Ok(())
    }
}

/// Encoded output image
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub image: Vec<u8>,
}

/// Produces one image from pretrained weights and a request
#[async_trait]
pub trait GenerationPipeline: Send + Sync {
    async fn generate(
        &self,
        model_path: &Path,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput>;
}

/// Payload written to the external pipeline's stdin
#[derive(Serialize)]
struct PipelineInvocation<'a> {
    model_path: &'a Path,
    output_path: &'a Path,
    request: &'a GenerationRequest,
}

/// Runs the pipeline as a child process.
///
/// The process receives a JSON object on stdin with `model_path`,
/// `output_path` and `request`, and must write the image to `output_path`
/// before exiting successfully.
pub struct ExternalPipeline {
    program: String,
    args: Vec<String>,
    scratch_dir: PathBuf,
}

impl ExternalPipeline {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }
}

#[async_trait]
impl GenerationPipeline for ExternalPipeline {
    async fn generate(
        &self,
        model_path: &Path,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput> {
        let output_path = self
            .scratch_dir
            .join(format!("generation-{}.img", std::process::id()));
        let payload = serde_json::to_vec(&PipelineInvocation {
            model_path,
            output_path: &output_path,
            request,
        })?;

        // A leftover image from an earlier run must not pass for this one.
        match tokio::fs::remove_file(&output_path).await {
            Ok(()) => tracing::warn!("Removed stale pipeline output {:?}", output_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Cannot clear stale output {:?}", output_path));
            }
        }

        tracing::info!("Generating image with {} {:?}", self.program, self.args);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start pipeline {}", self.program))?;

        // stdin is closed when dropped, so the child sees EOF either way.
        let sent = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&payload).await,
            None => Ok(()),
        };

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(anyhow!(
                "pipeline exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }
        sent.context("Failed to send the request to the pipeline")?;

        let image = tokio::fs::read(&output_path)
            .await
            .with_context(|| format!("pipeline wrote no image to {:?}", output_path))?;
        let _ = tokio::fs::remove_file(&output_path).await;

        Ok(GenerationOutput { image })
    }
}
