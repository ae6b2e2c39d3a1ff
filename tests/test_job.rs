mod common;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use artifact_fetch_lib::downloads::ArtifactFetcher;
use artifact_fetch_lib::job::{
    run_job, GenerationOutput, GenerationPipeline, GenerationRequest, JobConfig,
};
use common::{FakeResponse, FakeSnapshots, FakeTransport};

/// Records what it was asked to generate and returns fixed bytes
#[derive(Default)]
struct RecordingPipeline {
    calls: Mutex<Vec<(PathBuf, GenerationRequest)>>,
}

#[async_trait]
impl GenerationPipeline for RecordingPipeline {
    async fn generate(
        &self,
        model_path: &Path,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((model_path.to_path_buf(), request.clone()));
        Ok(GenerationOutput {
            image: b"\xFF\xD8\xFFjpeg".to_vec(),
        })
    }
}

fn job_config(dir: &Path, manifest: &str) -> JobConfig {
    let manifest_path = dir.join("downloads.json");
    std::fs::write(&manifest_path, manifest).unwrap();
    let image = dir.join("penguin.jpg");
    std::fs::write(&image, b"input").unwrap();

    let content = format!(
        r#"
        manifest = '{manifest}'
        model_path = "models/FLUX.1-schnell"
        output = '{output}'

        [cache]
        base_dir = '{base}'

        [generation]
        prompt = "On Christmas evening, this item sits on the road, covered in snow."
        seed = 0
        conditions = [{{ kind = "subject", image = '{image}' }}]

        [pipeline]
        program = "unused"
        "#,
        manifest = manifest_path.display(),
        output = dir.join("out/output.jpg").display(),
        base = dir.join("data").display(),
        image = image.display(),
    );
    JobConfig::parse(&content).unwrap()
}

#[tokio::test]
async fn test_job_fetches_then_generates() {
    let dir = TempDir::new().unwrap();
    let config = job_config(
        dir.path(),
        r#"{"models/FLUX.1-schnell": "hf://black-forest-labs/FLUX.1-schnell", "loras/subject_512.safetensors": "https://x/lora"}"#,
    );
    let transport = Arc::new(FakeTransport::new().with("https://x/lora", FakeResponse::Body(b"lora".to_vec())));
    let snapshots = Arc::new(FakeSnapshots::new());
    let fetcher = ArtifactFetcher::new(transport.clone(), snapshots.clone());
    let pipeline = RecordingPipeline::default();

    let outcome = run_job(&config, &fetcher, &pipeline).await.unwrap();

    assert_eq!(outcome.report.fetched(), 2);
    assert_eq!(std::fs::read(&outcome.output).unwrap(), b"\xFF\xD8\xFFjpeg");

    let calls = pipeline.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, dir.path().join("data/models/FLUX.1-schnell"));
    assert_eq!(calls[0].1.num_inference_steps, 8);
    assert_eq!(calls[0].1.conditions.len(), 1);
}

#[tokio::test]
async fn test_job_skips_generation_when_download_fails() {
    let dir = TempDir::new().unwrap();
    let config = job_config(
        dir.path(),
        r#"{"models/FLUX.1-schnell/model.safetensors": "https://x/missing"}"#,
    );
    let transport = Arc::new(FakeTransport::new().with("https://x/missing", FakeResponse::Status(404)));
    let fetcher = ArtifactFetcher::new(transport, Arc::new(FakeSnapshots::new()));
    let pipeline = RecordingPipeline::default();

    assert!(run_job(&config, &fetcher, &pipeline).await.is_err());
    assert!(pipeline.calls.lock().unwrap().is_empty());
    assert!(!dir.path().join("out/output.jpg").exists());
}

#[tokio::test]
async fn test_job_requires_model_weights() {
    let dir = TempDir::new().unwrap();
    let config = job_config(dir.path(), "{}");
    let fetcher = ArtifactFetcher::new(Arc::new(FakeTransport::new()), Arc::new(FakeSnapshots::new()));
    let pipeline = RecordingPipeline::default();

    let err = run_job(&config, &fetcher, &pipeline).await.unwrap_err();

    assert!(err.to_string().contains("model weights not found"));
    assert!(pipeline.calls.lock().unwrap().is_empty());
}
