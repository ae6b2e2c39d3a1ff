/**
 * Artifact Fetcher
 *
 * Materializes one artifact at one destination path, downloading it only
 * when the destination is absent. A non-empty file, or a directory with at
 * least one entry, counts as a completed download; nothing is re-verified.
 */
use futures_util::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::progress::{LogProgress, NoProgress, ProgressObserver, TransferProgress};
use super::snapshot::{HubSnapshotClient, SnapshotClient, HUB_HOST};
use super::source::SourceLocator;
use super::transport::{HttpTransport, TransferBody, Transport};
use crate::error::FetchError;

/// Largest slice written to disk (and reported) in one step
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Suffix of the sibling path used by staged commits
pub const STAGING_SUFFIX: &str = ".partial";

/// How a finished transfer lands at its destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CommitMode {
    /// Write straight into the destination. An interrupted transfer leaves a
    /// partial artifact that later runs will treat as complete.
    #[default]
    InPlace,
    /// Write to `<dest>.partial` and rename onto the destination once the
    /// transfer has finished.
    Staged,
}

/// What a fetch did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FetchOutcome {
    /// Destination was already populated; no network access
    Cached,
    /// Artifact was transferred during this call
    Fetched,
}

/// Transfer settings read from the job configuration
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub commit_mode: CommitMode,
    pub hub_token: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: HttpTransport::DEFAULT_TIMEOUT,
            commit_mode: CommitMode::InPlace,
            hub_token: None,
        }
    }
}

pub struct ArtifactFetcher {
    transport: Arc<dyn Transport>,
    snapshots: Arc<dyn SnapshotClient>,
    observer: Arc<dyn ProgressObserver>,
    commit_mode: CommitMode,
}

impl ArtifactFetcher {
    pub fn new(transport: Arc<dyn Transport>, snapshots: Arc<dyn SnapshotClient>) -> Self {
        Self {
            transport,
            snapshots,
            observer: Arc::new(NoProgress),
            commit_mode: CommitMode::InPlace,
        }
    }

    /// Network-backed fetcher with logged progress. The Hub token, from the
    /// options or `HF_TOKEN`, also goes with direct downloads from the Hub.
    pub fn from_options(options: &FetchOptions) -> Result<Self, FetchError> {
        let hub_token = options
            .hub_token
            .clone()
            .or_else(|| std::env::var("HF_TOKEN").ok());
        let transport = Arc::new(
            HttpTransport::new(options.timeout)?.with_bearer_token_for(HUB_HOST, hub_token.clone()),
        );
        let snapshots = Arc::new(HubSnapshotClient::new(options.timeout, hub_token)?);
        Ok(Self::new(transport, snapshots)
            .with_observer(Arc::new(LogProgress::default()))
            .with_commit_mode(options.commit_mode))
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_commit_mode(mut self, commit_mode: CommitMode) -> Self {
        self.commit_mode = commit_mode;
        self
    }

    /// Ensure the artifact exists at `dest`, returning `dest`
    pub async fn fetch(&self, source: &SourceLocator, dest: &Path) -> Result<PathBuf, FetchError> {
        self.ensure(source, dest).await?;
        Ok(dest.to_path_buf())
    }

    /// Like [`fetch`](Self::fetch), but reports whether a transfer happened
    pub async fn ensure(
        &self,
        source: &SourceLocator,
        dest: &Path,
    ) -> Result<FetchOutcome, FetchError> {
        if is_materialized(dest).await {
            tracing::info!("Artifact already exists at {:?}, skipping download", dest);
            return Ok(FetchOutcome::Cached);
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::Permission {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let target = match self.commit_mode {
            CommitMode::InPlace => dest.to_path_buf(),
            CommitMode::Staged => {
                let staging = staging_path(dest);
                remove_path(&staging)
                    .await
                    .map_err(|e| FetchError::transfer(source.to_string(), e))?;
                staging
            }
        };

        if let Err(e) = self.transfer(source, &target).await {
            if self.commit_mode == CommitMode::InPlace {
                tracing::warn!(
                    "Transfer into {:?} failed; any partial data left there will be treated as complete on the next run. Delete it before retrying.",
                    dest
                );
            }
            return Err(e);
        }

        if self.commit_mode == CommitMode::Staged {
            // An empty placeholder would block the rename.
            let committed = match remove_path(dest).await {
                Ok(()) => tokio::fs::rename(&target, dest).await,
                Err(e) => Err(e),
            };
            committed.map_err(|e| {
                FetchError::transfer(
                    source.to_string(),
                    format!("cannot move {:?} into place: {}", target, e),
                )
            })?;
        }

        Ok(FetchOutcome::Fetched)
    }

    async fn transfer(&self, source: &SourceLocator, target: &Path) -> Result<(), FetchError> {
        match source {
            SourceLocator::DirectUrl(url) => {
                let body = self.transport.open(url).await?;
                write_body(body, target, url, self.observer.as_ref()).await?;
                Ok(())
            }
            SourceLocator::RepositorySnapshot(repo) => self
                .snapshots
                .materialize(repo, target, self.observer.as_ref())
                .await
                .map_err(|e| match e {
                    FetchError::Transfer { .. } => e,
                    other => FetchError::transfer(repo.to_string(), other),
                }),
        }
    }
}

/// Whether `path` holds a non-empty file or a non-empty directory
pub async fn is_materialized(path: &Path) -> bool {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return false;
    };
    if metadata.is_dir() {
        match tokio::fs::read_dir(path).await {
            Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
            Err(_) => false,
        }
    } else {
        metadata.len() > 0
    }
}

/// `<dest>.partial`, next to `dest`
pub fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(STAGING_SUFFIX);
    dest.with_file_name(name)
}

async fn remove_path(path: &Path) -> std::io::Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Stream a response body into `path`, at most `CHUNK_SIZE` bytes per write.
/// Returns the number of bytes written.
pub(crate) async fn write_body(
    mut body: TransferBody,
    path: &Path,
    locator: &str,
    observer: &dyn ProgressObserver,
) -> Result<u64, FetchError> {
    let file = tokio::fs::File::create(path)
        .await
        .map_err(|e| FetchError::transfer(locator, format!("cannot create {:?}: {}", path, e)))?;
    let mut file = BufWriter::with_capacity(CHUNK_SIZE, file);

    let mut progress = TransferProgress::new(body.total);
    observer.on_start(path, body.total);

    let streamed: Result<(), FetchError> = async {
        while let Some(item) = body.stream.next().await {
            let chunk = item?;
            for piece in chunk.chunks(CHUNK_SIZE) {
                file.write_all(piece)
                    .await
                    .map_err(|e| FetchError::transfer(locator, format!("write failed: {}", e)))?;
                progress.advance(piece.len() as u64);
                observer.on_progress(&progress);
            }
        }
        Ok(())
    }
    .await;

    // Whatever arrived before a failure still lands on disk.
    let flushed = file
        .flush()
        .await
        .map_err(|e| FetchError::transfer(locator, format!("write failed: {}", e)));
    streamed?;
    flushed?;

    observer.on_finish(path, &progress);
    Ok(progress.downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_staging_path() {
        let dest = Path::new("/data/models/flux1-dev.safetensors");
        assert_eq!(
            staging_path(dest),
            PathBuf::from("/data/models/flux1-dev.safetensors.partial")
        );
    }

    #[tokio::test]
    async fn test_is_materialized() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.bin");
        assert!(!is_materialized(&missing).await);

        let empty_file = dir.path().join("empty.bin");
        std::fs::write(&empty_file, b"").unwrap();
        assert!(!is_materialized(&empty_file).await);

        let file = dir.path().join("weights.bin");
        std::fs::write(&file, b"abc").unwrap();
        assert!(is_materialized(&file).await);

        let empty_dir = dir.path().join("snapshot");
        std::fs::create_dir(&empty_dir).unwrap();
        assert!(!is_materialized(&empty_dir).await);

        std::fs::write(empty_dir.join("config.json"), b"{}").unwrap();
        assert!(is_materialized(&empty_dir).await);
    }
}
