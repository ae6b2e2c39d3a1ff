/**
 * Repository Snapshots
 *
 * Materializes every file of a model repository into one directory.
 * `HubSnapshotClient` lists the repository through the Hub API and streams
 * each file with the same chunked writer used for direct downloads.
 */
use async_trait::async_trait;
use hf_hub::api::RepoInfo;
use hf_hub::{Repo, RepoType};
use std::path::{Component, Path};
use std::time::Duration;

use super::downloader::write_body;
use super::progress::ProgressObserver;
use super::source::RepoRef;
use super::transport::{HttpTransport, Transport};
use crate::error::FetchError;

/// Public Hugging Face Hub
pub const HUB_ENDPOINT: &str = "https://huggingface.co";

/// Host that receives the Hub token on direct downloads
pub const HUB_HOST: &str = "huggingface.co";

/// Model-repository client
#[async_trait]
pub trait SnapshotClient: Send + Sync {
    /// Place the full snapshot of `repo` under `dest`
    async fn materialize(
        &self,
        repo: &RepoRef,
        dest: &Path,
        observer: &dyn ProgressObserver,
    ) -> Result<(), FetchError>;
}

pub struct HubSnapshotClient {
    endpoint: String,
    transport: HttpTransport,
}

impl HubSnapshotClient {
    /// Client for the Hub at `HF_ENDPOINT`, or the public Hub
    pub fn new(timeout: Duration, token: Option<String>) -> Result<Self, FetchError> {
        let endpoint = std::env::var("HF_ENDPOINT").unwrap_or_else(|_| HUB_ENDPOINT.to_string());
        let transport = HttpTransport::new(timeout)?.with_bearer_token(token);
        Ok(Self {
            endpoint,
            transport,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn hub_repo(repo: &RepoRef) -> Repo {
        match &repo.revision {
            Some(rev) => Repo::with_revision(repo.repo_id.clone(), RepoType::Model, rev.clone()),
            None => Repo::model(repo.repo_id.clone()),
        }
    }

    async fn info(&self, repo: &Repo, locator: &str) -> Result<RepoInfo, FetchError> {
        let url = format!("{}/api/{}", self.endpoint, repo.api_url());
        let mut request = self.transport.client().get(&url);
        if let Some(token) = self.transport.token_for(&url) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::transfer(locator, e))?;
        if !response.status().is_success() {
            return Err(FetchError::transfer(
                locator,
                format!("listing failed: HTTP {}", response.status()),
            ));
        }

        response
            .json::<RepoInfo>()
            .await
            .map_err(|e| FetchError::transfer(locator, format!("invalid listing: {}", e)))
    }

    fn file_url(&self, repo: &Repo, filename: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.endpoint,
            repo.url(),
            repo.url_revision(),
            filename
        )
    }
}

#[async_trait]
impl SnapshotClient for HubSnapshotClient {
    async fn materialize(
        &self,
        repo: &RepoRef,
        dest: &Path,
        observer: &dyn ProgressObserver,
    ) -> Result<(), FetchError> {
        let locator = repo.to_string();
        let hub_repo = Self::hub_repo(repo);
        let info = self.info(&hub_repo, &locator).await?;

        tracing::info!(
            "Snapshot {} at {} has {} files",
            locator,
            info.sha,
            info.siblings.len()
        );

        // Validate the whole listing before anything is written.
        if let Some(bad) = info
            .siblings
            .iter()
            .find(|s| !is_safe_relative(&s.rfilename))
        {
            return Err(FetchError::transfer(
                &locator,
                format!("refusing unsafe file name {:?}", bad.rfilename),
            ));
        }

        for sibling in &info.siblings {
            let relative = sibling.rfilename.as_str();
            let target = dest.join(relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FetchError::Permission {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
            }

            let url = self.file_url(&hub_repo, relative);
            let body = self.transport.open(&url).await?;
            write_body(body, &target, &url, observer).await?;
        }

        Ok(())
    }
}

/// Relative, non-empty, and free of `..` or root components
pub fn is_safe_relative(path: &str) -> bool {
    normalize_relative(path).is_some()
}

/// `path` reduced to its normal components joined by `/`, or `None` when it
/// is empty, absolute, or climbs out with `..`
pub fn normalize_relative(path: &str) -> Option<String> {
    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_safe_relative() {
        assert!(is_safe_relative("model.safetensors"));
        assert!(is_safe_relative("omini/subject_512.safetensors"));
        assert!(is_safe_relative("./a/b.bin"));
        assert!(!is_safe_relative(""));
        assert!(!is_safe_relative("."));
        assert!(!is_safe_relative("../escape.bin"));
        assert!(!is_safe_relative("a/../../b"));
        assert!(!is_safe_relative("/etc/passwd"));
    }

    #[test]
    fn test_normalize_relative() {
        assert_eq!(normalize_relative("./a.bin").as_deref(), Some("a.bin"));
        assert_eq!(normalize_relative("a//b").as_deref(), Some("a/b"));
        assert_eq!(normalize_relative("a/./b/").as_deref(), Some("a/b"));
        assert_eq!(normalize_relative("a/../b"), None);
    }

    #[test]
    fn test_file_url_escapes_revision() {
        let client = HubSnapshotClient::new(Duration::from_secs(5), None)
            .unwrap()
            .with_endpoint("http://hub.local/");
        let repo = HubSnapshotClient::hub_repo(&RepoRef::new("org/flux").with_revision("refs/pr/1"));
        assert_eq!(
            client.file_url(&repo, "transformer/model.safetensors"),
            "http://hub.local/org/flux/resolve/refs%2Fpr%2F1/transformer/model.safetensors"
        );
    }
}
