/**
 * Source Locators
 *
 * Where an artifact comes from: a direct URL or a model-repository snapshot.
 */
use serde::Serialize;
use std::fmt;

/// Manifest value prefix selecting a repository snapshot
pub const HUB_SCHEME: &str = "hf://";

/// Reference to a model repository, optionally pinned to a revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoRef {
    pub repo_id: String,
    pub revision: Option<String>,
}

impl RepoRef {
    pub fn new(repo_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            revision: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{}{}@{}", HUB_SCHEME, self.repo_id, rev),
            None => write!(f, "{}{}", HUB_SCHEME, self.repo_id),
        }
    }
}

/// Where an artifact is fetched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SourceLocator {
    DirectUrl(String),
    RepositorySnapshot(RepoRef),
}

impl SourceLocator {
    /// Parse a manifest value.
    ///
    /// `hf://org/name[@revision]` selects a repository snapshot;
    /// `http://` and `https://` values are direct downloads.
    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();

        if let Some(rest) = value.strip_prefix(HUB_SCHEME) {
            let (repo_id, revision) = match rest.split_once('@') {
                Some((id, rev)) => (id, Some(rev)),
                None => (rest, None),
            };
            let valid_id = !repo_id.is_empty()
                && !repo_id.starts_with('/')
                && !repo_id.ends_with('/')
                && repo_id.split('/').count() <= 2
                && !repo_id.split('/').any(|part| part.is_empty() || part == "..");
            if !valid_id {
                return Err(format!("invalid repository id in {:?}", value));
            }
            if revision.is_some_and(|rev| rev.is_empty()) {
                return Err(format!("empty revision in {:?}", value));
            }
            let mut repo = RepoRef::new(repo_id);
            if let Some(rev) = revision {
                repo = repo.with_revision(rev);
            }
            return Ok(Self::RepositorySnapshot(repo));
        }

        if value.starts_with("https://") || value.starts_with("http://") {
            return Ok(Self::DirectUrl(value.to_string()));
        }

        Err(format!(
            "unsupported source {:?}: expected http(s):// URL or {}org/name",
            value, HUB_SCHEME
        ))
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectUrl(url) => f.write_str(url),
            Self::RepositorySnapshot(repo) => repo.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direct_url() {
        let source = SourceLocator::parse("https://example.com/flux1-dev.safetensors").unwrap();
        assert_eq!(
            source,
            SourceLocator::DirectUrl("https://example.com/flux1-dev.safetensors".to_string())
        );
    }

    #[test]
    fn test_parse_repository() {
        let source = SourceLocator::parse("hf://Yuanshi/OminiControl").unwrap();
        assert_eq!(
            source,
            SourceLocator::RepositorySnapshot(RepoRef::new("Yuanshi/OminiControl"))
        );
    }

    #[test]
    fn test_parse_repository_with_revision() {
        let source = SourceLocator::parse("hf://black-forest-labs/FLUX.1-schnell@main").unwrap();
        let SourceLocator::RepositorySnapshot(repo) = source else {
            panic!("expected snapshot");
        };
        assert_eq!(repo.repo_id, "black-forest-labs/FLUX.1-schnell");
        assert_eq!(repo.revision.as_deref(), Some("main"));
        assert_eq!(repo.to_string(), "hf://black-forest-labs/FLUX.1-schnell@main");
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(SourceLocator::parse("ftp://example.com/a.bin").is_err());
        assert!(SourceLocator::parse("hf://").is_err());
        assert!(SourceLocator::parse("hf://a/b/c").is_err());
        assert!(SourceLocator::parse("hf://org/../x").is_err());
        assert!(SourceLocator::parse("hf://org/name@").is_err());
    }
}
