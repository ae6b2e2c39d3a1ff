/**
 * Download Manifest
 *
 * A manifest is a flat JSON object mapping paths (relative to a base
 * directory) to sources:
 *
 * ```json
 * {
 *   "models/flux1-dev.safetensors": "https://example.com/flux1-dev.safetensors",
 *   "models/OminiControl": "hf://Yuanshi/OminiControl"
 * }
 * ```
 *
 * Entries are fetched one at a time in the order they appear. The first
 * failure aborts the run. Paths are normalized (`./a.bin` is `a.bin`), must
 * be unique after normalization, and may not name a staging path.
 */
use serde::de::{self, Deserializer, Error as _, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use super::downloader::{ArtifactFetcher, FetchOutcome, STAGING_SUFFIX};
use super::snapshot::normalize_relative;
use super::source::SourceLocator;
use crate::error::FetchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub relative_path: String,
    pub source: SourceLocator,
}

/// Ordered, duplicate-free list of entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read and parse a manifest file
    pub fn load(path: &Path) -> Result<Self, FetchError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FetchError::manifest(path, format!("cannot read: {}", e)))?;
        Self::parse(&content).map_err(|reason| FetchError::manifest(path, reason))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ManifestVisitor;

        impl<'de> Visitor<'de> for ManifestVisitor {
            type Value = Manifest;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping relative paths to source URLs")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Manifest, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut seen = HashSet::new();
                let mut entries = Vec::new();

                while let Some((raw, value)) = map.next_entry::<String, String>()? {
                    let key = normalize_relative(&raw).ok_or_else(|| {
                        A::Error::custom(format!(
                            "path {:?} must be relative and stay inside the base directory",
                            raw
                        ))
                    })?;
                    if key.split('/').any(|part| part.ends_with(STAGING_SUFFIX)) {
                        return Err(de::Error::custom(format!(
                            "path {:?} ends in {:?}, which is reserved for staged downloads",
                            raw, STAGING_SUFFIX
                        )));
                    }
                    if !seen.insert(key.clone()) {
                        return Err(de::Error::custom(format!(
                            "duplicate path {:?} (same destination as an earlier entry)",
                            raw
                        )));
                    }
                    let source = SourceLocator::parse(&value).map_err(A::Error::custom)?;
                    entries.push(ManifestEntry {
                        relative_path: key,
                        source,
                    });
                }

                Ok(Manifest { entries })
            }
        }

        deserializer.deserialize_map(ManifestVisitor)
    }
}

/// Result of one entry in a completed run
#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub relative_path: String,
    pub dest: PathBuf,
    pub outcome: FetchOutcome,
}

/// Per-entry outcomes of a completed run, in manifest order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub entries: Vec<EntryReport>,
}

impl RunReport {
    pub fn fetched(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == FetchOutcome::Fetched)
            .count()
    }

    pub fn cached(&self) -> usize {
        self.entries.len() - self.fetched()
    }
}

/// Applies an [`ArtifactFetcher`] to every entry of a manifest
pub struct DownloadManifestRunner<'a> {
    fetcher: &'a ArtifactFetcher,
}

impl<'a> DownloadManifestRunner<'a> {
    pub fn new(fetcher: &'a ArtifactFetcher) -> Self {
        Self { fetcher }
    }

    /// Load `manifest_path` and fetch every entry under `base_dir`
    pub async fn run(&self, manifest_path: &Path, base_dir: &Path) -> Result<RunReport, FetchError> {
        let manifest = Manifest::load(manifest_path)?;
        tracing::info!(
            "Loaded {} manifest entries from {:?}",
            manifest.len(),
            manifest_path
        );
        self.run_manifest(&manifest, base_dir).await
    }

    pub async fn run_manifest(
        &self,
        manifest: &Manifest,
        base_dir: &Path,
    ) -> Result<RunReport, FetchError> {
        let mut report = RunReport::default();

        for (i, entry) in manifest.entries().iter().enumerate() {
            let dest = base_dir.join(&entry.relative_path);
            tracing::info!("Downloading {} to {:?}", entry.source, dest);

            let outcome = self
                .fetcher
                .ensure(&entry.source, &dest)
                .await
                .map_err(|e| {
                    tracing::error!("Entry #{} ({}) failed: {}", i + 1, entry.relative_path, e);
                    FetchError::Entry {
                        index: i + 1,
                        relative_path: entry.relative_path.clone(),
                        source: Box::new(e),
                    }
                })?;

            report.entries.push(EntryReport {
                relative_path: entry.relative_path.clone(),
                dest,
                outcome,
            });
        }

        tracing::info!(
            "Manifest complete: {} fetched, {} already cached",
            report.fetched(),
            report.cached()
        );
        Ok(report)
    }
}
