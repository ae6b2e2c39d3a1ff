/**
 * Cache Directories
 *
 * The persistent cache volume is described explicitly and passed into the
 * job entry point instead of living in process-wide state.
 *
 * When no base directory is configured, artifacts go under the platform
 * cache directory:
 * - macOS: ~/Library/Caches/artifact-fetch/
 * - Windows: %LOCALAPPDATA%/artifact-fetch/
 * - Linux: ~/.cache/artifact-fetch/
 */
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name under the platform cache directory
pub const CACHE_DIR_NAME: &str = "artifact-fetch";

/// Name used for the cache volume when none is configured
pub const DEFAULT_VOLUME_NAME: &str = "downloads-cache";

/// A persistent volume mounted into the job's container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeHandle {
    pub name: String,
    pub mount_point: PathBuf,
}

/// Where cached artifacts live for one job invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Manifest paths are resolved against this directory
    pub base_dir: PathBuf,
    pub volume: VolumeHandle,
}

impl CacheConfig {
    /// Cache rooted at `base_dir`, treated as the volume's mount point
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            volume: VolumeHandle {
                name: DEFAULT_VOLUME_NAME.to_string(),
                mount_point: base_dir.clone(),
            },
            base_dir,
        }
    }

    pub fn with_volume(mut self, volume: VolumeHandle) -> Self {
        self.volume = volume;
        self
    }

    /// Absolute location of a cache-relative path
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.base_dir.join(relative)
    }

    /// Warn when the base directory is outside the mounted volume, since
    /// anything written there is lost with the container.
    pub fn check_on_volume(&self) -> bool {
        let on_volume = self.base_dir.starts_with(&self.volume.mount_point);
        if !on_volume {
            tracing::warn!(
                "Cache base {:?} is not on volume {} (mounted at {:?}); downloads will not persist",
                self.base_dir,
                self.volume.name,
                self.volume.mount_point
            );
        }
        on_volume
    }
}

/// Platform cache directory for artifacts
pub fn default_base_dir() -> Result<PathBuf, String> {
    dirs::cache_dir()
        .map(|dir| dir.join(CACHE_DIR_NAME))
        .ok_or_else(|| "Cannot determine the platform cache directory".to_string())
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir_exists(path: &Path) -> Result<(), String> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .map_err(|e| format!("Cannot create directory {:?}: {}", path, e))?;
    }
    Ok(())
}

/// Calculate directory size recursively
pub fn dir_size(path: &Path) -> u64 {
    if !path.exists() {
        return 0;
    }

    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}
