/**
 * Error Types
 *
 * Failure taxonomy shared by the fetcher, the manifest runner and the
 * snapshot client.
 */
use std::path::PathBuf;

/// Errors produced while materializing artifacts into the cache
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network failure, non-success response, stream/write failure, or a
    /// failure reported by the model-repository client
    #[error("transfer failed for {locator}: {reason}")]
    Transfer { locator: String, reason: String },

    /// Manifest missing, unreadable or malformed
    #[error("manifest error in {path:?}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    /// Destination directory cannot be created
    #[error("cannot create directory {path:?}: {source}")]
    Permission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A manifest entry failed; remaining entries were not attempted
    #[error("entry #{index} ({relative_path}) failed: {source}")]
    Entry {
        index: usize,
        relative_path: String,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    pub fn transfer(locator: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Transfer {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    pub fn manifest(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Manifest {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
