/**
 * Downloads Module
 *
 * Idempotent artifact fetching into a shared cache directory, driven by a
 * declarative manifest.
 */

mod downloader;
mod manifest;
mod progress;
mod snapshot;
mod source;
mod transport;

pub use downloader::*;
pub use manifest::*;
pub use progress::*;
pub use snapshot::*;
pub use source::*;
pub use transport::*;
