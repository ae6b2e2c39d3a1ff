// 錯誤類型
pub mod error;
// 統一下載管理模塊
pub mod downloads;
// 緩存路徑管理模塊
pub mod paths;
// 遠端任務入口
pub mod job;

pub use downloads::{ArtifactFetcher, DownloadManifestRunner, SourceLocator};
pub use error::FetchError;
