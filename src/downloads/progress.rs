/**
 * Progress Reporting
 *
 * In-memory transfer progress and the observer interface the fetcher
 * notifies. Nothing here is persisted or influences control flow.
 */
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Progress of a single transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferProgress {
    /// Bytes written so far
    pub downloaded: u64,
    /// Declared size, if the server sent one
    pub total: Option<u64>,
    #[serde(skip)]
    started: Instant,
}

impl TransferProgress {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            downloaded: 0,
            total,
            started: Instant::now(),
        }
    }

    pub(crate) fn advance(&mut self, bytes: u64) {
        self.downloaded += bytes;
    }

    /// Percentage (0-100), or `None` when the total is unknown
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some((self.downloaded as f64 / total as f64) * 100.0),
        }
    }

    /// Average speed since the transfer started, in bytes per second
    pub fn speed_bps(&self) -> u64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.downloaded as f64 / elapsed) as u64
        } else {
            0
        }
    }

    /// Estimated seconds remaining
    pub fn eta_seconds(&self) -> Option<u64> {
        let total = self.total?;
        let speed = self.speed_bps();
        if speed > 0 && total > self.downloaded {
            Some((total - self.downloaded) / speed)
        } else {
            None
        }
    }
}

/// Receives transfer progress notifications
pub trait ProgressObserver: Send + Sync {
    fn on_start(&self, _dest: &Path, _total: Option<u64>) {}

    fn on_progress(&self, progress: &TransferProgress);

    fn on_finish(&self, _dest: &Path, _progress: &TransferProgress) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(&TransferProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &TransferProgress) {
        self(progress)
    }
}

/// Discards all notifications
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _progress: &TransferProgress) {}
}

/// Logs progress through `tracing`, at most once per interval
pub struct LogProgress {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl LogProgress {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl ProgressObserver for LogProgress {
    fn on_start(&self, dest: &Path, total: Option<u64>) {
        match total {
            Some(total) => tracing::info!(
                "Downloading {:?} ({:.2} MB)",
                dest,
                total as f64 / 1_000_000.0
            ),
            None => tracing::info!("Downloading {:?} (size unknown)", dest),
        }
        if let Ok(mut last) = self.last.lock() {
            *last = Some(Instant::now());
        }
    }

    fn on_progress(&self, progress: &TransferProgress) {
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        let now = Instant::now();
        if matches!(*last, Some(t) if now.duration_since(t) < self.interval) {
            return;
        }
        *last = Some(now);

        let mb = progress.downloaded as f64 / 1_000_000.0;
        let speed = progress.speed_bps() as f64 / 1_000_000.0;
        match progress.percent() {
            Some(percent) => tracing::info!(
                "  {:.1}% ({:.2} MB, {:.2} MB/s, eta {}s)",
                percent,
                mb,
                speed,
                progress.eta_seconds().unwrap_or(0)
            ),
            None => tracing::info!("  {:.2} MB ({:.2} MB/s)", mb, speed),
        }
    }

    fn on_finish(&self, dest: &Path, progress: &TransferProgress) {
        tracing::info!(
            "Download complete: {:?} ({} bytes)",
            dest,
            progress.downloaded
        );
    }
}
