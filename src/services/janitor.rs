use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::watch;
use tokio::time::sleep;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

/// Periodically deletes local files older than the retention window.
/// Metadata rows and remote objects are left alone.
pub struct Janitor {
    storage_dir: PathBuf,
    retention: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Janitor {
    pub fn new(
        storage_dir: PathBuf,
        retention: Duration,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            storage_dir,
            retention,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Janitor started (dir: {:?}, retention: {}s, every {}s)",
            self.storage_dir,
            self.retention.as_secs(),
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Janitor shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.sweep().await;
                }
            }
        }
    }

    pub async fn sweep(&self) -> SweepReport {
        let cutoff = SystemTime::now()
            .checked_sub(self.retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        tracing::info!("🧹 Sweeping {:?}...", self.storage_dir);

        match sweep_older_than(&self.storage_dir, cutoff).await {
            Ok(report) => {
                tracing::info!(
                    "✅ Sweep completed: {} files removed, {} failed",
                    report.removed,
                    report.failed
                );
                report
            }
            Err(e) => {
                tracing::error!("❌ Sweep of {:?} failed: {}", self.storage_dir, e);
                SweepReport::default()
            }
        }
    }
}

/// Delete every regular file under `dir` last modified before `cutoff`.
///
/// Only failing to read `dir` itself is an error; per-entry failures are
/// logged and counted.
pub async fn sweep_older_than(dir: &Path, cutoff: SystemTime) -> std::io::Result<SweepReport> {
    let mut report = SweepReport::default();
    let mut pending = vec![dir.to_path_buf()];
    let mut root = true;

    while let Some(current) = pending.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if root => return Err(e),
            Err(e) => {
                tracing::warn!("Failed to read {:?}: {}", current, e);
                report.failed += 1;
                continue;
            }
        };
        root = false;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to list {:?}: {}", current, e);
                    report.failed += 1;
                    break;
                }
            };

            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Failed to stat {:?}: {}", path, e);
                    report.failed += 1;
                    continue;
                }
            };

            if metadata.is_dir() {
                pending.push(path);
                continue;
            }
            if !metadata.is_file() {
                continue;
            }

            let expired = match metadata.modified() {
                Ok(mtime) => mtime < cutoff,
                Err(e) => {
                    tracing::warn!("No modification time for {:?}: {}", path, e);
                    report.failed += 1;
                    continue;
                }
            };

            if expired {
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        tracing::debug!("Removed {:?}", path);
                        report.removed += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to remove {:?}: {}", path, e);
                        report.failed += 1;
                    }
                }
            }
        }
    }

    Ok(report)
}
