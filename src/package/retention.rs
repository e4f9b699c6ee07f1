//! Workspace retention sweeping
//!
//! Package directories untouched for longer than the retention window lose
//! their contents, except the manifest snapshot and the last issue marker.
//! The directory itself stays so provenance survives.

use crate::error::{FirmloopError, FirmloopResult};
use crate::package::naming::{LAST_ISSUE_FILE, MANIFEST_TAG_FILE};
use crate::package::workspace::Workspace;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Entries a sweep never removes
const PRESERVED: [&str; 2] = [MANIFEST_TAG_FILE, LAST_ISSUE_FILE];

/// Prunes outdated package directories
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    workspace: Workspace,
    max_age: Duration,
}

impl RetentionSweeper {
    /// Create a sweeper pruning packages older than `max_age`
    pub fn new(workspace: Workspace, max_age: Duration) -> Self {
        Self { workspace, max_age }
    }

    /// Run one sweep over the workspace, returning the number of pruned packages
    pub async fn sweep_once(&self) -> FirmloopResult<usize> {
        self.sweep_at(SystemTime::now()).await
    }

    async fn sweep_at(&self, now: SystemTime) -> FirmloopResult<usize> {
        let root = self.workspace.root();
        let mut entries = fs::read_dir(root)
            .await
            .map_err(|e| FirmloopError::io(format!("reading {}", root.display()), e))?;

        let mut pruned = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FirmloopError::io(format!("reading {}", root.display()), e))?
        {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    error!("Can not read {} info: {}", path.display(), e);
                    continue;
                }
            };
            if !metadata.is_dir() {
                continue;
            }

            let modified = match metadata.modified() {
                Ok(t) => t,
                Err(e) => {
                    error!("Can not read {} mtime: {}", path.display(), e);
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= self.max_age {
                continue;
            }

            let package = entry.file_name().to_string_lossy().into_owned();
            let Some(_mark) = self.workspace.begin_sweep(&package) else {
                debug!("{} is outdated but in use, skipping", package);
                continue;
            };

            warn!("{} outdated, cleaning up its contents...", path.display());
            prune_package(&path).await;
            pruned += 1;
        }

        Ok(pruned)
    }

    /// Start sweeping every `interval` until the returned handle is stopped
    /// or dropped. The first sweep happens one interval after start.
    pub fn spawn(self, interval: Duration) -> RetentionHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.reset();

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Retention sweeper stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        match self.sweep_once().await {
                            Ok(n) => info!("Retention sweep pruned {} packages", n),
                            Err(e) => error!("Retention sweep failed: {}", e),
                        }
                    }
                }
            }
        });

        RetentionHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Remove every entry of a package directory except the preserved markers
async fn prune_package(path: &Path) {
    let mut entries = match fs::read_dir(path).await {
        Ok(e) => e,
        Err(e) => {
            error!("Can not read {}: {}", path.display(), e);
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                error!("Can not read {}: {}", path.display(), e);
                break;
            }
        };

        let name = entry.file_name();
        if PRESERVED.iter().any(|keep| name == *keep) {
            continue;
        }

        let target = entry.path();
        let removed = match entry.file_type().await {
            Ok(t) if t.is_dir() => fs::remove_dir_all(&target).await,
            _ => fs::remove_file(&target).await,
        };
        if let Err(e) = removed {
            error!("Remove {} fail: {}", target.display(), e);
        }
    }
}

/// Owns the background sweep task; stops it when dropped
#[derive(Debug)]
pub struct RetentionHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RetentionHandle {
    /// Stop the sweeper and wait for an in-flight sweep to finish
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Retention sweeper panicked: {}", e);
                }
            }
        }
    }
}

impl Drop for RetentionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
