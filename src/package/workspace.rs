//! On-disk package workspace
//!
//! Layout:
//!
//! ```text
//! <root>/<package>/<image basenames>
//! <root>/<package>/manifest_tag.xml
//! <root>/<package>/__last_issue__
//! <archive_dir>/<package>.tar.gz
//! ```
//!
//! Foreground work on a package holds a [`PackageLease`]. The retention
//! sweeper only prunes a package after claiming a [`SweepMark`], which is
//! refused while leases are alive and makes new leases wait until pruning
//! is done.

use crate::error::{FirmloopError, FirmloopResult};
use crate::package::naming::{self, LAST_ISSUE_FILE, MANIFEST_TAG_FILE};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
struct LeaseTable {
    counts: HashMap<String, usize>,
    sweeping: HashSet<String>,
}

/// Lease bookkeeping shared by every clone of a workspace
#[derive(Debug, Default)]
struct Leases {
    table: Mutex<LeaseTable>,
    swept: Notify,
}

impl Leases {
    fn lock(&self) -> MutexGuard<'_, LeaseTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Local package store shared by resolver, builder, flasher and sweeper.
///
/// Clones share leases; separately constructed workspaces do not.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    archive_dir: PathBuf,
    leases: Arc<Leases>,
}

impl Workspace {
    /// Create a workspace rooted at `root` with archives in `archive_dir`
    pub fn new(root: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            archive_dir: archive_dir.into(),
            leases: Arc::new(Leases::default()),
        }
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archive directory
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Directory of `package`
    pub fn pkg_dir(&self, package: &str) -> PathBuf {
        self.root.join(package)
    }

    /// Archive path of `package`
    pub fn archive_path(&self, package: &str) -> PathBuf {
        self.archive_dir.join(naming::archive_name(package))
    }

    /// Path of the manifest snapshot of `package`
    pub fn manifest_tag(&self, package: &str) -> PathBuf {
        self.pkg_dir(package).join(MANIFEST_TAG_FILE)
    }

    /// True iff every image basename exists as a file directly under the
    /// package directory.
    pub fn pkg_available(&self, package: &str, images: &[String]) -> bool {
        let dir = self.pkg_dir(package);
        images.iter().all(|img| {
            let path = dir.join(naming::image_basename(img));
            let present = path.is_file();
            if !present {
                debug!("{} missing from {}", naming::image_basename(img), package);
            }
            present
        })
    }

    /// Contents of the package's last known issue marker
    pub async fn last_issue(&self, package: &str) -> FirmloopResult<String> {
        let path = self.pkg_dir(package).join(LAST_ISSUE_FILE);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| FirmloopError::io(format!("reading {}", path.display()), e))
    }

    /// Create the package directory if needed
    pub async fn ensure_pkg_dir(&self, package: &str) -> FirmloopResult<PathBuf> {
        let dir = self.pkg_dir(package);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| FirmloopError::io(format!("creating {}", dir.display()), e))?;
        Ok(dir)
    }

    /// Create the archive directory if needed
    pub async fn ensure_archive_dir(&self) -> FirmloopResult<()> {
        tokio::fs::create_dir_all(&self.archive_dir)
            .await
            .map_err(|e| {
                FirmloopError::io(format!("creating {}", self.archive_dir.display()), e)
            })
    }

    /// Mark `package` as in use until the returned lease is dropped.
    ///
    /// Waits while a sweep is pruning the package.
    pub async fn lease(&self, package: &str) -> PackageLease {
        loop {
            let swept = self.leases.swept.notified();
            {
                let mut table = self.leases.lock();
                if !table.sweeping.contains(package) {
                    *table.counts.entry(package.to_string()).or_insert(0) += 1;
                    return PackageLease {
                        package: package.to_string(),
                        leases: Arc::clone(&self.leases),
                    };
                }
            }
            debug!("{} is being swept, waiting", package);
            swept.await;
        }
    }

    /// Whether any lease on `package` is alive
    pub fn is_leased(&self, package: &str) -> bool {
        self.leases
            .lock()
            .counts
            .get(package)
            .is_some_and(|n| *n > 0)
    }

    /// Claim `package` for pruning; `None` while it is leased or already claimed
    pub fn begin_sweep(&self, package: &str) -> Option<SweepMark> {
        let mut table = self.leases.lock();
        if table.counts.get(package).is_some_and(|n| *n > 0) {
            return None;
        }
        if !table.sweeping.insert(package.to_string()) {
            return None;
        }
        Some(SweepMark {
            package: package.to_string(),
            leases: Arc::clone(&self.leases),
        })
    }
}

/// Keeps a package out of retention sweeps while alive
#[derive(Debug)]
pub struct PackageLease {
    package: String,
    leases: Arc<Leases>,
}

impl PackageLease {
    /// Leased package name
    pub fn package(&self) -> &str {
        &self.package
    }
}

impl Drop for PackageLease {
    fn drop(&mut self) {
        let mut table = self.leases.lock();
        if let Some(count) = table.counts.get_mut(&self.package) {
            *count -= 1;
            if *count == 0 {
                table.counts.remove(&self.package);
            }
        }
    }
}

/// Held by the sweeper while it prunes one package
#[derive(Debug)]
pub struct SweepMark {
    package: String,
    leases: Arc<Leases>,
}

impl Drop for SweepMark {
    fn drop(&mut self) {
        self.leases.lock().sweeping.remove(&self.package);
        self.leases.swept.notify_waiters();
    }
}
