//! Next-package resolution
//!
//! A newer package comes either from the CI daily builds or from the newest
//! archive dropped into the archive directory. Either way it ends up
//! extracted under the workspace, once.

use crate::ci::client::{DailyBuild, DailyBuildsQuery, TagQuery, COMPILE_FAILED};
use crate::ci::poller::CiPoller;
use crate::error::{FirmloopError, FirmloopResult};
use crate::exec::check_cancelled;
use crate::package::archive::Archiver;
use crate::package::naming;
use crate::package::steps::{StepsPlanner, WINDOW_PAGE_SIZE};
use crate::package::workspace::Workspace;
use chrono::NaiveDateTime;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Where newer packages are looked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewerSource {
    /// Poll the CI daily builds
    Ci,
    /// Scan the archive directory every `interval`
    Directory { interval: Duration },
}

/// Identity of the tracked source tree
#[derive(Debug, Clone)]
pub struct TrackedSource {
    pub project_name: String,
    pub branch: String,
    pub component: String,
}

/// Resolves, fetches and extracts packages
pub struct PackageResolver {
    workspace: Workspace,
    archiver: Arc<dyn Archiver>,
    poller: CiPoller,
    source: NewerSource,
    tracked: TrackedSource,
    steps: StepsPlanner,
}

impl PackageResolver {
    pub fn new(
        workspace: Workspace,
        archiver: Arc<dyn Archiver>,
        poller: CiPoller,
        source: NewerSource,
        tracked: TrackedSource,
        steps: StepsPlanner,
    ) -> Self {
        Self {
            workspace,
            archiver,
            poller,
            source,
            tracked,
            steps,
        }
    }

    /// Workspace the resolver extracts into
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Wait for a package other than `cur` and make sure it is extracted
    pub async fn get_newer(&self, cur: &str, cancel: &CancellationToken) -> FirmloopResult<String> {
        let cur_archive = naming::archive_name(cur);
        let file = match self.source {
            NewerSource::Ci => self.newer_from_ci(&cur_archive, cancel).await?,
            NewerSource::Directory { interval } => {
                self.newer_from_dir(&cur_archive, interval, cancel).await?
            }
        };
        self.unpack(&file).await
    }

    /// Like [`get_newer`](Self::get_newer), but a failed CI build yields a
    /// placeholder package holding the manifest snapshot it was built from
    pub async fn get_newer_or_fail(
        &self,
        cur: &str,
        cancel: &CancellationToken,
    ) -> FirmloopResult<String> {
        let cur_archive = naming::archive_name(cur);
        let query = self.daily_builds_query("");
        let file = self
            .poller
            .poll_until(&query, cancel, |record| {
                self.newer_daily_build_or_fail(&cur_archive, record)
            })
            .await?;
        self.unpack(&file).await
    }

    /// Ordered packages strictly between `from` and `to`
    pub async fn steps(&self, from: &str, to: &str) -> FirmloopResult<Vec<String>> {
        self.steps.steps(from, to).await
    }

    fn daily_builds_query(&self, build_status: &str) -> DailyBuildsQuery {
        DailyBuildsQuery {
            project_name: self.tracked.project_name.clone(),
            branch: self.tracked.branch.clone(),
            component: self.tracked.component.clone(),
            build_status: build_status.to_string(),
            page_num: 1,
            page_size: 1,
            ..Default::default()
        }
    }

    async fn newer_from_ci(
        &self,
        cur_archive: &str,
        cancel: &CancellationToken,
    ) -> FirmloopResult<String> {
        let query = self.daily_builds_query("success");
        self.poller
            .poll_until(&query, cancel, |record| {
                self.newer_daily_build(cur_archive, record)
            })
            .await
    }

    /// Download the record's artifact if it differs from `cur_archive`
    async fn newer_daily_build(&self, cur_archive: &str, record: DailyBuild) -> Option<String> {
        let url = record.artifact();
        let file = naming::basename(url);
        if file.is_empty() || file == cur_archive {
            return None;
        }
        info!("New package found, name: {}", file);

        if naming::parse_time(file).is_none() {
            warn!("Can not get package time from {}", file);
        }

        let dest = self.workspace.archive_dir().join(file);
        if dest.is_file() {
            info!("{} already downloaded", file);
            return Some(file.to_string());
        }
        match self.poller.source().download(url, &dest).await {
            Ok(()) => Some(file.to_string()),
            Err(e) => {
                error!("Can not download package {}: {}", url, e);
                None
            }
        }
    }

    async fn newer_daily_build_or_fail(
        &self,
        cur_archive: &str,
        record: DailyBuild,
    ) -> Option<String> {
        match record.build_fail_reason.as_str() {
            "" => self.newer_daily_build(cur_archive, record).await,
            COMPILE_FAILED => {
                let Some(last_success) = naming::parse_time(cur_archive) else {
                    error!("Can not get package time from {}, skipping", cur_archive);
                    return None;
                };
                let Some(fail_time) = naming::parse_time(&record.build_start_time) else {
                    error!(
                        "Can not get time from {}, skipping",
                        record.build_start_time
                    );
                    return None;
                };
                if last_success == fail_time {
                    return None;
                }
                match self.gen_failed_package(last_success, fail_time).await {
                    Ok(file) => Some(file),
                    Err(e) => {
                        error!("Can not generate failed package: {}", e);
                        None
                    }
                }
            }
            other => {
                warn!("Ignoring build {} failed with '{}'", record.id, other);
                None
            }
        }
    }

    /// Build the placeholder archive for a build that failed at `fail_time`
    async fn gen_failed_package(
        &self,
        last_success: NaiveDateTime,
        fail_time: NaiveDateTime,
    ) -> FirmloopResult<String> {
        let package = naming::failed_package_name(&self.tracked.component, &fail_time);
        let _lease = self.workspace.lease(&package).await;
        info!(
            "Getting failed package manifest for {}({}) at {}",
            self.tracked.component, self.tracked.branch, fail_time
        );

        let query = TagQuery {
            project_name: self.tracked.project_name.clone(),
            branch: self.tracked.branch.clone(),
            start_time: naming::format_time(&last_success),
            end_time: naming::format_time(&fail_time),
            page_num: 1,
            page_size: WINDOW_PAGE_SIZE,
        };
        let mut tags: Vec<_> = self
            .poller
            .source()
            .tags(&query)
            .await?
            .into_iter()
            .filter_map(|tag| {
                let time = naming::parse_time(&tag.timestamp)?;
                (last_success < time && time <= fail_time).then_some((time, tag))
            })
            .collect();
        tags.sort_by_key(|(time, _)| *time);
        let (_, latest) = tags.pop().ok_or_else(|| {
            FirmloopError::Resolution(format!(
                "no manifest tag between {} and {}",
                last_success, fail_time
            ))
        })?;

        let data = self.poller.source().fetch(&latest.tag_file_url).await?;
        let dir = self.workspace.ensure_pkg_dir(&package).await?;
        let manifest = self.workspace.manifest_tag(&package);
        tokio::fs::write(&manifest, data)
            .await
            .map_err(|e| FirmloopError::io(format!("writing {}", manifest.display()), e))?;

        self.workspace.ensure_archive_dir().await?;
        let archive = self.workspace.archive_path(&package);
        let archiver = Arc::clone(&self.archiver);
        tokio::task::spawn_blocking(move || archiver.compress(&dir, &archive))
            .await
            .map_err(|e| FirmloopError::Internal(format!("compress task failed: {}", e)))??;

        Ok(naming::archive_name(&package))
    }

    async fn newer_from_dir(
        &self,
        cur_archive: &str,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> FirmloopResult<String> {
        loop {
            check_cancelled(cancel)?;
            match self.latest_archive().await {
                Ok(Some(latest)) if latest != cur_archive => {
                    info!("New package found, name: {}", latest);
                    return Ok(latest);
                }
                Ok(_) => {}
                Err(e) => error!(
                    "Read dir {} err: {}",
                    self.workspace.archive_dir().display(),
                    e
                ),
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Newest archive file by embedded timestamp; untimed names sort oldest
    async fn latest_archive(&self) -> FirmloopResult<Option<String>> {
        let dir = self.workspace.archive_dir();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| FirmloopError::io(format!("reading {}", dir.display()), e))?;

        let mut latest: Option<(Option<NaiveDateTime>, String)> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FirmloopError::io(format!("reading {}", dir.display()), e))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_file || name.ends_with(".part") {
                continue;
            }
            let candidate = (naming::parse_time(&name), name);
            if latest.as_ref().is_none_or(|best| candidate > *best) {
                latest = Some(candidate);
            }
        }
        Ok(latest.map(|(_, name)| name))
    }

    /// Extract `file` from the archive directory unless already extracted
    async fn unpack(&self, file: &str) -> FirmloopResult<String> {
        let package = naming::package_name(file).to_string();
        let _lease = self.workspace.lease(&package).await;
        let dir = self.workspace.pkg_dir(&package);
        if dir.exists() {
            return Ok(package);
        }

        let archive = self.workspace.archive_dir().join(file);
        info!("Extracting {} to {}...", archive.display(), dir.display());
        let archiver = Arc::clone(&self.archiver);
        let dest = dir.clone();
        let extracted = tokio::task::spawn_blocking(move || archiver.extract(&archive, &dest))
            .await
            .map_err(|e| FirmloopError::Internal(format!("extract task failed: {}", e)))?;

        if let Err(e) = extracted {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!("Can not remove partial {}: {}", dir.display(), cleanup);
                }
            }
            return Err(e);
        }
        Ok(package)
    }
}
