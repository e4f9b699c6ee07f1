//! Version-to-version step planning
//!
//! Steps between two packages are the packages strictly between them in
//! time. The manifest tag history gives the finest granularity and each step
//! is materialized as a buildable package (its `manifest_tag.xml`). When the
//! history is unavailable the successful daily builds in the window are used
//! instead. Only tag history results are cached.

use crate::ci::client::{DailyBuildSource, DailyBuildsQuery, TagQuery};
use crate::error::{FirmloopError, FirmloopResult};
use crate::package::naming;
use crate::package::workspace::Workspace;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Page size used for window queries
pub(crate) const WINDOW_PAGE_SIZE: u32 = 1000;

/// A strategy for listing the packages between two versions
#[async_trait]
pub trait StepsSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Ordered packages strictly between `from` and `to`
    async fn steps(&self, from: &str, to: &str) -> FirmloopResult<Vec<String>>;
}

/// Parse the time window spanned by two package names
fn window(from: &str, to: &str) -> FirmloopResult<(NaiveDateTime, NaiveDateTime)> {
    let start = naming::parse_time(from)
        .ok_or_else(|| FirmloopError::Resolution(format!("can not get package time from {}", from)))?;
    let end = naming::parse_time(to)
        .ok_or_else(|| FirmloopError::Resolution(format!("can not get package time from {}", to)))?;
    if start >= end {
        return Err(FirmloopError::Resolution(format!(
            "{} is not older than {}",
            from, to
        )));
    }
    Ok((start, end))
}

/// Steps from the manifest tag history
pub struct TagHistorySteps {
    source: Arc<dyn DailyBuildSource>,
    workspace: Workspace,
    project_name: String,
    branch: String,
    component: String,
}

impl TagHistorySteps {
    pub fn new(
        source: Arc<dyn DailyBuildSource>,
        workspace: Workspace,
        project_name: impl Into<String>,
        branch: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            source,
            workspace,
            project_name: project_name.into(),
            branch: branch.into(),
            component: component.into(),
        }
    }

    /// Write the snapshot of `package` unless it is already there
    async fn materialize(&self, package: &str, tag_file_url: &str) -> FirmloopResult<()> {
        let path = self.workspace.manifest_tag(package);
        if path.is_file() {
            debug!("{} already holds a manifest snapshot", package);
            return Ok(());
        }

        let data = self.source.fetch(tag_file_url).await?;
        self.workspace.ensure_pkg_dir(package).await?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| FirmloopError::io(format!("writing {}", path.display()), e))
    }
}

#[async_trait]
impl StepsSource for TagHistorySteps {
    fn name(&self) -> &'static str {
        "manifest tag history"
    }

    async fn steps(&self, from: &str, to: &str) -> FirmloopResult<Vec<String>> {
        let (start, end) = window(from, to)?;
        let query = TagQuery {
            project_name: self.project_name.clone(),
            branch: self.branch.clone(),
            start_time: naming::format_time(&start),
            end_time: naming::format_time(&end),
            page_num: 1,
            page_size: WINDOW_PAGE_SIZE,
        };

        let mut snapshots: Vec<_> = self
            .source
            .tags(&query)
            .await?
            .into_iter()
            .filter_map(|tag| {
                let time = naming::parse_time(&tag.timestamp)?;
                (start < time && time < end).then_some((time, tag))
            })
            .collect();
        snapshots.sort_by_key(|(time, _)| *time);
        snapshots.dedup_by_key(|(time, _)| *time);

        let mut packages = Vec::with_capacity(snapshots.len());
        for (time, tag) in snapshots {
            let package = naming::snapshot_package_name(&self.component, &time);
            self.materialize(&package, &tag.tag_file_url).await?;
            packages.push(package);
        }
        Ok(packages)
    }
}

/// Steps from successful daily builds
pub struct DailyBuildSteps {
    source: Arc<dyn DailyBuildSource>,
    project_name: String,
    branch: String,
    component: String,
}

impl DailyBuildSteps {
    pub fn new(
        source: Arc<dyn DailyBuildSource>,
        project_name: impl Into<String>,
        branch: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            source,
            project_name: project_name.into(),
            branch: branch.into(),
            component: component.into(),
        }
    }
}

#[async_trait]
impl StepsSource for DailyBuildSteps {
    fn name(&self) -> &'static str {
        "daily builds"
    }

    async fn steps(&self, from: &str, to: &str) -> FirmloopResult<Vec<String>> {
        let (start, end) = window(from, to)?;
        let query = DailyBuildsQuery {
            project_name: self.project_name.clone(),
            branch: self.branch.clone(),
            component: self.component.clone(),
            build_status: "success".to_string(),
            start_time: naming::format_time(&start),
            end_time: naming::format_time(&end),
            page_num: 1,
            page_size: WINDOW_PAGE_SIZE,
        };

        let mut builds: Vec<(NaiveDateTime, String)> = self
            .source
            .daily_builds(&query)
            .await?
            .into_iter()
            .filter(|b| b.is_terminal() && b.build_fail_reason.is_empty())
            .filter_map(|b| {
                let time = naming::parse_time(&b.build_start_time)?;
                let package = naming::package_name(naming::basename(b.artifact())).to_string();
                let inside = start < time && time < end;
                (inside && !package.is_empty() && package != from && package != to)
                    .then_some((time, package))
            })
            .collect();
        builds.sort();
        builds.dedup_by(|a, b| a.1 == b.1);

        Ok(builds.into_iter().map(|(_, package)| package).collect())
    }
}

type StepsKey = (String, String, String);

/// Cached step planning with a fallback strategy
pub struct StepsPlanner {
    component: String,
    primary: Arc<dyn StepsSource>,
    fallback: Arc<dyn StepsSource>,
    cache: Mutex<HashMap<StepsKey, Vec<String>>>,
}

impl StepsPlanner {
    pub fn new(
        component: impl Into<String>,
        primary: Arc<dyn StepsSource>,
        fallback: Arc<dyn StepsSource>,
    ) -> Self {
        Self {
            component: component.into(),
            primary,
            fallback,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn key(&self, from: &str, to: &str) -> StepsKey {
        (self.component.clone(), from.to_string(), to.to_string())
    }

    /// Cached steps between `from` and `to`, if any
    pub fn cached(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(&self.key(from, to)).cloned()
    }

    /// Ordered packages strictly between `from` and `to`
    pub async fn steps(&self, from: &str, to: &str) -> FirmloopResult<Vec<String>> {
        if from == to {
            return Err(FirmloopError::Resolution(format!(
                "'from' {} and 'to' {} are the same",
                from, to
            )));
        }

        if let Some(hit) = self.cached(from, to) {
            info!("Steps from {} to {} are cached: {:?}", from, to, hit);
            return Ok(hit);
        }

        match self.primary.steps(from, to).await {
            Ok(packages) => {
                info!("Steps from {} to {}: {:?}", from, to, packages);
                let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                cache.insert(self.key(from, to), packages.clone());
                Ok(packages)
            }
            Err(e) => {
                error!("Failed to gen steps from {}: {}", self.primary.name(), e);
                warn!("Fallback to getting steps from {}...", self.fallback.name());
                self.fallback.steps(from, to).await
            }
        }
    }
}
