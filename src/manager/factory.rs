//! Package manager factory
//!
//! Wires the configured backend together with its CI source, build farm,
//! devices and workspace retention.

use crate::ci::{CiClient, CiPoller, DailyBuildSource};
use crate::config::schema::{Config, ManagerKind};
use crate::device::{DeviceRegistry, Flasher, HdcLink, LocationCache, ProcessFlashTool};
use crate::error::FirmloopResult;
use crate::manager::{BoardManager, BuildOnlyManager, BuildRecipe, PackageManager};
use crate::package::{
    DailyBuildSteps, NewerSource, PackageResolver, RetentionHandle, RetentionSweeper,
    StepsPlanner, TagHistorySteps, TarGzArchiver, TrackedSource, Workspace,
};
use crate::remote::{BuildServerPool, ManifestSource, RemoteBuilder, SshTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const SECS_PER_DAY: u64 = 24 * 60 * 60;
const SECS_PER_HOUR: u64 = 60 * 60;

/// A manager together with the background work it owns.
///
/// The manager and the retention sweeper share one workspace so the sweeper
/// sees every lease the manager takes.
pub struct ManagerRuntime {
    manager: Arc<dyn PackageManager>,
    sweeper: Option<RetentionSweeper>,
    retention: Option<RetentionHandle>,
}

impl ManagerRuntime {
    /// Create the configured manager and start its retention sweeper
    pub fn start(config: &Config) -> FirmloopResult<Self> {
        let workspace = workspace(config);
        let manager = create_manager_with(config, workspace.clone())?;

        let days = u64::from(config.workspace.retention_days);
        let sweeper = (days > 0).then(|| {
            RetentionSweeper::new(workspace, Duration::from_secs(days * SECS_PER_DAY))
        });
        let retention = sweeper.clone().map(|sweeper| {
            let hours = u64::from(config.workspace.sweep_interval_hours.max(1));
            info!(
                "Pruning packages older than {} days every {} hours",
                days, hours
            );
            sweeper.spawn(Duration::from_secs(hours * SECS_PER_HOUR))
        });

        Ok(Self {
            manager,
            sweeper,
            retention,
        })
    }

    pub fn manager(&self) -> Arc<dyn PackageManager> {
        Arc::clone(&self.manager)
    }

    /// Sweeper run in the background, if retention is enabled
    pub fn sweeper(&self) -> Option<&RetentionSweeper> {
        self.sweeper.as_ref()
    }

    /// Stop background work and wait for it to finish
    pub async fn shutdown(self) {
        if let Some(retention) = self.retention {
            retention.stop().await;
        }
    }
}

fn workspace(config: &Config) -> Workspace {
    Workspace::new(&config.workspace.root, &config.workspace.archive_dir)
}

/// Create the package manager selected by `manager.kind`
pub fn create_manager(config: &Config) -> FirmloopResult<Arc<dyn PackageManager>> {
    create_manager_with(config, workspace(config))
}

/// Create the package manager on an existing workspace
pub fn create_manager_with(
    config: &Config,
    workspace: Workspace,
) -> FirmloopResult<Arc<dyn PackageManager>> {
    config.validate()?;

    let ci: Arc<dyn DailyBuildSource> =
        Arc::new(CiClient::new(&config.ci.daily_builds_url, &config.ci.tags_url));
    let poller = CiPoller::new(ci.clone(), Duration::from_secs(config.ci.poll_interval_secs));

    let source = &config.source;
    let tracked = TrackedSource {
        project_name: config.ci.project_name.clone(),
        branch: source.branch.clone(),
        component: source.component.clone(),
    };
    let steps = StepsPlanner::new(
        &source.component,
        Arc::new(TagHistorySteps::new(
            ci.clone(),
            workspace.clone(),
            &config.ci.project_name,
            &source.branch,
            &source.component,
        )),
        Arc::new(DailyBuildSteps::new(
            ci,
            &config.ci.project_name,
            &source.branch,
            &source.component,
        )),
    );

    // Build-only tracking needs build failures, which only CI reports.
    let newer = match config.manager.kind {
        ManagerKind::Board if !config.ci.watch => NewerSource::Directory {
            interval: Duration::from_secs(config.ci.dir_scan_interval_secs),
        },
        _ => NewerSource::Ci,
    };
    debug!("Newer packages come from {:?}", newer);
    let resolver = PackageResolver::new(
        workspace.clone(),
        Arc::new(TarGzArchiver),
        poller,
        newer,
        tracked,
        steps,
    );

    let builder = RemoteBuilder::new(
        workspace,
        Arc::new(BuildServerPool::new(config.build_servers.clone())),
        Arc::new(SshTransport::new(
            config.ssh.attempts,
            Duration::from_secs(config.ssh.retry_delay_secs),
        )),
        ManifestSource {
            url: source.manifest_url.clone(),
            branch: source.manifest_branch.clone(),
        },
    );

    let manager: Arc<dyn PackageManager> = match config.manager.kind {
        ManagerKind::Board => {
            let board = &config.board;
            let registry = DeviceRegistry::new(config.devices.list.clone());
            let locations = registry.bind_locations(&board.location_ids)?;
            let link = HdcLink::discover(board.hdc.as_deref())?;
            let flasher = Flasher::new(
                Arc::new(ProcessFlashTool::new(&board.flash_tool)),
                Arc::new(link),
                Arc::new(LocationCache::new(locations)),
            );
            let recipe = BuildRecipe {
                pre_compile_cmd: board.pre_compile_cmd.clone(),
                compile_cmd: board.compile_cmd.clone(),
                image_list: board.image_list.clone(),
            };
            Arc::new(BoardManager::new(resolver, builder, flasher, recipe))
        }
        ManagerKind::BuildOnly => {
            let build = &config.build;
            let recipe = BuildRecipe {
                pre_compile_cmd: build.pre_compile_cmd.clone(),
                compile_cmd: build.compile_cmd.clone(),
                image_list: build.image_list.clone(),
            };
            Arc::new(BuildOnlyManager::new(resolver, builder, recipe))
        }
    };

    info!("Using {} package manager", manager.name());
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FirmloopError;
    use filetime::FileTime;
    use std::time::SystemTime;
    use tempfile::TempDir;

    const PKG: &str = "dayu200_20230101_120000";

    fn config(temp: &TempDir, kind: ManagerKind) -> Config {
        let mut config = Config::default();
        config.manager.kind = kind;
        config.workspace.root = temp.path().join("ws");
        config.workspace.archive_dir = temp.path().join("archive");
        config.board.hdc = Some("/opt/hdc/hdc".to_string());
        config.build.pre_compile_cmd = "bash build/prebuilts_download.sh".to_string();
        config.build.compile_cmd = "./build.sh --product-name rk3568".to_string();
        config.build.image_list = vec!["out/rk3568/packages/phone/images/system.img".to_string()];
        config
    }

    #[test]
    fn build_only_backend() {
        let temp = TempDir::new().unwrap();
        let manager = create_manager(&config(&temp, ManagerKind::BuildOnly)).unwrap();
        assert_eq!(manager.name(), "build_only");
        assert_eq!(
            manager.pkg_dir("dayu200_20230101_120000"),
            temp.path().join("ws").join("dayu200_20230101_120000")
        );
    }

    #[test]
    fn board_backend() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp, ManagerKind::Board);
        config.devices.list = vec!["dev-a".to_string(), "dev-b".to_string()];
        config.board.location_ids = vec!["1".to_string(), "2".to_string()];

        let manager = create_manager(&config).unwrap();
        assert_eq!(manager.name(), "board");
    }

    #[test]
    fn location_mismatch_is_fatal() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp, ManagerKind::Board);
        config.devices.list = vec!["dev-a".to_string(), "dev-b".to_string()];
        config.board.location_ids = vec!["1".to_string()];

        assert!(matches!(
            create_manager(&config),
            Err(FirmloopError::ConfigMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn runtime_owns_retention() {
        let temp = TempDir::new().unwrap();
        let runtime = ManagerRuntime::start(&config(&temp, ManagerKind::BuildOnly)).unwrap();
        assert!(runtime.retention.is_some());
        assert_eq!(runtime.manager().name(), "build_only");
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn sweeper_honours_manager_leases() {
        let temp = TempDir::new().unwrap();
        let runtime = ManagerRuntime::start(&config(&temp, ManagerKind::Board)).unwrap();
        let manager = runtime.manager();

        let dir = manager.pkg_dir(PKG);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("system.img"), b"img").unwrap();
        let month_ago = SystemTime::now() - Duration::from_secs(30 * SECS_PER_DAY);
        filetime::set_file_mtime(&dir, FileTime::from_system_time(month_ago)).unwrap();

        let lease = manager.workspace().lease(PKG).await;
        let sweeper = runtime.sweeper().unwrap();
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
        assert!(dir.join("system.img").is_file());

        drop(lease);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
        assert!(!dir.join("system.img").exists());
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn zero_retention_days_disables_sweeper() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp, ManagerKind::BuildOnly);
        config.workspace.retention_days = 0;

        let runtime = ManagerRuntime::start(&config).unwrap();
        assert!(runtime.retention.is_none());
        assert!(runtime.sweeper().is_none());
    }
}
