//! Flashable board manager

use crate::device::Flasher;
use crate::error::FirmloopResult;
use crate::manager::{BuildRecipe, PackageManager};
use crate::package::{PackageResolver, Workspace};
use crate::remote::RemoteBuilder;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Builds packages that are not yet available, then flashes them
pub struct BoardManager {
    resolver: PackageResolver,
    builder: RemoteBuilder,
    flasher: Flasher,
    recipe: BuildRecipe,
}

impl BoardManager {
    pub fn new(
        resolver: PackageResolver,
        builder: RemoteBuilder,
        flasher: Flasher,
        recipe: BuildRecipe,
    ) -> Self {
        Self {
            resolver,
            builder,
            flasher,
            recipe,
        }
    }
}

#[async_trait]
impl PackageManager for BoardManager {
    async fn flash(&self, device: &str, pkg: &str, cancel: &CancellationToken) -> FirmloopResult<()> {
        info!("Now flash {}", pkg);
        let _lease = self.resolver.workspace().lease(pkg).await;
        let config = self.recipe.for_package(pkg);
        self.builder
            .build(&config, cancel)
            .await
            .inspect_err(|e| error!("Build {} fail, err: {}", pkg, e))?;

        info!("{} is available now, start to flash it", pkg);
        self.flasher.flash(device, &self.pkg_dir(pkg), cancel).await
    }

    async fn get_newer(&self, cur: &str, cancel: &CancellationToken) -> FirmloopResult<String> {
        self.resolver.get_newer(cur, cancel).await
    }

    async fn steps(&self, from: &str, to: &str) -> FirmloopResult<Vec<String>> {
        self.resolver.steps(from, to).await
    }

    fn workspace(&self) -> &Workspace {
        self.resolver.workspace()
    }

    async fn last_issue(&self, pkg: &str) -> FirmloopResult<String> {
        self.resolver.workspace().last_issue(pkg).await
    }

    fn name(&self) -> &'static str {
        "board"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::{FakeLink, FakeTool};
    use crate::error::FirmloopError;
    use crate::manager::testing::Harness;
    use crate::package::naming::LAST_ISSUE_FILE;
    use std::sync::Arc;

    const PKG: &str = "dayu200_20230101_120000";

    fn manager(harness: &Harness, tool: Arc<FakeTool>) -> BoardManager {
        BoardManager::new(
            harness.resolver(),
            harness.builder(),
            harness.flasher(tool, FakeLink::answering(&[])),
            Harness::recipe(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn available_package_is_flashed_without_building() {
        let harness = Harness::new(0);
        harness.stage(PKG);
        let tool = Arc::new(FakeTool::default());

        manager(&harness, tool.clone())
            .flash("dev", PKG, &CancellationToken::new())
            .await
            .unwrap();

        assert!(harness.transport.calls().is_empty());
        assert_eq!(tool.count("UL"), 1);
        assert_eq!(tool.count("-system"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_package_is_built_then_flashed() {
        let harness = Harness::new(0);
        let tool = Arc::new(FakeTool::default());

        manager(&harness, tool.clone())
            .flash("dev", PKG, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(harness.transport.count("once "), 1);
        assert_eq!(tool.count("RD"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn build_failure_skips_flashing() {
        let harness = Harness::new(2);
        let tool = Arc::new(FakeTool::default());

        let err = manager(&harness, tool.clone())
            .flash("dev", PKG, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FirmloopError::Compile { .. }));
        assert!(tool.calls().is_empty());
    }

    #[tokio::test]
    async fn last_issue_reads_marker() {
        let harness = Harness::new(0);
        harness.stage(PKG);
        std::fs::write(harness.pkg_dir(PKG).join(LAST_ISSUE_FILE), "I6AB12").unwrap();
        let manager = manager(&harness, Arc::new(FakeTool::default()));

        assert_eq!(manager.last_issue(PKG).await.unwrap(), "I6AB12");
        assert_eq!(manager.pkg_dir(PKG), harness.pkg_dir(PKG));
    }
}
