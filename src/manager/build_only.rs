//! Build-only manager
//!
//! Tracks whether packages still build. Nothing is ever flashed, so a
//! "flash" is a single clean build whose outcome is only logged.

use crate::error::FirmloopResult;
use crate::manager::{BuildRecipe, PackageManager};
use crate::package::naming;
use crate::package::{PackageResolver, Workspace};
use crate::remote::RemoteBuilder;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct BuildOnlyManager {
    resolver: PackageResolver,
    builder: RemoteBuilder,
    recipe: BuildRecipe,
}

impl BuildOnlyManager {
    pub fn new(resolver: PackageResolver, builder: RemoteBuilder, recipe: BuildRecipe) -> Self {
        Self {
            resolver,
            builder,
            recipe,
        }
    }
}

#[async_trait]
impl PackageManager for BuildOnlyManager {
    /// Build `pkg` once from a clean output tree. Build failures are the
    /// signal under test, so only cancellation is reported as an error.
    async fn flash(&self, _device: &str, pkg: &str, cancel: &CancellationToken) -> FirmloopResult<()> {
        info!("Now flash {}", pkg);
        let config = self.recipe.for_package(pkg);
        if self.builder.pkg_available(&config) {
            return Ok(());
        }

        if naming::is_build_fail(pkg) {
            warn!("{} is a known build_fail placeholder", pkg);
        } else {
            match self.builder.build_no_retry(&config, true, cancel).await {
                Ok(()) => info!("{} is available now", pkg),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!("Build {} fail, err: {}", pkg, e),
            }
        }
        info!("Only package builds are tested, marking flash of {} as done", pkg);
        Ok(())
    }

    async fn get_newer(&self, cur: &str, cancel: &CancellationToken) -> FirmloopResult<String> {
        self.resolver.get_newer_or_fail(cur, cancel).await
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
        "build_only"
    }
}
