//! Package managers
//!
//! A manager owns the workspace of one source tree and knows how to turn a
//! package name into something running on a device:
//! - `board`: build the package when missing, then flash it
//! - `build_only`: only prove that packages build

mod board;
mod build_only;
mod factory;

#[cfg(test)]
mod testing;

pub use board::BoardManager;
pub use build_only::BuildOnlyManager;
pub use factory::{create_manager, create_manager_with, ManagerRuntime};

use crate::error::FirmloopResult;
use crate::package::Workspace;
use crate::remote::BuildConfig;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Commands and images shared by every package a manager builds
#[derive(Debug, Clone, Default)]
pub struct BuildRecipe {
    pub pre_compile_cmd: String,
    pub compile_cmd: String,
    pub image_list: Vec<String>,
}

impl BuildRecipe {
    /// Build request for `pkg`
    pub fn for_package(&self, pkg: &str) -> BuildConfig {
        BuildConfig {
            pkg: pkg.to_string(),
            pre_compile_cmd: self.pre_compile_cmd.clone(),
            compile_cmd: self.compile_cmd.clone(),
            image_list: self.image_list.clone(),
        }
    }
}

/// Package manager interface consumed by the flash+test flow
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Put `pkg` onto `device`
    async fn flash(&self, device: &str, pkg: &str, cancel: &CancellationToken)
        -> FirmloopResult<()>;

    /// Wait for a package other than `cur` and return its name
    async fn get_newer(&self, cur: &str, cancel: &CancellationToken) -> FirmloopResult<String>;

    /// Packages strictly between `from` and `to`, oldest first
    async fn steps(&self, from: &str, to: &str) -> FirmloopResult<Vec<String>>;

    /// Workspace holding this manager's packages and leases
    fn workspace(&self) -> &Workspace;

    /// Local directory of `pkg`
    fn pkg_dir(&self, pkg: &str) -> PathBuf {
        self.workspace().pkg_dir(pkg)
    }

    /// Last issue recorded for `pkg`
    async fn last_issue(&self, pkg: &str) -> FirmloopResult<String>;

    /// Backend name for display
    fn name(&self) -> &'static str;
}
