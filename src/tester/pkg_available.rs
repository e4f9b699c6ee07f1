//! Package presence check
//!
//! Passes when the prepared package directory holds at least one image.

use crate::error::FirmloopResult;
use crate::tester::{ResultStatus, TestResult, Tester};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const TASK: &str = "pkg_available";
const IMAGE_SUFFIX: &str = ".img";

#[derive(Debug, Default)]
pub struct PkgAvailableTester {
    pkg_dirs: Mutex<HashMap<String, PathBuf>>,
}

impl PkgAvailableTester {
    pub fn new() -> Self {
        Self::default()
    }

    fn pkg_dir(&self, device: &str) -> Option<PathBuf> {
        let dirs = self.pkg_dirs.lock().unwrap_or_else(|e| e.into_inner());
        dirs.get(device).cloned()
    }
}

async fn holds_image(dir: &Path) -> std::io::Result<bool> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().ends_with(IMAGE_SUFFIX) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[async_trait]
impl Tester for PkgAvailableTester {
    fn task_name(&self) -> &'static str {
        TASK
    }

    async fn prepare(&self, pkg_dir: &Path, device: &str, _: &CancellationToken) -> FirmloopResult<()> {
        let mut dirs = self.pkg_dirs.lock().unwrap_or_else(|e| e.into_inner());
        dirs.insert(device.to_string(), pkg_dir.to_path_buf());
        Ok(())
    }

    async fn do_test_task(&self, device: &str, cancel: &CancellationToken) -> FirmloopResult<Vec<TestResult>> {
        self.do_test_cases(device, &[TASK.to_string()], cancel).await
    }

    async fn do_test_case(&self, device: &str, case: &str, _: &CancellationToken) -> FirmloopResult<TestResult> {
        let Some(dir) = self.pkg_dir(device) else {
            error!("No package prepared for device {}, testcase failed", device);
            return Ok(TestResult::new(case, ResultStatus::Fail));
        };

        let status = match holds_image(&dir).await {
            Ok(true) => {
                info!("Found image in {}, package is available", dir.display());
                ResultStatus::Pass
            }
            Ok(false) => {
                info!("No images in {}, package is not available", dir.display());
                ResultStatus::Fail
            }
            Err(e) => {
                error!("Can not read dir {}: {}, testcase failed", dir.display(), e);
                ResultStatus::Fail
            }
        };
        Ok(TestResult::new(case, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn passes_with_an_image() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("system.img"), b"img").unwrap();
        let tester = PkgAvailableTester::new();
        let cancel = CancellationToken::new();

        tester.prepare(temp.path(), "dev", &cancel).await.unwrap();
        let results = tester.do_test_task("dev", &cancel).await.unwrap();
        assert_eq!(results, vec![TestResult::new(TASK, ResultStatus::Pass)]);
    }

    #[tokio::test]
    async fn fails_with_only_a_manifest() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("manifest_tag.xml"), b"<manifest/>").unwrap();
        let tester = PkgAvailableTester::new();
        let cancel = CancellationToken::new();

        tester.prepare(temp.path(), "dev", &cancel).await.unwrap();
        let result = tester.do_test_case("dev", "any", &cancel).await.unwrap();
        assert_eq!(result.status, ResultStatus::Fail);
    }

    #[tokio::test]
    async fn missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let tester = PkgAvailableTester::new();
        let cancel = CancellationToken::new();

        tester.prepare(&temp.path().join("gone"), "dev", &cancel).await.unwrap();
        let result = tester.do_test_case("dev", TASK, &cancel).await.unwrap();
        assert_eq!(result.status, ResultStatus::Fail);

        let unprepared = tester.do_test_case("other", TASK, &cancel).await.unwrap();
        assert_eq!(unprepared.status, ResultStatus::Fail);
    }
}
