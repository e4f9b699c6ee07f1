//! Test runners
//!
//! A tester is prepared with the directory of the package just flashed and
//! then runs either its whole task or selected cases against a device.

mod command;
mod factory;
mod manual;
mod pkg_available;

pub use command::CommandTester;
pub use factory::create_tester;
pub use manual::ManualTester;
pub use pkg_available::PkgAvailableTester;

use crate::error::FirmloopResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Verdict of one test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pass,
    Fail,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultStatus::Pass => write!(f, "pass"),
            ResultStatus::Fail => write!(f, "fail"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_case_name: String,
    pub status: ResultStatus,
}

impl TestResult {
    pub fn new(test_case_name: impl Into<String>, status: ResultStatus) -> Self {
        Self {
            test_case_name: test_case_name.into(),
            status,
        }
    }
}

#[async_trait]
pub trait Tester: Send + Sync {
    /// Name of the task run by [`do_test_task`](Self::do_test_task)
    fn task_name(&self) -> &'static str;

    /// Get ready to test the package in `pkg_dir` on `device`
    async fn prepare(&self, pkg_dir: &Path, device: &str, cancel: &CancellationToken)
        -> FirmloopResult<()>;

    /// Run every case of the task
    async fn do_test_task(&self, device: &str, cancel: &CancellationToken)
        -> FirmloopResult<Vec<TestResult>>;

    /// Run a single case
    async fn do_test_case(
        &self,
        device: &str,
        case: &str,
        cancel: &CancellationToken,
    ) -> FirmloopResult<TestResult>;

    /// Run `cases` in order, stopping at the first runner error
    async fn do_test_cases(
        &self,
        device: &str,
        cases: &[String],
        cancel: &CancellationToken,
    ) -> FirmloopResult<Vec<TestResult>> {
        let mut results = Vec::with_capacity(cases.len());
        for case in cases {
            results.push(self.do_test_case(device, case, cancel).await?);
        }
        Ok(results)
    }
}
