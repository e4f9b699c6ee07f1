//! Flash a version onto a device and test it

use crate::error::FirmloopResult;
use crate::manager::PackageManager;
use crate::tester::{ResultStatus, TestResult, Tester};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// What to flash and test
#[derive(Debug, Clone, Copy)]
pub struct FlashAndTest<'a> {
    pub version: &'a str,
    pub device: &'a str,
    /// Run only this case instead of the whole task
    pub test_case: Option<&'a str>,
}

/// Outcome of one flash+test pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: ResultStatus,
    pub results: Vec<TestResult>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.status == ResultStatus::Pass
    }
}

/// Flash `opt.version`, prepare the tester and run the requested tests.
///
/// The verdict is pass only if every reported case passed. Flashing and
/// runner errors are returned as they are.
pub async fn flash_and_test(
    manager: &dyn PackageManager,
    tester: &dyn Tester,
    opt: FlashAndTest<'_>,
    cancel: &CancellationToken,
) -> FirmloopResult<Verdict> {
    manager
        .flash(opt.device, opt.version, cancel)
        .await
        .inspect_err(|e| {
            error!(
                "Failed to flash version {} to device {}: {}",
                opt.version, opt.device, e
            )
        })?;

    tester
        .prepare(&manager.pkg_dir(opt.version), opt.device, cancel)
        .await
        .inspect_err(|e| error!("Failed to prepare test: {}", e))?;

    let results = match opt.test_case {
        None => tester
            .do_test_task(opt.device, cancel)
            .await
            .inspect_err(|e| {
                error!("Failed to run all test cases on device {}: {}", opt.device, e)
            })?,
        Some(case) => vec![tester
            .do_test_case(opt.device, case, cancel)
            .await
            .inspect_err(|e| {
                error!("Failed to run test case {} on device {}: {}", case, opt.device, e)
            })?],
    };

    let mut status = ResultStatus::Pass;
    for result in &results {
        info!("Result for test case {} is {}", result.test_case_name, result.status);
        if result.status == ResultStatus::Fail {
            status = ResultStatus::Fail;
        }
    }
    info!(
        "Flash and test for version {} done, result: {}",
        opt.version, status
    );
    Ok(Verdict { status, results })
}
