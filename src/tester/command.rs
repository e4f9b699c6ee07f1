//! External test tool runner
//!
//! The tool is run with the configured arguments plus `--test-case` and
//! `--device` as needed, and reports through a JSON file of the form
//! `[{"test_case": "...", "result": "pass"}]`.

use crate::config::schema::CommandTesterConfig;
use crate::error::{FirmloopError, FirmloopResult};
use crate::exec;
use crate::tester::{ResultStatus, TestResult, Tester};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const RESULT_PASS: &str = "pass";
const TEST_CASE_FLAG: &str = "--test-case";
const DEVICE_FLAG: &str = "--device";

#[derive(Debug, Deserialize)]
struct RawResult {
    test_case: String,
    result: String,
}

#[derive(Debug, Clone)]
pub struct CommandTester {
    tool: String,
    param: Vec<String>,
    result_file: PathBuf,
}

impl CommandTester {
    pub fn new(config: &CommandTesterConfig) -> Self {
        Self {
            tool: config.tool.clone(),
            param: config.param.split_whitespace().map(String::from).collect(),
            result_file: config.result_path.join(&config.result_file),
        }
    }

    fn args(&self, cases: &[String], device: &str) -> Vec<String> {
        let mut args = self.param.clone();
        if !cases.is_empty() {
            args.push(TEST_CASE_FLAG.to_string());
            args.extend(cases.iter().cloned());
        }
        if !device.is_empty() {
            args.push(DEVICE_FLAG.to_string());
            args.push(device.to_string());
        }
        args
    }

    async fn run(&self, cases: &[String], device: &str, cancel: &CancellationToken) -> FirmloopResult<Vec<TestResult>> {
        // A result file left by an earlier run must not be mistaken for this one.
        if let Err(e) = tokio::fs::remove_file(&self.result_file).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(FirmloopError::io(
                    format!("removing {}", self.result_file.display()),
                    e,
                ));
            }
        }

        exec::run(&self.tool, &self.args(cases, device), cancel)
            .await
            .inspect_err(|e| {
                if !e.is_cancelled() {
                    error!("Test run {:?} on device {} failed: {}", cases, device, e);
                }
            })?;
        read_results(&self.result_file).await
    }
}

async fn read_results(path: &Path) -> FirmloopResult<Vec<TestResult>> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| FirmloopError::io(format!("reading result file {}", path.display()), e))?;
    let raw: Vec<RawResult> = serde_json::from_slice(&data)?;

    Ok(raw
        .into_iter()
        .map(|r| {
            let status = if r.result == RESULT_PASS {
                ResultStatus::Pass
            } else {
                ResultStatus::Fail
            };
            TestResult::new(r.test_case, status)
        })
        .collect())
}

#[async_trait]
impl Tester for CommandTester {
    fn task_name(&self) -> &'static str {
        "command"
    }

    async fn prepare(&self, _: &Path, _: &str, _: &CancellationToken) -> FirmloopResult<()> {
        Ok(())
    }

    async fn do_test_task(&self, device: &str, cancel: &CancellationToken) -> FirmloopResult<Vec<TestResult>> {
        self.run(&[], device, cancel).await
    }

    async fn do_test_case(
        &self,
        device: &str,
        case: &str,
        cancel: &CancellationToken,
    ) -> FirmloopResult<TestResult> {
        let results = self.run(&[case.to_string()], device, cancel).await?;
        let first = results
            .into_iter()
            .next()
            .ok_or_else(|| FirmloopError::Tester("no test result found".to_string()))?;
        if first.test_case_name != case {
            return Err(FirmloopError::Tester(format!(
                "no result for {} (found {})",
                case, first.test_case_name
            )));
        }
        info!(
            "Test case {} on device {} finished, the result is {}",
            case, device, first.status
        );
        Ok(first)
    }

    async fn do_test_cases(
        &self,
        device: &str,
        cases: &[String],
        cancel: &CancellationToken,
    ) -> FirmloopResult<Vec<TestResult>> {
        self.run(cases, device, cancel).await
    }
}
