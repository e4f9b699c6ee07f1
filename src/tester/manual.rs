//! Operator-driven testing
//!
//! The operator runs each case by hand and types the verdict. Prompts are
//! serialized so concurrent device loops never interleave questions.
//!
//! A prompt reads the terminal from a blocking thread that cannot be
//! interrupted. When a case is cancelled its prompt stays open; the next case
//! waits for that stale prompt to be answered (and discards the answer)
//! before asking again, so two readers never share stdin. A process exiting
//! with a stale prompt open still waits for that one answer.

use crate::error::{FirmloopError, FirmloopResult};
use crate::exec::check_cancelled;
use crate::tester::{ResultStatus, TestResult, Tester};
use crate::ui::{self, UiContext};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DEFAULT_CASE: &str = "default";
const DEFAULT_DEVICE: &str = "default";

/// Parse a typed verdict, case-insensitively
pub fn parse_verdict(answer: &str) -> Option<ResultStatus> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "pass" => Some(ResultStatus::Pass),
        "fail" => Some(ResultStatus::Fail),
        _ => None,
    }
}

type Prompt = JoinHandle<FirmloopResult<ResultStatus>>;

pub struct ManualTester {
    ui: UiContext,
    /// Prompt still on the terminal, if any
    prompt: Mutex<Option<Prompt>>,
}

impl ManualTester {
    pub fn new(ui: UiContext) -> Self {
        Self {
            ui,
            prompt: Mutex::new(None),
        }
    }
}

async fn ask(ui: UiContext, message: String) -> FirmloopResult<ResultStatus> {
    if ui.is_interactive() {
        ui::select(
            &message,
            &[
                (ResultStatus::Pass, "pass", ""),
                (ResultStatus::Fail, "fail", ""),
            ],
        )
        .await
    } else {
        let message = format!("{}, 'pass' or 'fail':", message);
        ui::ask_line(&ui, &message, parse_verdict).await
    }
}

fn prompt_failed(e: tokio::task::JoinError) -> FirmloopError {
    FirmloopError::Internal(format!("prompt task failed: {}", e))
}

#[async_trait]
impl Tester for ManualTester {
    fn task_name(&self) -> &'static str {
        "manual"
    }

    async fn prepare(&self, _: &Path, _: &str, _: &CancellationToken) -> FirmloopResult<()> {
        Ok(())
    }

    async fn do_test_task(&self, device: &str, cancel: &CancellationToken) -> FirmloopResult<Vec<TestResult>> {
        self.do_test_cases(device, &[DEFAULT_CASE.to_string()], cancel)
            .await
    }

    async fn do_test_case(
        &self,
        device: &str,
        case: &str,
        cancel: &CancellationToken,
    ) -> FirmloopResult<TestResult> {
        let device = if device.is_empty() { DEFAULT_DEVICE } else { device };
        let message = format!("Please do testcase {} on device {} manually", case, device);

        check_cancelled(cancel)?;
        let mut prompt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FirmloopError::Cancelled),
            turn = self.prompt.lock() => turn,
        };

        if let Some(stale) = prompt.as_mut() {
            ui::remark(&self.ui, "Answer the previous prompt first; that answer is discarded");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FirmloopError::Cancelled),
                _ = stale => {}
            }
            *prompt = None;
        }

        let current = prompt.insert(tokio::spawn(ask(self.ui.clone(), message)));
        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FirmloopError::Cancelled),
            answer = current => answer,
        };
        *prompt = None;

        let status = answer.map_err(prompt_failed)??;
        Ok(TestResult::new(case, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdicts_are_case_insensitive() {
        assert_eq!(parse_verdict("pass"), Some(ResultStatus::Pass));
        assert_eq!(parse_verdict(" FAIL \n"), Some(ResultStatus::Fail));
        assert_eq!(parse_verdict("Pass"), Some(ResultStatus::Pass));
        assert_eq!(parse_verdict("maybe"), None);
        assert_eq!(parse_verdict(""), None);
    }

    #[tokio::test]
    async fn cancelled_before_prompt() {
        let tester = ManualTester::new(UiContext::non_interactive());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tester.do_test_case("dev", "wifi", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(tester.prompt.lock().await.is_none());
    }

    #[tokio::test]
    async fn stale_prompt_blocks_new_prompt_until_answered() {
        let tester = ManualTester::new(UiContext::non_interactive());
        let (answer, stale_answer) = tokio::sync::oneshot::channel::<()>();
        *tester.prompt.lock().await = Some(tokio::spawn(async move {
            let _ = stale_answer.await;
            Ok(ResultStatus::Pass)
        }));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = tester.do_test_case("dev", "wifi", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());

        // The stale prompt is still the only one on the terminal
        let mut prompt = tester.prompt.lock().await;
        let stale = prompt.as_mut().unwrap();
        assert!(!stale.is_finished());

        answer.send(()).unwrap();
        assert_eq!(stale.await.unwrap().unwrap(), ResultStatus::Pass);
    }
}
