//! Flash tool and device link doubles for unit tests

use crate::device::link::DeviceLink;
use crate::device::tool::FlashTool;
use crate::error::{FirmloopError, FirmloopResult};
use crate::exec::check_cancelled;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Flash tool double: records invocations, fails on demand
#[derive(Default)]
pub(crate) struct FakeTool {
    pub calls: Mutex<Vec<String>>,
    pub failures: Mutex<HashMap<String, u32>>,
    pub listings: Mutex<VecDeque<String>>,
    pub cancel_on: Mutex<Option<(String, CancellationToken)>>,
}

impl FakeTool {
    pub fn with_listing(listings: &[&str]) -> Self {
        let tool = Self::default();
        *tool.listings.lock().unwrap() = listings.iter().map(|l| l.to_string()).collect();
        tool
    }

    pub fn fail(&self, flag: &str, times: u32) {
        self.failures.lock().unwrap().insert(flag.to_string(), times);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, flag: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(' ').any(|w| w == flag))
            .count()
    }
}

#[async_trait]
impl FlashTool for FakeTool {
    async fn run(&self, args: &[String], cancel: &CancellationToken) -> FirmloopResult<()> {
        check_cancelled(cancel)?;
        let call = args.join(" ");
        self.calls.lock().unwrap().push(call.clone());

        if let Some((flag, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if args.contains(flag) {
                token.cancel();
            }
        }
        let mut failures = self.failures.lock().unwrap();
        for (flag, left) in failures.iter_mut() {
            if *left > 0 && args.contains(flag) {
                *left -= 1;
                return Err(FirmloopError::ToolInvocation {
                    step: call,
                    reason: "exit 1".to_string(),
                });
            }
        }
        Ok(())
    }

    async fn output(&self, args: &[String], cancel: &CancellationToken) -> FirmloopResult<String> {
        check_cancelled(cancel)?;
        self.calls.lock().unwrap().push(args.join(" "));
        Ok(self
            .listings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "List of rockusb connected\nDevNo=1\tVid=0x2207,Pid=0x350a,LocationID=105\tLoader".to_string()))
    }
}

/// Device link double: scripted connection answers
#[derive(Default)]
pub(crate) struct FakeLink {
    pub answers: Mutex<VecDeque<bool>>,
    pub reboots: Mutex<Vec<String>>,
}

impl FakeLink {
    pub fn answering(answers: &[bool]) -> Arc<Self> {
        let link = Self::default();
        *link.answers.lock().unwrap() = answers.iter().copied().collect();
        Arc::new(link)
    }
}

#[async_trait]
impl DeviceLink for FakeLink {
    async fn wait_connected(&self, _: &str, timeout: Duration, _: &CancellationToken) -> bool {
        let answer = self.answers.lock().unwrap().pop_front().unwrap_or(true);
        if !answer {
            sleep(timeout).await;
        }
        answer
    }

    async fn reboot_to_loader(&self, device: &str, _: &CancellationToken) -> FirmloopResult<()> {
        self.reboots.lock().unwrap().push(device.to_string());
        Ok(())
    }
}

impl FakeLink {
    pub fn reboots(&self) -> Vec<String> {
        self.reboots.lock().unwrap().clone()
    }
}

impl FakeTool {
    /// Cancel `token` once an invocation carrying `flag` is made
    pub fn cancel_when(&self, flag: &str, token: &CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((flag.to_string(), token.clone()));
    }
}
