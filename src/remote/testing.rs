//! Build transport double for unit tests

use crate::error::{FirmloopError, FirmloopResult};
use crate::remote::transport::RemoteTransport;
use crate::remote::BuildServer;
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Records every call; compile outcomes are scripted
#[derive(Default)]
pub(crate) struct FakeTransport {
    calls: Mutex<Vec<String>>,
    compile_failures: Mutex<u32>,
    cancel_on: Mutex<Option<(String, CancellationToken)>>,
}

impl FakeTransport {
    pub fn failing_compiles(n: u32) -> Arc<Self> {
        let fake = Self::default();
        *fake.compile_failures.lock().unwrap() = n;
        Arc::new(fake)
    }

    pub fn cancel_when(&self, needle: &str, token: &CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((needle.to_string(), token.clone()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }

    fn record(&self, call: String) {
        if let Some((needle, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if call.contains(needle.as_str()) {
                token.cancel();
            }
        }
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RemoteTransport for FakeTransport {
    async fn run(&self, _: &BuildServer, cmd: &str, _: &CancellationToken) -> FirmloopResult<()> {
        self.record(format!("run {}", cmd));
        Ok(())
    }

    async fn run_once(
        &self,
        _: &BuildServer,
        cmd: &str,
        _: &CancellationToken,
    ) -> FirmloopResult<()> {
        self.record(format!("once {}", cmd));
        let mut failures = self.compile_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(FirmloopError::command_exec(cmd, "ninja: build stopped"));
        }
        Ok(())
    }

    async fn download(&self, _: &BuildServer, remote: &str, local: &Path) -> FirmloopResult<()> {
        self.record(format!("download {}", remote));
        std::fs::write(local, b"img").unwrap();
        Ok(())
    }

    async fn upload(&self, _: &BuildServer, _: &Path, remote: &str) -> FirmloopResult<()> {
        self.record(format!("upload {}", remote));
        Ok(())
    }
}
