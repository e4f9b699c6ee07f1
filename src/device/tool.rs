//! Loader-mode flashing tool

use crate::error::{FirmloopError, FirmloopResult};
use crate::exec;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// The vendor tool that writes images to devices in loader mode
#[async_trait]
pub trait FlashTool: Send + Sync {
    /// Run the tool; a nonzero exit is a `ToolInvocation` error
    async fn run(&self, args: &[String], cancel: &CancellationToken) -> FirmloopResult<()>;

    /// Run the tool and return its output whatever the exit status
    async fn output(&self, args: &[String], cancel: &CancellationToken) -> FirmloopResult<String>;
}

/// Flash tool run as a subprocess
#[derive(Debug, Clone)]
pub struct ProcessFlashTool {
    program: String,
}

impl ProcessFlashTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl FlashTool for ProcessFlashTool {
    async fn run(&self, args: &[String], cancel: &CancellationToken) -> FirmloopResult<()> {
        let out = exec::output(&self.program, args, cancel).await?;
        if out.success {
            Ok(())
        } else {
            Err(FirmloopError::ToolInvocation {
                step: format!("{} {}", self.program, args.join(" ")),
                reason: match out.code {
                    Some(code) => format!("exit {}: {}", code, out.tail()),
                    None => format!("killed: {}", out.tail()),
                },
            })
        }
    }

    async fn output(&self, args: &[String], cancel: &CancellationToken) -> FirmloopResult<String> {
        Ok(exec::output(&self.program, args, cancel).await?.combined)
    }
}
