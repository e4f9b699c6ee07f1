//! OS-mode device connection over `hdc`

use crate::error::{FirmloopError, FirmloopResult};
use crate::exec;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Marker `hdc list targets` prints when nothing is attached
const NO_TARGETS: &str = "[Empty]";

/// Connection to devices booted into the OS
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Wait up to `timeout` for `device` to show up. An empty serial matches
    /// any device.
    async fn wait_connected(
        &self,
        device: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> bool;

    /// Ask a connected device to reboot into loader mode
    async fn reboot_to_loader(&self, device: &str, cancel: &CancellationToken)
        -> FirmloopResult<()>;
}

/// `hdc` (or `hdc_std`) subprocess link
#[derive(Debug, Clone)]
pub struct HdcLink {
    program: String,
}

impl HdcLink {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Use the configured binary, or find `hdc`/`hdc_std` on PATH
    pub fn discover(configured: Option<&str>) -> FirmloopResult<Self> {
        if let Some(program) = configured {
            return Ok(Self::new(program));
        }
        ["hdc", "hdc_std"]
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(|path| Self::new(path.to_string_lossy()))
            .ok_or_else(|| FirmloopError::ToolNotFound {
                name: "hdc".to_string(),
                hint: "Install hdc or set board.hdc in the config".to_string(),
            })
    }

    fn target_args(device: &str, args: &[&str]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if !device.is_empty() {
            full.push("-t".to_string());
            full.push(device.to_string());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    async fn hdc(&self, args: &[&str], cancel: &CancellationToken) -> FirmloopResult<exec::ExecOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        exec::output(&self.program, &args, cancel).await
    }

    async fn poll_targets(&self, device: &str, cancel: &CancellationToken) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let _ = self.hdc(&["kill"], cancel).await;
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = self.hdc(&["start"], cancel).await;
            tokio::time::sleep(Duration::from_secs(1)).await;

            let out = match self.hdc(&["list", "targets"], cancel).await {
                Ok(out) if out.success => out,
                Ok(out) => {
                    error!("Failed to list hdc targets: {}", out.tail());
                    continue;
                }
                Err(e) if e.is_cancelled() => return false,
                Err(e) => {
                    error!("Failed to list hdc targets: {}", e);
                    continue;
                }
            };

            if targets_include(&out.combined, device) {
                return true;
            }
            info!("{} not found", device);
        }
    }
}

/// Whether `hdc list targets` output shows `device`
fn targets_include(listing: &str, device: &str) -> bool {
    for target in listing.split_whitespace() {
        if target == NO_TARGETS {
            warn!("Can not find any hdc targets");
            return false;
        }
        if device.is_empty() || target == device {
            return true;
        }
    }
    false
}

#[async_trait]
impl DeviceLink for HdcLink {
    async fn wait_connected(
        &self,
        device: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        tokio::time::timeout(timeout, self.poll_targets(device, cancel))
            .await
            .unwrap_or(false)
    }

    async fn reboot_to_loader(
        &self,
        device: &str,
        cancel: &CancellationToken,
    ) -> FirmloopResult<()> {
        let args = Self::target_args(device, &["shell", "reboot", "loader"]);
        exec::run(&self.program, &args, cancel).await.map(|_| ())
    }
}
