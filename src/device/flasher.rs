//! Device flashing sequence
//!
//! Drives one device from whatever state it is in to a freshly flashed,
//! rebooted and reconnected system:
//!
//! ```text
//! Unknown -> LoaderMode -> FlashingBootloader -> FlashingParameters
//!         -> FlashingUboot -> FlashingPartition(..)* -> Rebooted
//!         -> AwaitingConnection -> Verified
//! ```
//!
//! The settling delays between steps are required by the flashing tool and
//! are never shortened or interrupted. Cancellation is only observed when a
//! tool is about to be invoked.

use crate::device::link::DeviceLink;
use crate::device::location::LocationCache;
use crate::device::tool::FlashTool;
use crate::error::{FirmloopError, FirmloopResult};
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Optional partitions, in flashing order
pub const PARTITIONS: [&str; 10] = [
    "boot_linux",
    "system",
    "vendor",
    "userdata",
    "resource",
    "ramdisk",
    "chipset",
    "sys-prod",
    "chip-prod",
    "updater",
];

const LOADER_IMAGE: &str = "MiniLoaderAll.bin";
const PARAMETER_FILE: &str = "parameter.txt";
const UBOOT_IMAGE: &str = "uboot.img";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const LOADER_SETTLE: Duration = Duration::from_secs(5);
const PROBE_RETRY_DELAY: Duration = Duration::from_secs(5);
const LOADER_RETRY_DELAY: Duration = Duration::from_secs(5);
const AFTER_LOADER: Duration = Duration::from_secs(3);
const AFTER_PARAMETERS: Duration = Duration::from_secs(5);
const AFTER_UBOOT: Duration = Duration::from_secs(5);
const AFTER_PARTITION: Duration = Duration::from_secs(3);
const BEFORE_REBOOT: Duration = Duration::from_secs(5);
const BOOT_TIME: Duration = Duration::from_secs(20);
const STARTUP_TIME: Duration = Duration::from_secs(10);

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"LocationID=(\d+)").expect("valid location regex"))
}

/// Parse the location handle from the tool's device listing
pub fn parse_location(listing: &str) -> Option<String> {
    location_pattern()
        .captures(listing)
        .map(|caps| caps[1].to_string())
}

/// Arguments addressing the device at `location`
fn tool_args(location: &str, rest: &[&str]) -> Vec<String> {
    let mut args = vec!["-s".to_string(), location.to_string()];
    args.extend(rest.iter().map(|a| a.to_string()));
    args
}

/// Where a device is in the flashing sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashState {
    Unknown,
    LoaderMode,
    FlashingBootloader,
    FlashingParameters,
    FlashingUboot,
    FlashingPartition(&'static str),
    Rebooted,
    AwaitingConnection,
    Verified,
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashState::Unknown => write!(f, "unknown"),
            FlashState::LoaderMode => write!(f, "loader mode"),
            FlashState::FlashingBootloader => write!(f, "flashing {}", LOADER_IMAGE),
            FlashState::FlashingParameters => write!(f, "flashing {}", PARAMETER_FILE),
            FlashState::FlashingUboot => write!(f, "flashing {}", UBOOT_IMAGE),
            FlashState::FlashingPartition(part) => write!(f, "flashing {}.img", part),
            FlashState::Rebooted => write!(f, "rebooted"),
            FlashState::AwaitingConnection => write!(f, "awaiting connection"),
            FlashState::Verified => write!(f, "verified"),
        }
    }
}

/// Tracks and logs the state of one flash call
struct FlashRun<'a> {
    device: &'a str,
    state: FlashState,
}

impl<'a> FlashRun<'a> {
    fn new(device: &'a str) -> Self {
        Self {
            device,
            state: FlashState::Unknown,
        }
    }

    fn enter(&mut self, next: FlashState) {
        debug!("{}: {} -> {}", self.device, self.state, next);
        self.state = next;
    }
}

/// Flashes packages onto devices of one board family
pub struct Flasher {
    tool: Arc<dyn FlashTool>,
    link: Arc<dyn DeviceLink>,
    locations: Arc<LocationCache>,
}

impl Flasher {
    pub fn new(
        tool: Arc<dyn FlashTool>,
        link: Arc<dyn DeviceLink>,
        locations: Arc<LocationCache>,
    ) -> Self {
        Self {
            tool,
            link,
            locations,
        }
    }

    /// Flash the images in `pkg_dir` onto `device` and wait for it to boot
    pub async fn flash(
        &self,
        device: &str,
        pkg_dir: &Path,
        cancel: &CancellationToken,
    ) -> FirmloopResult<()> {
        let mut run = FlashRun::new(device);

        self.reboot_to_loader(device, cancel).await?;
        run.enter(FlashState::LoaderMode);

        info!("Calling flash tool to flash {} into {}...", pkg_dir.display(), device);
        let location = self.locate(device, cancel).await?;
        info!("LocationID of {} is [{}]", device, location);

        let file = |name: &str| pkg_dir.join(name).to_string_lossy().into_owned();
        let parameter = file(PARAMETER_FILE);

        run.enter(FlashState::FlashingBootloader);
        let loader = file(LOADER_IMAGE);
        let args = tool_args(&location, &["UL", loader.as_str(), "-noreset"]);
        self.invoke(device, LOADER_IMAGE, &args, 1, LOADER_RETRY_DELAY, cancel)
            .await?;
        sleep(AFTER_LOADER).await;

        run.enter(FlashState::FlashingParameters);
        let args = tool_args(&location, &["DI", "-p", parameter.as_str()]);
        self.invoke(device, PARAMETER_FILE, &args, 0, Duration::ZERO, cancel)
            .await?;
        sleep(AFTER_PARAMETERS).await;

        run.enter(FlashState::FlashingUboot);
        let uboot = file(UBOOT_IMAGE);
        let args = tool_args(&location, &["DI", "-uboot", uboot.as_str(), parameter.as_str()]);
        self.invoke(device, UBOOT_IMAGE, &args, 0, Duration::ZERO, cancel)
            .await?;
        sleep(AFTER_UBOOT).await;

        for part in PARTITIONS {
            let image = pkg_dir.join(format!("{}.img", part));
            match tokio::fs::metadata(&image).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!("Part {}.img not exist, ignored", part);
                    continue;
                }
                Err(e) => {
                    let e = FirmloopError::io(format!("checking {}", image.display()), e);
                    return Err(FirmloopError::flash_failed(device, part, e));
                }
            }

            run.enter(FlashState::FlashingPartition(part));
            let flag = format!("-{}", part);
            let image = image.to_string_lossy().into_owned();
            let args = tool_args(&location, &["DI", flag.as_str(), image.as_str(), parameter.as_str()]);
            self.invoke(device, part, &args, 1, Duration::ZERO, cancel)
                .await?;
            sleep(AFTER_PARTITION).await;
        }

        sleep(BEFORE_REBOOT).await;
        self.invoke(device, "reboot", &tool_args(&location, &["RD"]), 0, Duration::ZERO, cancel)
            .await?;
        run.enter(FlashState::Rebooted);

        sleep(BOOT_TIME).await;
        run.enter(FlashState::AwaitingConnection);
        if !self.link.wait_connected(device, CONNECT_TIMEOUT, cancel).await {
            if cancel.is_cancelled() {
                return Err(FirmloopError::Cancelled);
            }
            error!(
                "Flash device {} done, but boot unnormally, hdc connection fail",
                device
            );
            return Err(FirmloopError::BootVerificationFailed {
                device: device.to_string(),
            });
        }
        sleep(STARTUP_TIME).await;

        run.enter(FlashState::Verified);
        info!("Flash device {} successfully", device);
        Ok(())
    }

    /// Best effort switch into loader mode. A device that does not answer
    /// in OS mode is assumed to already sit in the loader.
    async fn reboot_to_loader(&self, device: &str, cancel: &CancellationToken) -> FirmloopResult<()> {
        info!("Try to reboot {} to loader...", device);
        let result = if self.link.wait_connected(device, CONNECT_TIMEOUT, cancel).await {
            self.link.reboot_to_loader(device, cancel).await
        } else if cancel.is_cancelled() {
            Err(FirmloopError::Cancelled)
        } else {
            warn!("Can not find target hdc device, assume it has been in loader mode");
            Ok(())
        };
        sleep(LOADER_SETTLE).await;
        result.map_err(|e| FirmloopError::flash_failed(device, "reboot loader", e))
    }

    async fn locate(&self, device: &str, cancel: &CancellationToken) -> FirmloopResult<String> {
        self.locations
            .resolve(device, || async {
                let found = self.probe_location(cancel).await?;
                if let Some(location) = found {
                    return Ok(location);
                }
                sleep(PROBE_RETRY_DELAY).await;
                self.probe_location(cancel)
                    .await?
                    .ok_or_else(|| FirmloopError::ToolInvocation {
                        step: "LD".to_string(),
                        reason: "no LocationID reported".to_string(),
                    })
            })
            .await
            .map_err(|e| FirmloopError::flash_failed(device, "locate", e))
    }

    async fn probe_location(&self, cancel: &CancellationToken) -> FirmloopResult<Option<String>> {
        match self.tool.output(&["LD".to_string()], cancel).await {
            Ok(listing) => Ok(parse_location(&listing)),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!("Listing devices failed: {}", e);
                Ok(None)
            }
        }
    }

    /// Invoke the tool, retrying up to `retries` more times `delay` apart
    async fn invoke(
        &self,
        device: &str,
        step: &str,
        args: &[String],
        retries: u32,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> FirmloopResult<()> {
        let mut left = retries;
        loop {
            match self.tool.run(args, cancel).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if left == 0 || !e.is_retryable() => {
                    error!("Flash {} of {} fail: {}", step, device, e);
                    return Err(FirmloopError::flash_failed(device, step, e));
                }
                Err(e) => {
                    error!("Flash {} of {} fail: {}", step, device, e);
                    warn!("Try again...");
                    left -= 1;
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
            }
        }
    }
}
