//! Command implementations

pub mod config;
pub mod newer;
pub mod run;
pub mod steps;
pub mod watch;

pub use config::execute as config;
pub use newer::execute as newer;
pub use run::execute as run;
pub use steps::execute as steps;
pub use watch::execute as watch;

use crate::config::Config;
use crate::device::DeviceRegistry;
use crate::error::{FirmloopError, FirmloopResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Token cancelled on the first Ctrl-C
pub(crate) fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, stopping");
                child.cancel();
            }
            Err(e) => debug!("Cannot listen for Ctrl-C: {}", e),
        }
    });
    token
}

/// Requested device, or the first configured one
pub(crate) fn select_device(config: &Config, requested: Option<&str>) -> FirmloopResult<String> {
    let registry = DeviceRegistry::new(config.devices.list.clone());
    match requested {
        Some(device) if !registry.devices().is_empty() && !registry.contains(device) => {
            Err(FirmloopError::User(format!(
                "Device {} is not listed in devices.list",
                device
            )))
        }
        Some(device) => Ok(device.to_string()),
        None => Ok(registry.default_device().to_string()),
    }
}
