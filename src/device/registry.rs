//! Managed device list

use crate::error::{FirmloopError, FirmloopResult};
use std::collections::HashMap;

/// Static list of managed devices
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<String>,
}

impl DeviceRegistry {
    pub fn new(devices: Vec<String>) -> Self {
        Self { devices }
    }

    /// Device serials, in configuration order
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    pub fn contains(&self, device: &str) -> bool {
        self.devices.iter().any(|d| d == device)
    }

    /// First configured device, or the empty serial meaning "whatever is attached"
    pub fn default_device(&self) -> &str {
        self.devices.first().map(String::as_str).unwrap_or("")
    }

    /// Pair each device with the location handle at the same position.
    ///
    /// An empty list leaves every device to be probed; blank entries leave
    /// that device to be probed.
    pub fn bind_locations(&self, locations: &[String]) -> FirmloopResult<HashMap<String, String>> {
        if locations.is_empty() {
            return Ok(HashMap::new());
        }
        if locations.len() != self.devices.len() {
            return Err(FirmloopError::ConfigMismatch {
                devices: self.devices.len(),
                locations: locations.len(),
            });
        }
        Ok(self
            .devices
            .iter()
            .zip(locations)
            .filter(|(_, loc)| !loc.trim().is_empty())
            .map(|(dev, loc)| (dev.clone(), loc.trim().to_string()))
            .collect())
    }
}
