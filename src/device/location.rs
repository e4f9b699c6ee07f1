//! Device location handles
//!
//! Handles come from configuration or are probed once per device and kept
//! for the life of the process. Concurrent flashes of the same device wait
//! on one probe instead of racing the tool.

use crate::error::FirmloopResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

type Slot = Arc<tokio::sync::Mutex<Option<String>>>;

/// Per-device location handle cache
#[derive(Debug, Default)]
pub struct LocationCache {
    configured: HashMap<String, String>,
    probed: Mutex<HashMap<String, Slot>>,
}

impl LocationCache {
    /// Create a cache seeded with configured handles
    pub fn new(configured: HashMap<String, String>) -> Self {
        Self {
            configured,
            probed: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, device: &str) -> Slot {
        let mut probed = self.probed.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(probed.entry(device.to_string()).or_default())
    }

    /// Location handle of `device`, running `probe` if none is known yet.
    ///
    /// A failed probe caches nothing.
    pub async fn resolve<F, Fut>(&self, device: &str, probe: F) -> FirmloopResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FirmloopResult<String>>,
    {
        if let Some(location) = self.configured.get(device) {
            return Ok(location.clone());
        }

        let slot = self.slot(device);
        let mut known = slot.lock().await;
        if let Some(location) = known.as_ref() {
            return Ok(location.clone());
        }

        let location = probe().await?;
        *known = Some(location.clone());
        Ok(location)
    }
}
