//! Build server pool
//!
//! Each checkout holds one server exclusively until its lease is dropped.

use crate::error::{FirmloopError, FirmloopResult};
use crate::remote::BuildServer;
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Pool of configured build servers
#[derive(Debug)]
pub struct BuildServerPool {
    idle: Arc<Mutex<VecDeque<BuildServer>>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl BuildServerPool {
    pub fn new(servers: Vec<BuildServer>) -> Self {
        let size = servers.len();
        Self {
            idle: Arc::new(Mutex::new(servers.into())),
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Number of servers in the pool
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether the pool has no servers at all
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Wait for a free server
    pub async fn checkout(&self, cancel: &CancellationToken) -> FirmloopResult<BuildServerLease> {
        if self.is_empty() {
            return Err(FirmloopError::PoolEmpty);
        }

        let permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => permit
                .map_err(|e| FirmloopError::Internal(format!("build server pool closed: {}", e)))?,
            _ = cancel.cancelled() => return Err(FirmloopError::Cancelled),
        };

        let server = self
            .idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| FirmloopError::Internal("build server permit without server".into()))?;
        debug!("Checked out build server {}", server.addr);

        Ok(BuildServerLease {
            server: Some(server),
            idle: Arc::clone(&self.idle),
            _permit: permit,
        })
    }
}

/// Exclusive use of one build server; returned to the pool on drop
#[derive(Debug)]
pub struct BuildServerLease {
    server: Option<BuildServer>,
    idle: Arc<Mutex<VecDeque<BuildServer>>>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for BuildServerLease {
    type Target = BuildServer;

    fn deref(&self) -> &BuildServer {
        self.server
            .as_ref()
            .unwrap_or_else(|| unreachable!("server is only taken on drop"))
    }
}

impl Drop for BuildServerLease {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            debug!("Released build server {}", server.addr);
            self.idle
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back(server);
        }
    }
}
