//! Remote build farm: transport, server pool and build pipeline

pub mod build;
pub mod pool;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

/// A pooled build host
pub use crate::config::schema::BuildServerConfig as BuildServer;

pub use build::{BuildConfig, ManifestSource, RemoteBuilder};
pub use pool::{BuildServerLease, BuildServerPool};
pub use transport::{RemoteTransport, SshTransport};
