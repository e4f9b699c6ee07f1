//! Remote package builds
//!
//! A build checks out one pooled server, syncs the source tree described by
//! the upstream manifest, compiles it and copies the images back into the
//! package directory.

use crate::error::{FirmloopError, FirmloopResult};
use crate::exec::check_cancelled;
use crate::package::naming;
use crate::package::workspace::Workspace;
use crate::remote::pool::BuildServerPool;
use crate::remote::transport::RemoteTransport;
use crate::remote::BuildServer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// What to build and what to collect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Package directory name
    pub pkg: String,
    pub pre_compile_cmd: String,
    pub compile_cmd: String,
    /// Image paths relative to the remote workspace
    pub image_list: Vec<String>,
}

/// Upstream manifest repository tracked by every build
#[derive(Debug, Clone)]
pub struct ManifestSource {
    pub url: String,
    pub branch: String,
}

/// Drives builds on the build farm
pub struct RemoteBuilder {
    workspace: Workspace,
    pool: Arc<BuildServerPool>,
    transport: Arc<dyn RemoteTransport>,
    manifest: ManifestSource,
}

/// Attach the step name to a remote failure, keeping cancellation intact
fn step_err(step: &str, e: FirmloopError) -> FirmloopError {
    if e.is_cancelled() {
        e
    } else {
        FirmloopError::remote(step, e)
    }
}

impl RemoteBuilder {
    pub fn new(
        workspace: Workspace,
        pool: Arc<BuildServerPool>,
        transport: Arc<dyn RemoteTransport>,
        manifest: ManifestSource,
    ) -> Self {
        Self {
            workspace,
            pool,
            transport,
            manifest,
        }
    }

    /// True iff every image is present in the package directory
    pub fn pkg_available(&self, config: &BuildConfig) -> bool {
        self.workspace.pkg_available(&config.pkg, &config.image_list)
    }

    /// Build unless available; a failed incremental build is retried once
    /// from a clean output tree.
    pub async fn build(&self, config: &BuildConfig, cancel: &CancellationToken) -> FirmloopResult<()> {
        if self.pkg_available(config) {
            return Ok(());
        }
        info!("{} is not available", config.pkg);

        let err = match self.build_no_retry(config, false, cancel).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => e,
        };
        error!("Build pkg {} err: {}", config.pkg, err);

        info!("Rm out and build pkg {} again...", config.pkg);
        self.build_no_retry(config, true, cancel)
            .await
            .inspect_err(|e| error!("Build pkg {} err: {}", config.pkg, e))
    }

    /// One pass of the remote pipeline, optionally wiping the output tree
    /// before compiling.
    pub async fn build_no_retry(
        &self,
        config: &BuildConfig,
        rm: bool,
        cancel: &CancellationToken,
    ) -> FirmloopResult<()> {
        info!("Now build {}", config.pkg);
        let _lease = self.workspace.lease(&config.pkg).await;
        check_cancelled(cancel)?;

        let server = self.pool.checkout(cancel).await?;
        let ws = server.workspace.as_str();
        self.workspace.ensure_pkg_dir(&config.pkg).await?;

        check_cancelled(cancel)?;
        let cmd = format!(
            "mkdir -p {ws} && cd {ws} && repo init -u {} -b {}",
            self.manifest.url, self.manifest.branch
        );
        self.transport
            .run(&server, &cmd, cancel)
            .await
            .map_err(|e| step_err("repo init", e))?;

        check_cancelled(cancel)?;
        self.exchange_manifest(&server, &config.pkg).await?;

        check_cancelled(cancel)?;
        let cmd = format!(
            "cd {ws} && repo sync -c --no-tags --force-remove-dirty && repo forall -c 'git reset --hard && git clean -dfx && git lfs update --force && git lfs install && git lfs pull'"
        );
        self.transport
            .run(&server, &cmd, cancel)
            .await
            .map_err(|e| step_err("repo sync", e))?;

        check_cancelled(cancel)?;
        let cmd = format!("cd {ws} && {}", config.pre_compile_cmd);
        self.transport
            .run(&server, &cmd, cancel)
            .await
            .map_err(|e| step_err("pre-compile", e))?;

        if rm {
            check_cancelled(cancel)?;
            let cmd = format!("cd {ws} && rm -rf out");
            self.transport
                .run(&server, &cmd, cancel)
                .await
                .map_err(|e| step_err("rm out", e))?;
        }

        check_cancelled(cancel)?;
        let cmd = format!("cd {ws} && {}", config.compile_cmd);
        self.transport
            .run_once(&server, &cmd, cancel)
            .await
            .map_err(|e| match e {
                FirmloopError::Cancelled => e,
                FirmloopError::CommandExecution { output, .. } => FirmloopError::Compile {
                    package: config.pkg.clone(),
                    output,
                },
                other => FirmloopError::Compile {
                    package: config.pkg.clone(),
                    output: other.to_string(),
                },
            })?;

        // Compiled images are collected even if cancellation arrived meanwhile.
        let pkg_dir = self.workspace.pkg_dir(&config.pkg);
        for image in &config.image_list {
            let local = pkg_dir.join(naming::image_basename(image));
            self.transport
                .download(&server, &format!("{ws}/{image}"), &local)
                .await
                .inspect_err(|e| error!("Download file {} of {} error: {}", image, config.pkg, e))?;
        }

        info!("{} built on {}", config.pkg, server.addr);
        Ok(())
    }

    /// Pin the remote tree to the package's manifest snapshot when there is
    /// one, otherwise keep a copy of the freshly initialized manifest.
    async fn exchange_manifest(&self, server: &BuildServer, pkg: &str) -> FirmloopResult<()> {
        let local = self.workspace.manifest_tag(pkg);
        let remote = format!("{}/.repo/manifest.xml", server.workspace);

        let exchanged = if local.is_file() {
            info!("Replacing remote manifest with snapshot of {}", pkg);
            self.transport.upload(server, &local, &remote).await
        } else {
            self.transport.download(server, &remote, &local).await
        };
        exchanged.map_err(|e| step_err("manifest", e))
    }
}
