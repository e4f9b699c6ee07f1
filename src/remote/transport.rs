//! Remote shell and file transfer
//!
//! Build servers are driven over `ssh`/`scp`. Servers with a password go
//! through `sshpass`; others rely on key authentication.

use crate::error::{FirmloopError, FirmloopResult};
use crate::exec;
use crate::remote::BuildServer;
use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const SSH_OPTIONS: [&str; 4] = [
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "ServerAliveInterval=60",
];

/// Command execution and file transfer against a build server
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Run a shell command, retrying transport failures
    async fn run(
        &self,
        server: &BuildServer,
        cmd: &str,
        cancel: &CancellationToken,
    ) -> FirmloopResult<()>;

    /// Run a shell command exactly once
    async fn run_once(
        &self,
        server: &BuildServer,
        cmd: &str,
        cancel: &CancellationToken,
    ) -> FirmloopResult<()>;

    /// Copy a remote file to `local`. Not cancellable.
    async fn download(&self, server: &BuildServer, remote: &str, local: &Path)
        -> FirmloopResult<()>;

    /// Copy `local` over a remote file. Not cancellable.
    async fn upload(&self, server: &BuildServer, local: &Path, remote: &str)
        -> FirmloopResult<()>;
}

/// Run `op` up to `attempts` times, `delay` apart.
///
/// Cancellation is returned immediately and never retried.
pub async fn with_retry<F, Fut>(
    what: &str,
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> FirmloopResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FirmloopResult<()>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// One `ssh`/`scp` subprocess
struct Invocation {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl Invocation {
    async fn output(&self, cancel: &CancellationToken) -> FirmloopResult<exec::ExecOutput> {
        exec::output_with_env(&self.program, &self.args, &self.envs, cancel).await
    }
}

/// `ssh`/`scp` subprocess transport
#[derive(Debug, Clone)]
pub struct SshTransport {
    attempts: u32,
    retry_delay: Duration,
}

impl SshTransport {
    pub fn new(attempts: u32, retry_delay: Duration) -> Self {
        Self {
            attempts,
            retry_delay,
        }
    }

    /// Invocation of `tool`, wrapped with `sshpass -e` when a password is set.
    ///
    /// The password travels in `SSHPASS`, never on the command line.
    fn invocation(server: &BuildServer, tool: &str, args: Vec<String>) -> Invocation {
        let mut full = Vec::with_capacity(args.len() + SSH_OPTIONS.len() + 2);
        let mut envs = Vec::new();
        let program = if server.password.is_empty() {
            tool.to_string()
        } else {
            full.extend(["-e".to_string(), tool.to_string()]);
            envs.push(("SSHPASS".to_string(), server.password.clone()));
            "sshpass".to_string()
        };
        full.extend(SSH_OPTIONS.iter().map(|s| s.to_string()));
        full.extend(args);
        Invocation {
            program,
            args: full,
            envs,
        }
    }

    fn target(server: &BuildServer) -> String {
        format!("{}@{}", server.user, server.addr)
    }

    fn ssh_invocation(server: &BuildServer, cmd: &str) -> Invocation {
        Self::invocation(server, "ssh", vec![Self::target(server), cmd.to_string()])
    }

    fn scp_invocation(server: &BuildServer, from: String, to: String) -> Invocation {
        Self::invocation(server, "scp", vec![from, to])
    }

    async fn copy(
        &self,
        server: &BuildServer,
        from: String,
        to: String,
        path: &str,
    ) -> FirmloopResult<()> {
        // Transfers run to completion regardless of cancellation.
        let never = CancellationToken::new();
        let scp = Self::scp_invocation(server, from, to);

        with_retry(&format!("scp {}", path), self.attempts, self.retry_delay, || async {
            let out = scp.output(&never).await?;
            if out.success {
                Ok(())
            } else {
                Err(FirmloopError::Transfer {
                    path: path.to_string(),
                    reason: out.tail(),
                })
            }
        })
        .await
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    async fn run(
        &self,
        server: &BuildServer,
        cmd: &str,
        cancel: &CancellationToken,
    ) -> FirmloopResult<()> {
        with_retry(
            &format!("ssh {}", server.addr),
            self.attempts,
            self.retry_delay,
            || self.run_once(server, cmd, cancel),
        )
        .await
    }

    async fn run_once(
        &self,
        server: &BuildServer,
        cmd: &str,
        cancel: &CancellationToken,
    ) -> FirmloopResult<()> {
        debug!("[{}] {}", server.addr, cmd);
        let out = Self::ssh_invocation(server, cmd).output(cancel).await?;
        if out.success {
            Ok(())
        } else {
            Err(FirmloopError::command_exec(
                format!("{} on {}", cmd, server.addr),
                out.tail(),
            ))
        }
    }

    async fn download(
        &self,
        server: &BuildServer,
        remote: &str,
        local: &Path,
    ) -> FirmloopResult<()> {
        let from = format!("{}:{}", Self::target(server), remote);
        let to = local.to_string_lossy().into_owned();
        self.copy(server, from, to, remote).await
    }

    async fn upload(&self, server: &BuildServer, local: &Path, remote: &str) -> FirmloopResult<()> {
        let from = local.to_string_lossy().into_owned();
        let to = format!("{}:{}", Self::target(server), remote);
        self.copy(server, from, to, remote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn server(password: &str) -> BuildServer {
        BuildServer {
            addr: "10.0.0.5".to_string(),
            user: "builder".to_string(),
            password: password.to_string(),
            workspace: "/data/ws".to_string(),
        }
    }

    #[test]
    fn ssh_uses_keys_without_password() {
        let ssh = SshTransport::ssh_invocation(&server(""), "uname -a");
        assert_eq!(ssh.program, "ssh");
        assert_eq!(ssh.args[ssh.args.len() - 2], "builder@10.0.0.5");
        assert_eq!(ssh.args[ssh.args.len() - 1], "uname -a");
        assert!(ssh.envs.is_empty());
    }

    #[test]
    fn password_goes_through_environment() {
        let ssh = SshTransport::ssh_invocation(&server("s3cret"), "true");
        assert_eq!(ssh.program, "sshpass");
        assert_eq!(&ssh.args[..2], &["-e", "ssh"]);
        assert!(ssh.args.iter().all(|arg| !arg.contains("s3cret")));
        assert_eq!(ssh.envs, vec![("SSHPASS".to_string(), "s3cret".to_string())]);
    }

    #[test]
    fn scp_targets_remote_path() {
        let scp = SshTransport::scp_invocation(
            &server(""),
            "builder@10.0.0.5:/data/ws/out/uboot.img".to_string(),
            "/tmp/uboot.img".to_string(),
        );
        assert_eq!(scp.program, "scp");
        assert!(scp.args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert_eq!(scp.args.last().unwrap(), "/tmp/uboot.img");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_after_budget() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", 3, Duration::from_secs(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FirmloopError::remote("ssh", "connection reset"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", 3, Duration::from_secs(5), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(FirmloopError::remote("ssh", "timeout"))
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_never_repeats_cancellation() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", 3, Duration::from_secs(5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FirmloopError::Cancelled)
        })
        .await;
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
