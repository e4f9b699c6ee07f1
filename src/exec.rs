//! Cancellable subprocess execution
//!
//! Every external tool (ssh, scp, the flash tool, hdc, test runners) goes
//! through these helpers so cancellation is observed the same way everywhere.

use crate::error::{FirmloopError, FirmloopResult};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Max number of output lines kept in error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Captured output of a finished process
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Whether the process exited with status zero
    pub success: bool,
    /// Exit code, if the process was not killed by a signal
    pub code: Option<i32>,
    /// Stdout followed by stderr
    pub combined: String,
}

impl ExecOutput {
    /// Last lines of the combined output, for error messages
    pub fn tail(&self) -> String {
        tail_lines(&self.combined, ERROR_TAIL_LINES)
    }
}

/// Return the last `max` lines of `text`.
pub(crate) fn tail_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();
    let tail = if total > max {
        &lines[total - max..]
    } else {
        &lines[..]
    };
    tail.join("\n")
}

/// Fail fast if the token has already fired.
pub fn check_cancelled(cancel: &CancellationToken) -> FirmloopResult<()> {
    if cancel.is_cancelled() {
        Err(FirmloopError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run `program` and capture its output, whatever its exit status.
///
/// The child is killed if `cancel` fires first.
pub async fn output(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
) -> FirmloopResult<ExecOutput> {
    output_with_env(program, args, &[], cancel).await
}

/// Like [`output`], with extra environment variables for the child.
///
/// Values are never logged; use this for secrets that must stay off argv.
pub async fn output_with_env(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    cancel: &CancellationToken,
) -> FirmloopResult<ExecOutput> {
    check_cancelled(cancel)?;
    debug!("Executing: {} {:?}", program, args);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let out = tokio::select! {
        out = cmd.output() => out.map_err(|e| FirmloopError::command_failed(program, e))?,
        _ = cancel.cancelled() => return Err(FirmloopError::Cancelled),
    };

    let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&out.stderr));

    Ok(ExecOutput {
        success: out.status.success(),
        code: out.status.code(),
        combined,
    })
}

/// Run `program` and fail unless it exits successfully.
pub async fn run(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
) -> FirmloopResult<ExecOutput> {
    let out = output(program, args, cancel).await?;
    if out.success {
        Ok(out)
    } else {
        Err(FirmloopError::command_exec(
            format!("{} {}", program, args.join(" ")),
            out.tail(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_lines() {
        let text = (1..=60).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let tail = tail_lines(&text, 50);
        assert_eq!(tail.lines().count(), 50);
        assert!(tail.starts_with("11\n"));
        assert!(tail.ends_with("60"));
    }

    #[test]
    fn tail_short_output_unchanged() {
        assert_eq!(tail_lines("a\nb", 50), "a\nb");
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = output("true", &[], &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_reports_failure_output() {
        let cancel = CancellationToken::new();
        let args = vec!["-c".to_string(), "echo broken >&2; exit 3".to_string()];
        let err = run("sh", &args, &cancel).await.unwrap_err();
        match err {
            FirmloopError::CommandExecution { output, .. } => assert!(output.contains("broken")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn env_reaches_child() {
        let cancel = CancellationToken::new();
        let args = vec!["-c".to_string(), "printf %s \"$SSHPASS\"".to_string()];
        let envs = vec![("SSHPASS".to_string(), "s3cret".to_string())];
        let out = output_with_env("sh", &args, &envs, &cancel).await.unwrap();
        assert_eq!(out.combined, "s3cret");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_captures_both_streams() {
        let cancel = CancellationToken::new();
        let args = vec!["-c".to_string(), "echo out; echo err >&2".to_string()];
        let out = output("sh", &args, &cancel).await.unwrap();
        assert!(out.success);
        assert!(out.combined.contains("out"));
        assert!(out.combined.contains("err"));
    }
}
