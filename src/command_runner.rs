//! External process execution with enforced timeouts.

use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default timeout for short provider and tooling invocations.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(60);

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program with the instance's default timeout and capture output.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;

    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds
    /// `timeout`. On timeout the child is killed, not left orphaned.
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;

    /// Run a program with inherited stdio and return only its exit status.
    /// No timeout — used for runs whose output streams to the operator.
    async fn run_status(&self, program: &str, args: &[&str]) -> Result<ExitStatus>;
}

/// Production `CommandRunner` backed by tokio.
///
/// `tokio::time::timeout` around `.output().await` does not kill the child
/// when the timeout fires — the future is dropped but the OS process keeps
/// running. `tokio::select!` with an explicit `child.kill()` guarantees
/// termination on every platform.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Read a piped stream to the end, tolerating an absent handle.
async fn drain(stream: Option<impl AsyncRead + Unpin>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut s) = stream {
        let _ = s.read_to_end(&mut buf).await;
    }
    buf
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();

        // Drain stdout/stderr concurrently with wait(): a child writing more
        // than the OS pipe buffer would otherwise block and never exit.
        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    drain(stdout_handle),
                    drain(stderr_handle),
                );
                Ok(Output {
                    status: status.with_context(|| format!("waiting for {program}"))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        }
    }

    async fn run_status(&self, program: &str, args: &[&str]) -> Result<ExitStatus> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        child
            .wait()
            .await
            .with_context(|| format!("waiting for {program}"))
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_captures_stdout_and_status() {
        let runner = TokioCommandRunner::new(Duration::from_secs(5));
        let out = runner
            .run("sh", &["-c", "echo hello"])
            .await
            .expect("sh should run");
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn run_reports_nonzero_status_without_error() {
        let runner = TokioCommandRunner::new(Duration::from_secs(5));
        let out = runner
            .run("sh", &["-c", "exit 3"])
            .await
            .expect("sh should run");
        assert_eq!(out.status.code(), Some(3));
    }

    #[tokio::test]
    async fn run_with_timeout_kills_slow_child() {
        let runner = TokioCommandRunner::new(Duration::from_secs(60));
        let err = runner
            .run_with_timeout("sh", &["-c", "sleep 30"], Duration::from_millis(100))
            .await
            .expect_err("expected timeout");
        assert!(err.to_string().contains("timed out"), "got: {err}");
    }

    #[tokio::test]
    async fn spawn_failure_names_the_program() {
        let runner = TokioCommandRunner::new(Duration::from_secs(5));
        let err = runner
            .run("definitely-not-a-real-binary", &[])
            .await
            .expect_err("expected spawn failure");
        assert!(format!("{err:#}").contains("definitely-not-a-real-binary"));
    }

    #[tokio::test]
    async fn run_status_returns_exit_status() {
        let runner = TokioCommandRunner::new(Duration::from_secs(5));
        let status = runner
            .run_status("sh", &["-c", "exit 2"])
            .await
            .expect("sh should run");
        assert_eq!(status.code(), Some(2));
    }
}
