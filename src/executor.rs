//! Command executor - runs host commands with a bounded wall-clock time
//!
//! Every invocation is isolated: a failing or hanging command only ever produces a
//! [`ProbeError`] for that single call. A timed out child is killed when its future is
//! dropped.

use std::{process::Stdio, time::Duration};

use tokio::process::Command;
use tracing::{instrument, trace};

use crate::error::{ProbeError, ProbeResult};

/// Default bound for local host commands
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a command line through `sh -c`, used for configured readiness checks.
    pub async fn run_shell_with_timeout(
        &self,
        line: &str,
        timeout: Duration,
    ) -> ProbeResult<String> {
        self.run_with_timeout("sh", &["-c", line], timeout).await
    }

    /// Run `program` with `args` and return its trimmed stdout.
    #[instrument(skip(self, args), fields(args = args.len()))]
    pub async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> ProbeResult<String> {
        let target = describe(program, args);
        trace!("running `{target}`");

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(output) => output?,
            Err(_) => return Err(ProbeError::timeout(target, timeout)),
        };

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "a signal".to_string(), |code| format!("code {code}"));
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();

            return Err(if stderr.is_empty() {
                ProbeError::Failure(format!("`{target}` exited with {code}"))
            } else {
                ProbeError::Failure(format!("`{target}` exited with {code}: {stderr}"))
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn describe(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}
