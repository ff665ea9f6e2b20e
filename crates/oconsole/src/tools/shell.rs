//! Shell command runner

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument, warn};

use super::ToolResult;

/// Default command timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Maximum captured output, in bytes
const MAX_OUTPUT_LEN: usize = 50_000;

/// Runs a full command line and reports the outcome
#[async_trait]
pub trait ShellRunner: Send + Sync {
    async fn run(&self, command: &str) -> ToolResult;
}

/// Runs commands through `sh -c`.
///
/// Success yields trimmed stdout. A non-zero exit yields trimmed stderr as
/// the error (or the exit code when stderr is empty).
#[derive(Debug, Clone)]
pub struct SystemShell {
    timeout: Duration,
}

impl SystemShell {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShellRunner for SystemShell {
    #[instrument(skip(self))]
    async fn run(&self, command: &str) -> ToolResult {
        let start = Instant::now();

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = timeout(self.timeout, cmd.output()).await;
        let elapsed = start.elapsed();

        let result = match result {
            Ok(Ok(output)) => {
                let stdout = truncate(String::from_utf8_lossy(&output.stdout).trim());
                let stderr = truncate(String::from_utf8_lossy(&output.stderr).trim());

                if output.status.success() {
                    debug!(bytes = stdout.len(), "Command succeeded");
                    ToolResult::success(stdout)
                } else if stderr.is_empty() {
                    let exit_code = output
                        .status
                        .code()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    debug!(%exit_code, "Command failed");
                    ToolResult::failure(stdout, format!("Command exited with code {}", exit_code))
                } else {
                    debug!(status = ?output.status.code(), "Command failed");
                    ToolResult::error(stderr)
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to spawn command");
                ToolResult::error(format!("Failed to execute command: {}", e))
            }
            Err(_) => {
                warn!("Command timed out");
                ToolResult::error(format!(
                    "Command timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            }
        };

        result.with_elapsed(elapsed)
    }
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_OUTPUT_LEN {
        return text.to_string();
    }

    let mut end = MAX_OUTPUT_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n\n[Output truncated at {} characters]",
        &text[..end],
        MAX_OUTPUT_LEN
    )
}
