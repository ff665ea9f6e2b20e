//! Model-generated commands that need explicit approval

use llm_core::{ChatClient, ChatMessage};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::storage::CommandLog;
use crate::tools::{ConfirmationHandler, ConfirmationResult, SecurityLevel, ShellRunner, ToolResult};

/// Matches a fenced block, capturing its body
static CODE_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)^```[\w-]*[ \t]*\n?(.*?)\n?[ \t]*```$").ok());

/// `generate_linux_command` arguments
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateCommandArgs {
    pub task_description: String,
}

fn generation_prompt(task: &str) -> String {
    format!(
        "Generate one Linux command to {}.\nExpected output: One linux command that performs the task described without introductory words.",
        task
    )
}

/// Reduce a model reply to a bare command line.
///
/// Removes a surrounding code fence, a leading `$ ` prompt, and keeps the
/// first non-empty line.
pub fn strip_code_fence(reply: &str) -> String {
    let trimmed = reply.trim();
    let body = CODE_FENCE
        .as_ref()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    let line = body
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();

    line.strip_prefix("$ ").unwrap_or(line).trim().to_string()
}

/// Ask the model for a command, get approval, then run and log it
pub async fn generate_command(
    args: &GenerateCommandArgs,
    client: &dyn ChatClient,
    confirmation: &dyn ConfirmationHandler,
    shell: &dyn ShellRunner,
    log: Option<&CommandLog>,
) -> ToolResult {
    let start = Instant::now();

    let messages = [ChatMessage::user(generation_prompt(&args.task_description))];
    let reply = match client.try_complete(&messages, None).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "Command generation failed");
            return ToolResult::error(format!("Failed to generate a command: {}", e))
                .with_elapsed(start.elapsed());
        }
    };
    let command = strip_code_fence(reply.content().unwrap_or_default());

    if command.is_empty() {
        return ToolResult::error("The model did not return a command.").with_elapsed(start.elapsed());
    }
    debug!(%command, "Generated command");

    if confirmation.confirm(&command, SecurityLevel::Dangerous).await != ConfirmationResult::Approved {
        info!(%command, "Generated command declined");
        return ToolResult::error(format!("User declined to run: {}", command))
            .with_elapsed(start.elapsed());
    }

    let mut result = shell.run(&command).await;

    if let Some(log) = log {
        if let Err(e) = log.append(&command) {
            warn!(error = %e, "Failed to record command");
        }
    }

    // Make the executed command visible to the model
    if result.success {
        result.output = if result.output.is_empty() {
            format!("$ {}", command)
        } else {
            format!("$ {}\n{}", command, result.output)
        };
    }
    result.with_elapsed(start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::security::{AutoApprove, AutoDeny};
    use crate::tools::shell::tests::RecordingShell;
    use async_trait::async_trait;
    use llm_core::{ChatError, TextStream, ToolDefinition};
    use tempfile::TempDir;

    struct FixedReply(&'static str);

    #[async_trait]
    impl ChatClient for FixedReply {
        async fn try_complete(
            &self,
            _messages: &[ChatMessage],
            tools: Option<&[ToolDefinition]>,
        ) -> Result<ChatMessage, ChatError> {
            assert!(tools.is_none());
            Ok(ChatMessage::assistant(self.0))
        }

        fn stream(&self, _messages: &[ChatMessage]) -> TextStream {
            Box::pin(futures::stream::empty())
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    /// Rejects every request with a body that reads like a command
    struct RejectingClient;

    #[async_trait]
    impl ChatClient for RejectingClient {
        async fn try_complete(
            &self,
            _messages: &[ChatMessage],
            _tools: Option<&[ToolDefinition]>,
        ) -> Result<ChatMessage, ChatError> {
            Err(ChatError::Status {
                status: 400,
                body: r#"{"error":"bad"}; touch /tmp/oconsole-should-not-exist"#.to_string(),
            })
        }

        fn stream(&self, _messages: &[ChatMessage]) -> TextStream {
            Box::pin(futures::stream::empty())
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    fn args() -> GenerateCommandArgs {
        GenerateCommandArgs {
            task_description: "count lines in log files".to_string(),
        }
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```bash\nwc -l *.log\n```"), "wc -l *.log");
        assert_eq!(strip_code_fence("```\nls\n```"), "ls");
        assert_eq!(strip_code_fence("  $ df -h  \n"), "df -h");
        assert_eq!(strip_code_fence("du -sh .\nThis shows usage."), "du -sh .");
        assert_eq!(strip_code_fence("   "), "");
    }

    #[tokio::test]
    async fn test_approved_command_runs_and_is_logged() {
        let dir = TempDir::new().unwrap();
        let log = CommandLog::new(dir.path().join("commands.txt"));
        let shell = RecordingShell::default();

        let result = generate_command(
            &args(),
            &FixedReply("```sh\nwc -l *.log\n```"),
            &AutoApprove,
            &shell,
            Some(&log),
        )
        .await;

        assert!(result.success);
        assert!(result.output.starts_with("$ wc -l *.log\n"));
        assert_eq!(shell.commands(), vec!["wc -l *.log"]);
        assert_eq!(log.load().unwrap(), vec!["wc -l *.log"]);
    }

    #[tokio::test]
    async fn test_denied_command_never_runs() {
        let shell = RecordingShell::default();
        let result =
            generate_command(&args(), &FixedReply("rm -rf /var/log/*"), &AutoDeny, &shell, None)
                .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("User declined to run: rm -rf /var/log/*"));
        assert!(shell.commands().is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_is_a_failure() {
        let shell = RecordingShell::default();
        let result = generate_command(&args(), &FixedReply(""), &AutoApprove, &shell, None).await;

        assert!(!result.success);
        assert!(shell.commands().is_empty());
    }

    #[tokio::test]
    async fn test_service_error_is_never_run_as_a_command() {
        let dir = TempDir::new().unwrap();
        let log = CommandLog::new(dir.path().join("commands.txt"));
        let shell = RecordingShell::default();

        let result =
            generate_command(&args(), &RejectingClient, &AutoApprove, &shell, Some(&log)).await;

        assert!(!result.success);
        let error = result.error.unwrap_or_default();
        assert!(error.starts_with("Failed to generate a command: HTTP 400"));
        assert!(shell.commands().is_empty());
        assert!(log.load().unwrap().is_empty());
    }
}
