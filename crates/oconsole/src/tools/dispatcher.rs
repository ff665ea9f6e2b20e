//! Tool dispatch: tool name and JSON arguments in, `ToolResult` out

use llm_core::ChatClient;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::builtin::{
    create_file, generate_command, parse_args, run_safe_command, system_report, AnswerArgs,
    CreateFileArgs, GenerateCommandArgs, PlanArgs, SafeCommandArgs,
};
use super::security::TerminalConfirmation;
use super::{CommandWhitelist, ConfirmationHandler, ShellRunner, ToolKind, ToolResult};
use crate::storage::CommandLog;

/// Executes tool calls against their handlers.
///
/// `execute` never fails: every problem becomes a failed `ToolResult`.
pub struct ToolExecutor {
    client: Arc<dyn ChatClient>,
    shell: Arc<dyn ShellRunner>,
    confirmation: Arc<dyn ConfirmationHandler>,
    whitelist: CommandWhitelist,
    command_log: Option<CommandLog>,
}

impl ToolExecutor {
    pub fn new(client: Arc<dyn ChatClient>, shell: Arc<dyn ShellRunner>) -> Self {
        Self {
            client,
            shell,
            confirmation: Arc::new(TerminalConfirmation),
            whitelist: CommandWhitelist::default(),
            command_log: None,
        }
    }

    pub fn with_confirmation(mut self, confirmation: Arc<dyn ConfirmationHandler>) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn with_whitelist(mut self, whitelist: CommandWhitelist) -> Self {
        self.whitelist = whitelist;
        self
    }

    pub fn with_command_log(mut self, log: CommandLog) -> Self {
        self.command_log = Some(log);
        self
    }

    /// Run the named tool with already-parsed JSON object arguments
    #[instrument(skip(self, args))]
    pub async fn execute(&self, name: &str, args: &Value) -> ToolResult {
        let Some(kind) = ToolKind::from_name(name) else {
            warn!(tool = name, "Unknown tool requested");
            return ToolResult::error(format!("Tool '{}' is not valid.", name));
        };

        let result = match self.dispatch(kind, args).await {
            Ok(result) | Err(result) => result,
        };
        debug!(
            tool = name,
            success = result.success,
            elapsed = result.elapsed_time,
            "Tool finished"
        );
        result
    }

    async fn dispatch(&self, kind: ToolKind, args: &Value) -> Result<ToolResult, ToolResult> {
        let name = kind.name();
        let result = match kind {
            ToolKind::ExplainPlan => {
                let args: PlanArgs = parse_args(name, args)?;
                ToolResult::success(args.plan)
            }
            ToolKind::AnswerQuestion => {
                let args: AnswerArgs = parse_args(name, args)?;
                ToolResult::success(args.query)
            }
            ToolKind::RunSafeCommand => {
                let args: SafeCommandArgs = parse_args(name, args)?;
                run_safe_command(&args, &self.whitelist, self.shell.as_ref()).await
            }
            ToolKind::CreateFile => {
                let args: CreateFileArgs = parse_args(name, args)?;
                create_file(&args).await
            }
            ToolKind::SystemReport => system_report(self.shell.as_ref()).await,
            ToolKind::GenerateCommand => {
                let args: GenerateCommandArgs = parse_args(name, args)?;
                generate_command(
                    &args,
                    self.client.as_ref(),
                    self.confirmation.as_ref(),
                    self.shell.as_ref(),
                    self.command_log.as_ref(),
                )
                .await
            }
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::security::AutoDeny;
    use crate::tools::shell::tests::RecordingShell;
    use async_trait::async_trait;
    use llm_core::{ChatError, ChatMessage, TextStream, ToolDefinition};
    use serde_json::json;

    struct SilentClient;

    #[async_trait]
    impl ChatClient for SilentClient {
        async fn try_complete(
            &self,
            _messages: &[ChatMessage],
            _tools: Option<&[ToolDefinition]>,
        ) -> Result<ChatMessage, ChatError> {
            Ok(ChatMessage::assistant("shutdown -h now"))
        }

        fn stream(&self, _messages: &[ChatMessage]) -> TextStream {
            Box::pin(futures::stream::empty())
        }

        fn model(&self) -> &str {
            "silent"
        }
    }

    fn executor(shell: Arc<RecordingShell>) -> ToolExecutor {
        ToolExecutor::new(Arc::new(SilentClient), shell).with_confirmation(Arc::new(AutoDeny))
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let shell = Arc::new(RecordingShell::default());
        let result = executor(shell.clone()).execute("format_disk", &json!({})).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Tool 'format_disk' is not valid."));
        assert!(shell.commands().is_empty());
    }

    #[tokio::test]
    async fn test_passthrough_tools() {
        let shell = Arc::new(RecordingShell::default());
        let executor = executor(shell);

        let plan = executor
            .execute("explain_plan", &json!({"plan": "1. ls /tmp"}))
            .await;
        assert!(plan.success);
        assert_eq!(plan.output, "1. ls /tmp");

        let answer = executor
            .execute("answer_question", &json!({"query": "Three files."}))
            .await;
        assert_eq!(answer.output, "Three files.");
    }

    #[tokio::test]
    async fn test_run_safe_command_routes_to_shell() {
        let shell = Arc::new(RecordingShell::default());
        let result = executor(shell.clone())
            .execute("run_safe_command", &json!({"command_name": "ls", "args_string": "/tmp"}))
            .await;

        assert!(result.success);
        assert_eq!(shell.commands(), vec!["ls /tmp"]);
    }

    #[tokio::test]
    async fn test_run_safe_command_rejects_rm() {
        let shell = Arc::new(RecordingShell::default());
        let result = executor(shell.clone())
            .execute("run_safe_command", &json!({"command_name": "rm", "args_string": "-rf /"}))
            .await;

        assert!(!result.success);
        assert!(shell.commands().is_empty());
    }

    #[tokio::test]
    async fn test_custom_whitelist() {
        let shell = Arc::new(RecordingShell::default());
        let executor = executor(shell.clone()).with_whitelist(CommandWhitelist::new(["git"]));

        let denied = executor
            .execute("run_safe_command", &json!({"command_name": "ls"}))
            .await;
        assert!(!denied.success);

        let allowed = executor
            .execute("run_safe_command", &json!({"command_name": "git", "args_string": "status"}))
            .await;
        assert!(allowed.success);
        assert_eq!(shell.commands(), vec!["git status"]);
    }

    #[tokio::test]
    async fn test_missing_argument_is_failure() {
        let shell = Arc::new(RecordingShell::default());
        let result = executor(shell).execute("create_file", &json!({"file_path": "/tmp/x"})).await;

        assert!(!result.success);
        assert!(result.error_text().contains("content"));
    }

    #[tokio::test]
    async fn test_generated_command_needs_approval() {
        let shell = Arc::new(RecordingShell::default());
        let result = executor(shell.clone())
            .execute("generate_linux_command", &json!({"task_description": "turn it off"}))
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("User declined to run: shutdown -h now"));
        assert!(shell.commands().is_empty());
    }

    #[tokio::test]
    async fn test_system_report_uses_shell() {
        let shell = Arc::new(RecordingShell::default());
        let result = executor(shell.clone()).execute("get_full_system_report", &json!({})).await;

        assert!(result.success);
        assert_eq!(shell.commands().len(), 3);
    }
}
