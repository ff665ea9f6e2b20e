//! One interactive or one-shot session: the agent plus everything around it
//!
//! Built once in `main` from the connection settings and the user config,
//! then driven by the REPL or the `run` subcommand.

use anyhow::Result;
use llm_core::{ChatClient, ChatMessage, Config, OpenAiClient, TextStream};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::agent::prompt::{explain_request, EXPLAINER_PROMPT};
use crate::agent::{AgentConfig, AgentLoop, AgentReport, CommandRecord};
use crate::config::Settings;
use crate::history::ConversationHistory;
use crate::storage::{CommandLog, MemoryLog};
use crate::tokenizer::Tokenizer;
use crate::tools::security::{AutoApprove, TerminalConfirmation};
use crate::tools::{CommandWhitelist, ConfirmationHandler, ShellRunner, SystemShell, ToolExecutor};

/// Session-wide options not covered by the config file
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Approve generated commands without prompting
    pub auto_approve: bool,
    /// Print steps and tool output
    pub verbose: bool,
    /// Overrides `[agent] max_steps`
    pub max_steps: Option<usize>,
}

pub struct Session {
    agent: AgentLoop,
    client: Arc<dyn ChatClient>,
    connection: Config,
    settings: Settings,
    memory: MemoryLog,
    command_log: CommandLog,
    last_answer: Option<String>,
    last_command: Option<CommandRecord>,
}

impl Session {
    /// Connect to the configured service and start with a fresh memory log
    pub fn new(connection: Config, settings: Settings, options: SessionOptions) -> Result<Self> {
        let client: Arc<dyn ChatClient> = Arc::new(OpenAiClient::new(connection.clone())?);
        let shell: Arc<dyn ShellRunner> =
            Arc::new(SystemShell::new().with_timeout(settings.agent.command_timeout_secs));
        let confirmation: Arc<dyn ConfirmationHandler> = if options.auto_approve {
            Arc::new(AutoApprove)
        } else {
            Arc::new(TerminalConfirmation)
        };

        Ok(Self::with_parts(
            client,
            shell,
            confirmation,
            connection,
            settings,
            options,
        ))
    }

    /// Assemble a session from explicit collaborators
    pub fn with_parts(
        client: Arc<dyn ChatClient>,
        shell: Arc<dyn ShellRunner>,
        confirmation: Arc<dyn ConfirmationHandler>,
        connection: Config,
        settings: Settings,
        options: SessionOptions,
    ) -> Self {
        let command_log = CommandLog::new(settings.paths.command_log_path());
        let memory = MemoryLog::new(settings.paths.memory_path());
        if let Err(e) = memory.clear() {
            warn!(error = %e, "Failed to reset memory log");
        }

        let executor = ToolExecutor::new(client.clone(), shell)
            .with_confirmation(confirmation)
            .with_whitelist(CommandWhitelist::new(settings.agent.safe_commands.iter().cloned()))
            .with_command_log(command_log.clone());

        let tokenizer = Tokenizer::for_model(&connection.model);
        debug!(encoding = ?tokenizer.encoding(), model = %connection.model, "Selected tokenizer");
        let mut history = ConversationHistory::new(settings.agent.memory_max_tokens, Arc::new(tokenizer));
        if let Some(note) = settings.agent.pinned_note.as_deref().filter(|n| !n.trim().is_empty()) {
            history = history.with_anchor(ChatMessage::user(note));
        }

        let config = AgentConfig::new()
            .with_max_steps(options.max_steps.unwrap_or(settings.agent.max_steps))
            .with_verbose(options.verbose);

        info!(
            model = %connection.model,
            host = %connection.host,
            max_steps = config.max_steps,
            "Session started"
        );

        Self {
            agent: AgentLoop::new(client.clone(), executor, history, config),
            client,
            connection,
            settings,
            memory,
            command_log,
            last_answer: None,
            last_command: None,
        }
    }

    /// Run a goal to completion, or until Ctrl-C
    pub async fn run_goal(&mut self, goal: &str) -> AgentReport {
        self.run_goal_until(goal, wait_for_interrupt()).await
    }

    /// Run a goal to completion, or until `cancel` resolves
    pub async fn run_goal_until(&mut self, goal: &str, cancel: impl Future<Output = ()>) -> AgentReport {
        let finished = tokio::select! {
            report = self.agent.run(goal) => Some(report),
            _ = cancel => None,
        };

        let report = match finished {
            Some(report) => report,
            None => {
                warn!("Run interrupted by user");
                self.agent.recover_interrupted()
            }
        };
        self.remember(goal, &report);
        report
    }

    fn remember(&mut self, goal: &str, report: &AgentReport) {
        if let Some(answer) = report.answer() {
            self.last_answer = Some(answer.to_string());
        }
        if report.last_command.is_some() {
            self.last_command = report.last_command.clone();
        }
        if let Err(e) = self.memory.append(&report.memory_entry(goal)) {
            warn!(error = %e, "Failed to write memory log");
        }
    }

    /// Forget the conversation
    pub fn reset(&mut self) {
        self.agent.reset();
        info!("Conversation reset");
    }

    /// Stream a short explanation of the last command's output
    pub fn explain_last_command(&self) -> Option<(String, TextStream)> {
        let record = self.last_command.as_ref()?;
        let messages = [
            ChatMessage::system(EXPLAINER_PROMPT),
            ChatMessage::user(explain_request(&record.command, &record.output)),
        ];
        Some((record.command.clone(), self.client.stream(&messages)))
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    pub fn connection(&self) -> &Config {
        &self.connection
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn memory(&self) -> &MemoryLog {
        &self.memory
    }

    pub fn command_log(&self) -> &CommandLog {
        &self.command_log
    }

    pub fn last_answer(&self) -> Option<&str> {
        self.last_answer.as_deref()
    }
}

/// Resolves on the next Ctrl-C.
///
/// Never resolves when the signal handler cannot be installed.
pub async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::security::AutoDeny;
    use crate::tools::shell::tests::RecordingShell;
    use async_trait::async_trait;
    use futures::StreamExt;
    use llm_core::{ToolCall, ToolDefinition};
    use crate::agent::Outcome;
    use llm_core::ChatError;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Answers from a script, then "done". A `Stall` entry never answers.
    enum Reply {
        Say(ChatMessage),
        Stall,
    }

    struct ScriptedClient {
        script: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
        streamed: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn try_complete(
            &self,
            messages: &[ChatMessage],
            _tools: Option<&[ToolDefinition]>,
        ) -> Result<ChatMessage, ChatError> {
            self.requests.lock().push(messages.to_vec());
            let next = self.script.lock().pop_front();
            match next {
                Some(Reply::Say(message)) => Ok(message),
                Some(Reply::Stall) => std::future::pending().await,
                None => Ok(ChatMessage::assistant("done")),
            }
        }

        fn stream(&self, messages: &[ChatMessage]) -> TextStream {
            self.streamed.lock().push(messages.to_vec());
            Box::pin(futures::stream::iter(vec!["It ".to_string(), "worked.".to_string()]))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn session(dir: &TempDir, script: Vec<ChatMessage>) -> (Session, Arc<ScriptedClient>) {
        session_with(dir, script.into_iter().map(Reply::Say).collect(), Settings::default())
    }

    fn session_with(dir: &TempDir, script: Vec<Reply>, mut settings: Settings) -> (Session, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            streamed: Mutex::new(Vec::new()),
        });

        settings.paths.memory_file = Some(dir.path().join("memory.md"));
        settings.paths.command_log = Some(dir.path().join("commands.txt"));

        let session = Session::with_parts(
            client.clone(),
            Arc::new(RecordingShell::default()),
            Arc::new(AutoDeny),
            Config::default(),
            settings,
            SessionOptions::default(),
        );
        (session, client)
    }

    fn call(name: &str, args: serde_json::Value) -> ChatMessage {
        ChatMessage::assistant_tool_calls(vec![ToolCall::new("id", name, args.to_string())])
    }

    #[tokio::test]
    async fn test_run_goal_records_answer_and_memory() {
        let dir = TempDir::new().unwrap();
        let (mut session, _) = session(
            &dir,
            vec![
                call("run_safe_command", json!({"command_name": "df", "args_string": "-h"})),
                call("answer_question", json!({"query": "Disk is fine."})),
            ],
        );

        let report = session.run_goal("check disk").await;

        assert_eq!(report.answer(), Some("Disk is fine."));
        assert_eq!(session.last_answer(), Some("Disk is fine."));
        assert_eq!(session.last_command.as_ref().map(|c| c.command.as_str()), Some("df -h"));

        let memory = session.memory().read().unwrap();
        assert!(memory.contains("**Goal:** check disk"));
        assert!(memory.contains("**Answer:** Disk is fine."));
    }

    #[tokio::test]
    async fn test_last_command_survives_goal_without_commands() {
        let dir = TempDir::new().unwrap();
        let (mut session, _) = session(
            &dir,
            vec![
                call("run_safe_command", json!({"command_name": "uptime"})),
                ChatMessage::assistant("Up for a while."),
                ChatMessage::assistant("Hello!"),
            ],
        );

        session.run_goal("uptime?").await;
        session.run_goal("hi").await;

        assert_eq!(session.last_answer(), Some("Hello!"));
        assert_eq!(session.last_command.as_ref().map(|c| c.command.as_str()), Some("uptime"));
    }

    #[tokio::test]
    async fn test_explain_streams_last_command() {
        let dir = TempDir::new().unwrap();
        let (mut session, client) = session(
            &dir,
            vec![call("run_safe_command", json!({"command_name": "free", "args_string": "-m"}))],
        );

        assert!(session.explain_last_command().is_none());
        session.run_goal("memory?").await;

        let (command, stream) = session.explain_last_command().unwrap();
        assert_eq!(command, "free -m");
        let text: Vec<String> = stream.collect().await;
        assert_eq!(text.concat(), "It worked.");

        let sent = &client.streamed.lock()[0];
        assert_eq!(sent[0], ChatMessage::system(EXPLAINER_PROMPT));
        assert!(sent[1].content().unwrap().starts_with("Command: free -m\nOutput:\n"));
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let dir = TempDir::new().unwrap();
        let (mut session, _) = session(&dir, vec![ChatMessage::assistant("hello")]);

        session.run_goal("hi").await;
        assert_eq!(session.agent().history().len(), 2);

        session.reset();
        assert!(session.agent().history().is_empty());
    }

    #[test]
    fn test_session_start_clears_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.md");
        std::fs::write(&path, "# OConsole Agent Memory\n\n## Entry: old\nstale\n\n").unwrap();

        let (session, _) = session(&dir, Vec::new());
        assert!(!session.memory().read().unwrap().contains("stale"));
    }

    #[tokio::test]
    async fn test_cancelled_goal_keeps_progress_and_session() {
        let dir = TempDir::new().unwrap();
        let (mut session, _) = session_with(
            &dir,
            vec![
                Reply::Say(call("explain_plan", json!({"plan": "1. uptime"}))),
                Reply::Stall,
                Reply::Say(ChatMessage::assistant("Back again.")),
            ],
            Settings::default(),
        );

        let cancel = tokio::time::sleep(Duration::from_millis(50));
        let report = session.run_goal_until("uptime?", cancel).await;

        assert_eq!(report.outcome, Outcome::Interrupted);
        assert_eq!(report.steps, 2);
        assert_eq!(report.plan.as_deref(), Some("1. uptime"));
        let memory = session.memory().read().unwrap();
        assert!(memory.contains("**Plan:** 1. uptime"));
        assert!(memory.contains("interrupted after 2 step(s)"));

        let next = session.run_goal("still there?").await;
        assert_eq!(next.answer(), Some("Back again."));
    }

    #[tokio::test]
    async fn test_pinned_note_leads_every_request() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.agent.pinned_note = Some("Hosts run Debian 12.".to_string());
        let (mut session, client) = session_with(&dir, Vec::new(), settings);

        session.run_goal("which distro?").await;
        session.reset();
        session.run_goal("again").await;

        let requests = client.requests.lock();
        for request in requests.iter() {
            assert_eq!(request[1], ChatMessage::user("Hosts run Debian 12."));
        }
        assert_eq!(session.agent().history().len(), 3);
    }
}
