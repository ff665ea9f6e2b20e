//! Agent loop implementation

use std::sync::Arc;

use llm_core::{ChatClient, ChatMessage, ToolCall};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::history::ConversationHistory;
use crate::tools::builtin::SafeCommandArgs;
use crate::tools::{ToolCatalog, ToolExecutor, ToolKind, ToolResult};
use crate::ui::{self, BLUE, BOLD, CYAN, DIM, GREEN, MAGENTA, RED, RESET, YELLOW};

use super::state::{AgentConfig, AgentReport, AgentState, CommandRecord, Outcome};

/// Drives one goal at a time through the model and the tools.
///
/// History persists across goals until `reset`. The report of the current
/// run is kept on the loop so a cancelled run can still be summarized.
pub struct AgentLoop {
    client: Arc<dyn ChatClient>,
    executor: ToolExecutor,
    catalog: ToolCatalog,
    history: ConversationHistory,
    config: AgentConfig,
    progress: AgentReport,
}

impl AgentLoop {
    pub fn new(
        client: Arc<dyn ChatClient>,
        executor: ToolExecutor,
        history: ConversationHistory,
        config: AgentConfig,
    ) -> Self {
        Self {
            client,
            executor,
            catalog: ToolCatalog::new(),
            history,
            config,
            progress: AgentReport::new(Outcome::StepLimitExceeded),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Start a new session: forget the conversation
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Close out a cancelled run.
    ///
    /// Answers any tool call left pending so every stored call stays paired
    /// with a tool turn, and returns what the run got done before it stopped.
    pub fn recover_interrupted(&mut self) -> AgentReport {
        let pending: Vec<String> = match self.history.read().last() {
            Some(last @ ChatMessage::Assistant { .. }) => {
                last.tool_calls().iter().map(|c| c.id.clone()).collect()
            }
            _ => Vec::new(),
        };

        for id in pending {
            let result = ToolResult::error("Interrupted by user");
            self.history.append(ChatMessage::tool_result(id, result.to_json()));
        }

        let report = self.take_progress(Outcome::Interrupted);
        info!(steps = report.steps, dispatched = report.dispatched, "Agent run interrupted");
        report
    }

    /// Run the agent on a goal
    #[instrument(skip(self, goal), fields(model = %self.client.model()))]
    pub async fn run(&mut self, goal: &str) -> AgentReport {
        info!(goal_len = goal.len(), max_steps = self.config.max_steps, "Starting agent run");
        self.history.append(ChatMessage::user(goal));

        let mut state = AgentState::default();
        self.progress = AgentReport::new(Outcome::StepLimitExceeded);

        for step in 1..=self.config.max_steps {
            self.progress.steps = step;

            let tokens = self.history.token_count();
            debug!(step, %state, tokens, turns = self.history.len(), "Starting step");
            if self.config.verbose {
                println!(
                    "{}{}── Step {}/{} | State: {} | History: {} tokens ──{}",
                    BLUE, BOLD, step, self.config.max_steps, state, tokens, RESET
                );
            }

            let messages = self.history.with_system(state.system_prompt());
            let spinner = self.config.verbose.then(|| ui::spinner("Agent is processing..."));
            let response = self
                .client
                .complete(&messages, Some(self.catalog.definitions()))
                .await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }

            // Direct content always ends the run
            if let Some(content) = response.content().filter(|c| !c.trim().is_empty()) {
                let answer = content.trim().to_string();
                self.history.append(ChatMessage::assistant(content));
                info!(step, "Agent replied directly");
                if self.config.verbose {
                    println!("{}✔ Agent replied directly{}", GREEN, RESET);
                }
                return self.finish(Outcome::Done(answer));
            }

            let mut calls = response.tool_calls().to_vec();
            if calls.is_empty() {
                self.history.append(ChatMessage::assistant(""));
                warn!(step, "Model returned neither content nor a tool call");
                if self.config.verbose {
                    println!(
                        "{}Agent finished without providing an answer or action.{}",
                        YELLOW, RESET
                    );
                }
                return self.finish(Outcome::NoAction);
            }

            if calls.len() > 1 {
                debug!(discarded = calls.len() - 1, "Ignoring extra tool calls");
                calls.truncate(1);
            }
            let mut call = calls.remove(0);
            if call.id.is_empty() {
                call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
            }
            self.history
                .append(ChatMessage::assistant_tool_calls(vec![call.clone()]));

            let args = match parse_arguments(call.arguments()) {
                Ok(args) => args,
                Err(message) => {
                    warn!(tool = call.name(), error = %message, "Bad tool arguments");
                    if self.config.verbose {
                        println!("{}{}{}", RED, message, RESET);
                    }
                    self.record_result(&call, &ToolResult::error(message));
                    continue;
                }
            };

            let kind = ToolKind::from_name(call.name());
            self.show_action(&call, kind, &args);

            let result = self.executor.execute(call.name(), &args).await;
            self.record_result(&call, &result);

            match kind {
                Some(ToolKind::AnswerQuestion) if result.success => {
                    info!(step, "Agent finished the task");
                    if self.config.verbose {
                        println!("{}✔ Agent has finished the task.{}", GREEN, RESET);
                    }
                    return self.finish(Outcome::Done(result.output));
                }
                Some(ToolKind::ExplainPlan) if result.success => {
                    // Only the first plan is recorded
                    if state == AgentState::Planning {
                        self.progress.plan = Some(result.output.clone());
                        state = AgentState::Executing;
                        debug!("Plan announced, executing");
                    }
                }
                Some(ToolKind::RunSafeCommand) => {
                    self.progress.last_command = command_record(&args, &result);
                }
                Some(ToolKind::CreateFile | ToolKind::SystemReport | ToolKind::GenerateCommand) => {
                    self.progress.last_command = None;
                }
                _ => {}
            }

            self.progress.dispatched += 1;
            self.show_result(kind, &result);
        }

        warn!(max_steps = self.config.max_steps, "Step limit reached");
        if self.config.verbose {
            println!(
                "{}Agent reached maximum steps and could not complete the task.{}",
                YELLOW, RESET
            );
        }
        self.finish(Outcome::StepLimitExceeded)
    }

    fn record_result(&mut self, call: &ToolCall, result: &ToolResult) {
        self.history
            .append(ChatMessage::tool_result(call.id.clone(), result.to_json()));
    }

    fn take_progress(&mut self, outcome: Outcome) -> AgentReport {
        let mut report = std::mem::replace(
            &mut self.progress,
            AgentReport::new(Outcome::StepLimitExceeded),
        );
        report.outcome = outcome;
        report
    }

    fn finish(&mut self, outcome: Outcome) -> AgentReport {
        if self.config.verbose {
            if let Some(answer) = outcome.answer() {
                println!();
                println!("{}{}Final Answer{}", MAGENTA, BOLD, RESET);
                println!("{}", ui::indent(answer, "  "));
                println!();
            }
        }
        let report = self.take_progress(outcome);
        info!(outcome = %report.outcome, steps = report.steps, dispatched = report.dispatched, "Agent run finished");
        report
    }

    fn show_action(&self, call: &ToolCall, kind: Option<ToolKind>, args: &Value) {
        if !self.config.verbose {
            return;
        }

        match kind {
            Some(ToolKind::ExplainPlan) => {
                let plan = args.get("plan").and_then(Value::as_str).unwrap_or("No plan provided.");
                println!("{}{}Agent's Plan{}", BLUE, BOLD, RESET);
                println!("{}{}{}", YELLOW, ui::indent(plan, "  "), RESET);
            }
            Some(ToolKind::AnswerQuestion) => {}
            _ => {
                let pretty = serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string());
                println!("{}Tool:{} {}{}{}", DIM, RESET, CYAN, call.name(), RESET);
                println!("{}Arguments:{}", DIM, RESET);
                println!("{}{}{}", CYAN, ui::indent(&pretty, "  "), RESET);
            }
        }

        if kind == Some(ToolKind::RunSafeCommand) {
            if let Ok(parsed) = serde_json::from_value::<SafeCommandArgs>(args.clone()) {
                println!("{}$ {}{}", GREEN, parsed.command_line().trim(), RESET);
            }
        }
    }

    fn show_result(&self, kind: Option<ToolKind>, result: &ToolResult) {
        if !self.config.verbose || matches!(kind, Some(ToolKind::ExplainPlan)) {
            return;
        }

        if result.success {
            println!(
                "{}✔ Command executed successfully! ({:.2}s){}",
                GREEN, result.elapsed_time, RESET
            );
            if result.output.trim().is_empty() {
                println!("{}No output.{}", DIM, RESET);
            } else {
                println!("{}{}{}", CYAN, result.output, RESET);
            }
        } else {
            println!("{}✖ Command Failed{}", RED, RESET);
            println!("{}{}{}", RED, result.error_text(), RESET);
        }
        println!();
    }
}

/// Parse tool-call argument text into a JSON object.
///
/// Blank text counts as an empty object.
fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) => Err("Error processing tool call: arguments must be a JSON object".to_string()),
        Err(e) => Err(format!("Error processing tool call: {}", e)),
    }
}

fn command_record(args: &Value, result: &ToolResult) -> Option<CommandRecord> {
    if !result.success || result.output.is_empty() {
        return None;
    }
    let parsed = serde_json::from_value::<SafeCommandArgs>(args.clone()).ok()?;
    Some(CommandRecord {
        command: parsed.command_line().trim().to_string(),
        output: result.output.clone(),
    })
}
