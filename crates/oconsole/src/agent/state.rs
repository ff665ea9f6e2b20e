//! Agent state, configuration and run reports

use std::fmt;

use super::prompt::{EXECUTING_PROMPT, PLANNING_PROMPT};

/// Default step cap per goal
pub const DEFAULT_MAX_STEPS: usize = 7;

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum model requests per goal
    pub max_steps: usize,
    /// Whether to print steps, actions and results
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            verbose: true,
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Phase of a run; picks the system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentState {
    #[default]
    Planning,
    Executing,
}

impl AgentState {
    pub fn system_prompt(self) -> &'static str {
        match self {
            AgentState::Planning => PLANNING_PROMPT,
            AgentState::Executing => EXECUTING_PROMPT,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::Planning => write!(f, "PLANNING"),
            AgentState::Executing => write!(f, "EXECUTING"),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Final answer, from direct content or the answer tool
    Done(String),
    /// The model returned neither content nor a tool call
    NoAction,
    /// The step cap was reached
    StepLimitExceeded,
    /// The user cancelled the run
    Interrupted,
}

impl Outcome {
    pub fn answer(&self) -> Option<&str> {
        match self {
            Outcome::Done(answer) => Some(answer.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done(_) => write!(f, "done"),
            Outcome::NoAction => write!(f, "no action taken"),
            Outcome::StepLimitExceeded => write!(f, "step limit exceeded"),
            Outcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// A successfully executed command and what it printed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub command: String,
    pub output: String,
}

/// Summary of one run
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReport {
    pub outcome: Outcome,
    /// Model requests made
    pub steps: usize,
    /// Tool calls dispatched that did not end the run
    pub dispatched: usize,
    /// Plan announced through `explain_plan`
    pub plan: Option<String>,
    /// Last whitelisted command that produced output
    pub last_command: Option<CommandRecord>,
}

impl AgentReport {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            steps: 0,
            dispatched: 0,
            plan: None,
            last_command: None,
        }
    }

    pub fn answer(&self) -> Option<&str> {
        self.outcome.answer()
    }

    /// Markdown body for the memory log
    pub fn memory_entry(&self, goal: &str) -> String {
        let mut entry = format!("**Goal:** {}\n", goal);
        if let Some(ref plan) = self.plan {
            entry.push_str(&format!("**Plan:** {}\n", plan));
        }
        entry.push_str(&format!(
            "**Outcome:** {} after {} step(s), {} action(s)",
            self.outcome, self.steps, self.dispatched
        ));
        if let Some(answer) = self.answer() {
            entry.push_str(&format!("\n**Answer:** {}", answer));
        }
        entry
    }
}
