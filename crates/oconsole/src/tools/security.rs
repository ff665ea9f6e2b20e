//! Command whitelist and confirmation handling

use async_trait::async_trait;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::BTreeSet;
use std::io::{self, IsTerminal};
use tracing::{debug, warn};

use super::SecurityLevel;

/// Commands the agent may run directly without approval
pub const SAFE_COMMANDS: &[&str] = &[
    "ls", "cat", "echo", "pwd", "df", "du", "wc", "grep", "find", "whoami", "uname", "date",
    "uptime", "journalctl", "ps", "netstat", "apt", "dpkg", "mkdir", "touch", "free",
];

/// Check if stdin is connected to a terminal
pub fn is_interactive() -> bool {
    io::stdin().is_terminal()
}

/// Static set of command names allowed for direct execution.
///
/// Only the command name is checked; arguments are passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandWhitelist {
    names: BTreeSet<String>,
}

impl CommandWhitelist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, command_name: &str) -> bool {
        self.names.contains(command_name)
    }
}

impl Default for CommandWhitelist {
    fn default() -> Self {
        Self::new(SAFE_COMMANDS.iter().copied())
    }
}

/// Result of a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResult {
    /// User approved the command
    Approved,
    /// User denied the command
    Denied,
}

/// Trait for approving commands that bypass the whitelist
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn confirm(&self, command: &str, security_level: SecurityLevel) -> ConfirmationResult;
}

/// Default terminal-based confirmation handler.
///
/// The answer is read with a line editor on a blocking thread. The editor
/// owns the terminal until the user answers, so Ctrl-C at the prompt
/// denies the command instead of cancelling the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalConfirmation;

#[async_trait]
impl ConfirmationHandler for TerminalConfirmation {
    async fn confirm(&self, command: &str, security_level: SecurityLevel) -> ConfirmationResult {
        if security_level == SecurityLevel::Safe {
            return ConfirmationResult::Approved;
        }

        if !is_interactive() {
            warn!(
                command,
                security_level = %security_level,
                "Non-interactive mode: denying command that requires confirmation"
            );
            eprintln!(
                "\x1b[93m[Warning]\x1b[0m Non-interactive mode: '{}' requires confirmation but stdin is not a TTY.",
                command
            );
            eprintln!("Use --yes to approve generated commands in non-interactive mode.");
            return ConfirmationResult::Denied;
        }

        let level_color = match security_level {
            SecurityLevel::Safe => "\x1b[92m",
            SecurityLevel::Moderate => "\x1b[93m",
            SecurityLevel::Dangerous => "\x1b[91m",
        };

        println!();
        println!("{}[{}]\x1b[0m Generated command:", level_color, security_level);
        println!("  \x1b[1m$ {}\x1b[0m", command);
        println!();

        let line = tokio::task::spawn_blocking(|| {
            let mut editor = DefaultEditor::new()?;
            editor.readline("Run this command? [y/N] ")
        })
        .await;

        let result = match line {
            Ok(line) => answer_from(line),
            Err(e) => {
                debug!(error = %e, "Confirmation prompt failed, denying");
                ConfirmationResult::Denied
            }
        };
        debug!(command, result = ?result, "User confirmation response");
        result
    }
}

/// Map a prompt read to a decision; Ctrl-C, Ctrl-D and read errors deny
fn answer_from(line: Result<String, ReadlineError>) -> ConfirmationResult {
    match line {
        Ok(input) => parse_answer(&input),
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => ConfirmationResult::Denied,
        Err(e) => {
            debug!(error = %e, "Failed to read confirmation, denying");
            ConfirmationResult::Denied
        }
    }
}

/// Anything but an explicit yes is a denial
fn parse_answer(input: &str) -> ConfirmationResult {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => ConfirmationResult::Approved,
        _ => ConfirmationResult::Denied,
    }
}

/// A confirmation handler that always approves (for `--yes` and tests)
pub struct AutoApprove;

#[async_trait]
impl ConfirmationHandler for AutoApprove {
    async fn confirm(&self, _command: &str, _security_level: SecurityLevel) -> ConfirmationResult {
        ConfirmationResult::Approved
    }
}

/// A confirmation handler that always denies
#[cfg(test)]
pub struct AutoDeny;

#[cfg(test)]
#[async_trait]
impl ConfirmationHandler for AutoDeny {
    async fn confirm(&self, _command: &str, _security_level: SecurityLevel) -> ConfirmationResult {
        ConfirmationResult::Denied
    }
}
