//! Whitelisted command execution

use serde::Deserialize;
use tracing::{debug, warn};

use crate::tools::{CommandWhitelist, ShellRunner, ToolResult};

/// `run_safe_command` arguments
#[derive(Debug, Clone, Deserialize)]
pub struct SafeCommandArgs {
    pub command_name: String,
    #[serde(default)]
    pub args_string: String,
}

impl SafeCommandArgs {
    /// Full command line: name, one space, arguments verbatim
    pub fn command_line(&self) -> String {
        format!("{} {}", self.command_name, self.args_string)
    }
}

/// Run a command if its name is whitelisted.
///
/// Arguments are not escaped; the name check is the only gate.
pub async fn run_safe_command(
    args: &SafeCommandArgs,
    whitelist: &CommandWhitelist,
    shell: &dyn ShellRunner,
) -> ToolResult {
    if !whitelist.is_allowed(&args.command_name) {
        warn!(command = %args.command_name, "Rejected command outside whitelist");
        return ToolResult::error(format!(
            "Command '{}' is not in the list of approved safe commands.",
            args.command_name
        ));
    }

    let command = args.command_line();
    debug!(%command, "Running safe command");
    shell.run(&command).await
}
