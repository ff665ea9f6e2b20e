//! Built-in tool handlers

mod create_file;
mod generate_command;
mod passthrough;
mod safe_command;
mod system_report;

pub use create_file::{create_file, expand_tilde, CreateFileArgs};
pub use generate_command::{generate_command, GenerateCommandArgs};
pub use passthrough::{AnswerArgs, PlanArgs};
pub use safe_command::{run_safe_command, SafeCommandArgs};
pub use system_report::system_report;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ToolResult;

/// Deserialize tool arguments into their typed form.
///
/// A missing or mistyped field becomes a failed result naming the problem.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ToolResult> {
    T::deserialize(args)
        .map_err(|e| ToolResult::error(format!("Invalid arguments for '{}': {}", tool, e)))
}
