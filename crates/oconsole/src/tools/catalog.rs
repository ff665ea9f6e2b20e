//! The fixed set of tools offered to the model

use llm_core::ToolDefinition;

use super::{ParameterProperty, ParameterSchema, SecurityLevel};

/// Every tool the agent can call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ExplainPlan,
    CreateFile,
    SystemReport,
    RunSafeCommand,
    GenerateCommand,
    AnswerQuestion,
}

impl ToolKind {
    /// Catalog order
    pub const ALL: [ToolKind; 6] = [
        ToolKind::ExplainPlan,
        ToolKind::CreateFile,
        ToolKind::SystemReport,
        ToolKind::RunSafeCommand,
        ToolKind::GenerateCommand,
        ToolKind::AnswerQuestion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ExplainPlan => "explain_plan",
            ToolKind::CreateFile => "create_file",
            ToolKind::SystemReport => "get_full_system_report",
            ToolKind::RunSafeCommand => "run_safe_command",
            ToolKind::GenerateCommand => "generate_linux_command",
            ToolKind::AnswerQuestion => "answer_question",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolKind::ExplainPlan => {
                "Outlines the step-by-step plan for the user before executing any actions. \
                 This should be the first tool called for any multi-step task."
            }
            ToolKind::CreateFile => {
                "Creates or overwrites a file with specified content. Use this for creating any new file, \
                 especially for code, HTML, or multi-line text. This is the only safe and reliable way to create files."
            }
            ToolKind::SystemReport => {
                "Provides a comprehensive overview of the system, including OS, kernel, disk space, and uptime. \
                 Use this for general queries about the system's status."
            }
            ToolKind::RunSafeCommand => {
                "Executes a specific, pre-approved Linux command for targeted operations. \
                 Do NOT use this to create files; use the 'create_file' tool instead."
            }
            ToolKind::GenerateCommand => {
                "Generates a potentially unsafe or complex command that requires user approval."
            }
            ToolKind::AnswerQuestion => {
                "Provides a conversational answer or a final summary when the user's goal is complete."
            }
        }
    }

    pub fn security_level(self) -> SecurityLevel {
        match self {
            ToolKind::ExplainPlan | ToolKind::AnswerQuestion | ToolKind::SystemReport => {
                SecurityLevel::Safe
            }
            ToolKind::RunSafeCommand | ToolKind::CreateFile => SecurityLevel::Moderate,
            ToolKind::GenerateCommand => SecurityLevel::Dangerous,
        }
    }

    pub fn parameters_schema(self) -> ParameterSchema {
        match self {
            ToolKind::ExplainPlan => ParameterSchema::new().with_required(
                "plan",
                ParameterProperty::string(
                    "A clear, user-friendly explanation of the steps the AI will take to achieve the user's goal.",
                ),
            ),
            ToolKind::CreateFile => ParameterSchema::new()
                .with_required(
                    "file_path",
                    ParameterProperty::string(
                        "The relative or absolute path for the new file (e.g., 'src/index.js' or '~/Documents/project/main.py').",
                    ),
                )
                .with_required(
                    "content",
                    ParameterProperty::string(
                        "The complete content to be written to the file. This can be multi-line.",
                    ),
                ),
            ToolKind::SystemReport => ParameterSchema::new(),
            ToolKind::RunSafeCommand => ParameterSchema::new()
                .with_required(
                    "command_name",
                    ParameterProperty::string(
                        "The name of the safe command to execute (e.g., 'ls', 'cat', 'wc').",
                    ),
                )
                .with_property(
                    "args_string",
                    ParameterProperty::string(
                        "A string containing all the arguments for the command (e.g., '-l /home/user').",
                    ),
                ),
            ToolKind::GenerateCommand => ParameterSchema::new().with_required(
                "task_description",
                ParameterProperty::string(
                    "A description of the task for which to generate a command.",
                ),
            ),
            ToolKind::AnswerQuestion => ParameterSchema::new().with_required(
                "query",
                ParameterProperty::string("The final summary to provide to the user."),
            ),
        }
    }

    /// Convert to a tool definition for the LLM
    pub fn to_definition(self) -> ToolDefinition {
        let parameters = serde_json::to_value(self.parameters_schema())
            .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}));
        ToolDefinition::new(self.name(), self.description(), parameters)
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Tool definitions sent verbatim with every request
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    definitions: Vec<ToolDefinition>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self {
            definitions: ToolKind::ALL.into_iter().map(ToolKind::to_definition).collect(),
        }
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_names_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("rm_everything"), None);
    }

    #[test]
    fn test_catalog_has_six_unique_tools() {
        let catalog = ToolCatalog::new();
        assert_eq!(catalog.definitions().len(), 6);

        let mut names: Vec<_> = catalog.definitions().iter().map(|d| d.function.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_run_safe_command_schema() {
        let def = ToolKind::RunSafeCommand.to_definition();
        assert_eq!(def.tool_type, "function");
        assert_eq!(def.function.parameters["required"], json!(["command_name"]));
        assert_eq!(
            def.function.parameters["properties"]["args_string"]["type"],
            "string"
        );
    }

    #[test]
    fn test_system_report_takes_no_parameters() {
        let def = ToolKind::SystemReport.to_definition();
        assert_eq!(def.function.parameters, json!({"type": "object", "properties": {}}));
    }

    #[test]
    fn test_only_generated_commands_are_dangerous() {
        let dangerous: Vec<_> = ToolKind::ALL
            .into_iter()
            .filter(|k| k.security_level() == SecurityLevel::Dangerous)
            .collect();
        assert_eq!(dangerous, vec![ToolKind::GenerateCommand]);
    }
}
