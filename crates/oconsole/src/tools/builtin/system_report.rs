//! System overview tool

use std::time::Instant;

use crate::tools::{ShellRunner, ToolResult};

/// Sections of the report, each a header and the command that fills it
const SECTIONS: &[(&str, &str)] = &[
    ("--- OS and Kernel ---", "uname -a"),
    ("--- Disk Usage ---", "df -h"),
    ("--- System Uptime ---", "uptime"),
];

/// Run the fixed report commands and concatenate their output.
///
/// Failed commands contribute their error text; the report itself always
/// succeeds.
pub async fn system_report(shell: &dyn ShellRunner) -> ToolResult {
    let start = Instant::now();
    let mut report = String::new();

    for (i, (header, command)) in SECTIONS.iter().enumerate() {
        if i > 0 {
            report.push('\n');
        }
        report.push_str(header);
        report.push('\n');

        let result = shell.run(command).await;
        if result.success {
            report.push_str(&result.output);
        } else {
            report.push_str(result.error_text());
        }
        report.push('\n');
    }

    ToolResult::success(report).with_elapsed(start.elapsed())
}
