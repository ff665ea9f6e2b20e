//! File creation tool

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Instant;
use tokio::fs;
use tracing::debug;

use crate::tools::ToolResult;

/// `create_file` arguments
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFileArgs {
    pub file_path: String,
    pub content: String,
}

/// Create or overwrite a file, making parent directories as needed
pub async fn create_file(args: &CreateFileArgs) -> ToolResult {
    let start = Instant::now();
    let path = expand_tilde(&args.file_path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolResult::error(format!(
                    "Failed to create file {}. Error: {}",
                    args.file_path, e
                ))
                .with_elapsed(start.elapsed());
            }
        }
    }

    match fs::write(&path, &args.content).await {
        Ok(()) => {
            debug!(path = %path.display(), bytes = args.content.len(), "Created file");
            ToolResult::success(format!("Successfully created file: {}", path.display()))
                .with_elapsed(start.elapsed())
        }
        Err(e) => ToolResult::error(format!(
            "Failed to create file {}. Error: {}",
            args.file_path, e
        ))
        .with_elapsed(start.elapsed()),
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (path, home) {
        ("~", Some(home)) => home,
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}
