//! Append-only logs kept next to the session
//!
//! Neither log is read back into the conversation; they exist for the user
//! (`/memory`, `/history`) and for auditing generated commands.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const MEMORY_HEADER: &str = "# OConsole Agent Memory\n\n";

/// One executed command per line
#[derive(Debug, Clone)]
pub struct CommandLog {
    path: PathBuf,
}

impl CommandLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, command: &str) -> Result<()> {
        let mut file = open_append(&self.path)?;
        writeln!(file, "{}", command.trim_end())
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Logged command");
        Ok(())
    }

    /// All logged commands, oldest first; a missing file is an empty log
    pub fn load(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

/// Timestamped markdown log of finished goals
#[derive(Debug, Clone)]
pub struct MemoryLog {
    path: PathBuf,
}

impl MemoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reset to the bare header
    pub fn clear(&self) -> Result<()> {
        ensure_parent(&self.path)?;
        fs::write(&self.path, MEMORY_HEADER)
            .with_context(|| format!("Failed to clear {}", self.path.display()))
    }

    pub fn append(&self, text: &str) -> Result<()> {
        if !self.path.exists() {
            self.clear()?;
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut file = open_append(&self.path)?;
        write!(file, "## Entry: {}\n{}\n\n", timestamp, text)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    pub fn read(&self) -> Result<String> {
        if !self.path.exists() {
            return Ok(MEMORY_HEADER.to_string());
        }
        fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}

fn open_append(path: &Path) -> Result<fs::File> {
    ensure_parent(path)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))
}
