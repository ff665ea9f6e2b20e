//! User configuration for oconsole
//!
//! Configuration file: ~/.config/oconsole/config.toml (or platform equivalent).
//! Connection settings (host, key, model) come from flags and the environment;
//! this file only tunes the agent and where its logs live.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::agent::DEFAULT_MAX_STEPS;
use crate::tools::builtin::expand_tilde;
use crate::tools::security::SAFE_COMMANDS;
use crate::tools::shell::DEFAULT_TIMEOUT_SECS;

/// Default history token budget
pub const DEFAULT_MEMORY_MAX_TOKENS: usize = 16_000;

/// User configuration for oconsole
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Agent limits and whitelist
    #[serde(default)]
    pub agent: AgentSettings,

    /// Persisted file locations
    #[serde(default)]
    pub paths: PathSettings,
}

/// Agent-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model requests per goal
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// History token budget (0 disables eviction)
    #[serde(default = "default_memory_max_tokens")]
    pub memory_max_tokens: usize,

    /// Commands `run_safe_command` may execute
    #[serde(default = "default_safe_commands")]
    pub safe_commands: Vec<String>,

    /// Shell command timeout
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Note kept at the head of the conversation, never evicted
    #[serde(default)]
    pub pinned_note: Option<String>,
}

/// File locations; unset entries live in the data directory
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathSettings {
    /// REPL input history
    #[serde(default)]
    pub history_file: Option<PathBuf>,

    /// Executed generated commands
    #[serde(default)]
    pub command_log: Option<PathBuf>,

    /// Markdown memory log
    #[serde(default)]
    pub memory_file: Option<PathBuf>,
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_memory_max_tokens() -> usize {
    DEFAULT_MEMORY_MAX_TOKENS
}

fn default_safe_commands() -> Vec<String> {
    SAFE_COMMANDS.iter().map(|s| s.to_string()).collect()
}

fn default_command_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            memory_max_tokens: default_memory_max_tokens(),
            safe_commands: default_safe_commands(),
            command_timeout_secs: default_command_timeout(),
            pinned_note: None,
        }
    }
}

impl PathSettings {
    pub fn history_path(&self) -> PathBuf {
        resolve(&self.history_file, "history.txt")
    }

    pub fn command_log_path(&self) -> PathBuf {
        resolve(&self.command_log, "commands.txt")
    }

    pub fn memory_path(&self) -> PathBuf {
        resolve(&self.memory_file, "memory.md")
    }
}

fn resolve(configured: &Option<PathBuf>, file_name: &str) -> PathBuf {
    match configured {
        Some(path) => expand_tilde(&path.to_string_lossy()),
        None => data_dir().join(file_name),
    }
}

/// Directory for oconsole's own files
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("oconsole"))
        .unwrap_or_else(|| PathBuf::from(".oconsole"))
}

const DEFAULT_CONFIG: &str = r#"# oconsole configuration
# Location: ~/.config/oconsole/config.toml
#
# Connection settings are taken from flags or the environment:
#   HOST, API_KEY, MODEL, PROVIDER (openai | ollama)

[agent]
# Model requests per goal before giving up
max_steps = 7

# Conversation token budget; oldest turns are dropped first (0 = unlimited)
memory_max_tokens = 16000

# Commands the agent may run without asking
safe_commands = [
    "ls", "cat", "echo", "pwd", "df", "du", "wc", "grep",
    "find", "whoami", "uname", "date", "uptime", "journalctl",
    "ps", "netstat", "apt", "dpkg", "mkdir", "touch", "free",
]

# Seconds before a shell command is killed
command_timeout_secs = 120

# Note sent ahead of every conversation and never dropped by the token budget
# pinned_note = "The servers run Debian 12."

[paths]
# Defaults live in the platform data directory (e.g. ~/.local/share/oconsole)
# history_file = "~/.oconsole_history"
# command_log = "~/.oconsole_commands"
# memory_file = "~/oconsole-memory.md"
"#;

impl Settings {
    /// Load user configuration from default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("oconsole").join("config.toml"))
    }

    /// Create a default configuration file with comments
    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path()?;
        Self::create_default_at(&path)?;
        Ok(path)
    }

    pub fn create_default_at(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists: {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        fs::write(path, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}
