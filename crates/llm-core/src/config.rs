//! Connection configuration for the chat-completion service
//!
//! Starts from per-provider defaults; callers layer their own values
//! (flags, `HOST`/`API_KEY`/`MODEL`/`PROVIDER`) on top with the `with_*`
//! builders. The resulting `Config` is built once and handed to the client
//! constructor.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Which kind of OpenAI-compatible service we talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// api.openai.com or any hosted OpenAI-compatible endpoint
    #[default]
    OpenAi,
    /// Local Ollama server through its `/v1` compatibility layer
    Ollama,
}

impl Provider {
    /// Host used when none is configured
    pub fn default_host(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Model used when none is configured
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Ollama => "llama3.1",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::Ollama => write!(f, "ollama"),
        }
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "open-ai" | "generic" => Ok(Provider::OpenAi),
            "ollama" => Ok(Provider::Ollama),
            other => bail!("Unknown provider '{}' (expected 'openai' or 'ollama')", other),
        }
    }
}

/// Connection settings for the chat-completion client
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    /// Base URL, e.g. `http://localhost:11434/v1`
    pub host: String,
    /// Bearer token (optional for local servers)
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_provider(Provider::default())
    }
}

impl Config {
    /// Defaults for a provider
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider,
            host: provider.default_host().to_string(),
            api_key: None,
            model: provider.default_model().to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Endpoint for chat completions
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.host.trim_end_matches('/'))
    }
}
