//! llm-core: Shared library for OpenAI-compatible chat completion
//!
//! Provides:
//! - Connection configuration with per-provider defaults
//! - Chat message and tool schema types
//! - Chat client with retry, tool calling and streaming support

pub mod chat;
pub mod client;
pub mod config;

pub use chat::{ChatMessage, FunctionCall, FunctionDefinition, Role, ToolCall, ToolDefinition};
pub use client::{
    collect_text, parse_completion, parse_sse_line, ChatClient, ChatError, OpenAiClient,
    RetryConfig, SseLine, TextStream,
};
pub use config::{Config, Provider};
