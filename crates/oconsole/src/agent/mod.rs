//! Agent framework: a bounded plan-then-execute loop over tool calls

mod agent_loop;
pub mod prompt;
mod state;

pub use agent_loop::AgentLoop;
pub use state::{AgentConfig, AgentReport, CommandRecord, Outcome, DEFAULT_MAX_STEPS};
