//! oconsole: terminal agent for shell tasks
//!
//! Turns a natural-language goal into a short, bounded sequence of tool calls
//! (plan, whitelisted commands, generated commands, files) against any
//! OpenAI-compatible chat-completion service.

mod agent;
mod config;
mod history;
mod repl;
mod session;
mod storage;
mod tokenizer;
mod tools;
mod ui;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use llm_core::{Config, Provider};
use tracing_subscriber::EnvFilter;

use crate::agent::Outcome;
use crate::config::Settings;
use crate::session::{Session, SessionOptions};
use crate::tools::{ToolCatalog, ToolKind};
use crate::ui::{BOLD, CYAN, DIM, GREEN, RED, RESET, YELLOW};

#[derive(Debug, Parser)]
#[command(name = "oconsole")]
#[command(about = "Your programmatic AI command assistant", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Base URL of the chat-completion service
    #[arg(long, env = "HOST", global = true)]
    host: Option<String>,

    /// API key sent as a bearer token
    #[arg(long, env = "API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Model name
    #[arg(short, long, env = "MODEL", global = true)]
    model: Option<String>,

    /// Service flavor: openai or ollama
    #[arg(long, env = "PROVIDER", global = true)]
    provider: Option<String>,

    /// Model requests per goal (overrides config)
    #[arg(long, global = true)]
    max_steps: Option<usize>,

    /// Run generated commands without asking
    #[arg(short, long, global = true)]
    yes: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Hide agent steps; print only the result
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the interactive console (default)
    Chat,

    /// Run a single goal and exit
    Run {
        /// The goal, in plain words
        #[arg(required = true)]
        goal: Vec<String>,
    },

    /// List the tools the agent can call
    Tools {
        /// Print the raw tool schemas
        #[arg(long)]
        json: bool,
    },

    /// Write a commented default config file
    Init,

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Some(Commands::Tools { json }) => print_tools(*json),
        Some(Commands::Init) => init(),
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(*shell, &mut Cli::command(), "oconsole", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Run { goal }) => run_once(&cli, &goal.join(" ")).await,
        Some(Commands::Chat) | None => {
            let session = open_session(&cli)?;
            repl::run_repl(session).await
        }
    }
}

fn connection(cli: &Cli) -> Result<Config> {
    let provider: Provider = match cli.provider.as_deref() {
        Some(p) if !p.trim().is_empty() => p.parse()?,
        _ => Provider::default(),
    };

    let mut config = Config::for_provider(provider).with_api_key(cli.api_key.clone());
    if let Some(host) = cli.host.as_deref().filter(|h| !h.trim().is_empty()) {
        config = config.with_host(host);
    }
    if let Some(model) = cli.model.as_deref().filter(|m| !m.trim().is_empty()) {
        config = config.with_model(model);
    }
    Ok(config)
}

fn open_session(cli: &Cli) -> Result<Session> {
    let settings = Settings::load().context("Failed to load configuration")?;
    let options = SessionOptions {
        auto_approve: cli.yes,
        verbose: !cli.quiet,
        max_steps: cli.max_steps,
    };
    Session::new(connection(cli)?, settings, options)
}

async fn run_once(cli: &Cli, goal: &str) -> Result<()> {
    let mut session = open_session(cli)?;
    let report = session.run_goal(goal).await;

    if cli.quiet {
        if let Some(answer) = report.answer() {
            println!("{}", answer);
        }
        return Ok(());
    }

    // Final answers and the step limit are already shown by the agent
    match &report.outcome {
        Outcome::NoAction => {
            println!("{}The agent finished without taking an action.{}", YELLOW, RESET)
        }
        Outcome::Interrupted => println!("{}Interrupted.{}", RED, RESET),
        Outcome::Done(_) | Outcome::StepLimitExceeded => {}
    }
    println!(
        "{}({} steps, {} tool calls){}",
        DIM, report.steps, report.dispatched, RESET
    );
    Ok(())
}

fn print_tools(json: bool) -> Result<()> {
    if json {
        let catalog = ToolCatalog::new();
        let text = serde_json::to_string_pretty(catalog.definitions())
            .context("Failed to serialize tool schemas")?;
        println!("{}", text);
        return Ok(());
    }

    println!("{}Available tools:{}", BOLD, RESET);
    for kind in ToolKind::ALL {
        println!(
            "  {}{:<24}{} {}[{}]{}",
            CYAN,
            kind.name(),
            RESET,
            DIM,
            kind.security_level(),
            RESET
        );
        println!("    {}", kind.description());
    }
    Ok(())
}

fn init() -> Result<()> {
    let path = Settings::create_default()?;
    println!("{}✔ Created{} {}", GREEN, RESET, path.display());
    Ok(())
}
