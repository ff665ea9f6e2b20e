//! Interactive REPL
//!
//! Provides:
//! - Readline-like input with persistent history
//! - Slash commands for inspecting and resetting the session
//! - Agent runs for everything else, cancellable with Ctrl-C

use anyhow::{Context, Result};
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use futures::StreamExt;
use llm_core::TextStream;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::fs;
use std::future::Future;
use std::io::{stdout, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::agent::prompt::{EXECUTING_PROMPT, PLANNING_PROMPT};
use crate::agent::Outcome;
use crate::session::{wait_for_interrupt, Session};
use crate::tools::builtin::expand_tilde;
use crate::tools::ToolKind;
use crate::ui::{self, BLUE, BOLD, CYAN, DIM, GREEN, MAGENTA, RED, RESET, YELLOW};

/// Commands shown by `/history`
const HISTORY_TAIL: usize = 20;

/// What the REPL does after handling a line
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Continue,
    Exit,
    Run(String),
}

struct ReplState {
    session: Session,
    /// Last goal sent to the agent, for `/last`
    last_prompt: Option<String>,
}

/// Run the interactive loop until `/exit` or EOF
pub async fn run_repl(session: Session) -> Result<()> {
    let history_path = session.settings().paths.history_path();
    let mut editor = DefaultEditor::new().context("Failed to initialize line editor")?;
    if history_path.exists() {
        if let Err(e) = editor.load_history(&history_path) {
            warn!(error = %e, "Failed to load input history");
        }
    }

    let mut state = ReplState {
        session,
        last_prompt: None,
    };
    print_welcome(&state.session);

    loop {
        let line = match editor.readline(&format!("{}›{} ", MAGENTA, RESET)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("{}(Use /exit to quit){}", DIM, RESET);
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("{}Exiting...{}", RED, RESET);
                break;
            }
            Err(e) => return Err(e).context("Failed to read input"),
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);
        println!();

        let action = if input.starts_with('/') {
            match handle_command(&mut state, input).await {
                Ok(action) => action,
                Err(e) => {
                    println!("{}Error:{} {:#}", RED, RESET, e);
                    Action::Continue
                }
            }
        } else {
            Action::Run(input.to_string())
        };

        match action {
            Action::Continue => println!(),
            Action::Exit => {
                println!("{}Exiting...{}", RED, RESET);
                break;
            }
            Action::Run(goal) => run_goal(&mut state, goal).await,
        }
    }

    if let Some(parent) = history_path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&history_path) {
        warn!(error = %e, "Failed to save input history");
    }

    Ok(())
}

async fn run_goal(state: &mut ReplState, goal: String) {
    let report = state.session.run_goal(&goal).await;
    debug!(outcome = %report.outcome, steps = report.steps, "Goal finished");

    if report.outcome == Outcome::Interrupted {
        println!();
        println!("{}Interrupted.{}", YELLOW, RESET);
    }
    state.last_prompt = Some(goal);
}

async fn handle_command(state: &mut ReplState, input: &str) -> Result<Action> {
    let (command, args) = match input.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a.trim()),
        None => (input, ""),
    };

    match command.to_lowercase().as_str() {
        "/exit" | "/quit" => return Ok(Action::Exit),
        "/help" => print_help(),
        "/new" | "/clear-memory" => {
            state.session.reset();
            println!(
                "{}✔ New session started. Conversational memory has been cleared.{}",
                GREEN, RESET
            );
        }
        "/cls" | "/clear-screen" => {
            execute!(stdout(), Clear(ClearType::All), MoveTo(0, 0))
                .context("Failed to clear screen")?;
            print_welcome(&state.session);
        }
        "/params" => print_params(&state.session),
        "/model" => println!("Current model: {}{}{}", BLUE, state.session.connection().model, RESET),
        "/endpoint" => println!(
            "Current endpoint: {}{}{}",
            BLUE,
            state.session.connection().completions_url(),
            RESET
        ),
        "/system" => {
            println!("{}{}PLANNING{}", CYAN, BOLD, RESET);
            println!("{}", ui::indent(PLANNING_PROMPT, "  "));
            println!();
            println!("{}{}EXECUTING{}", CYAN, BOLD, RESET);
            println!("{}", ui::indent(EXECUTING_PROMPT, "  "));
        }
        "/tools" => print_tools(),
        "/memory" => {
            let memory = state.session.memory().read()?;
            println!("{}", memory.trim_end());
        }
        "/history" => print_command_history(&state.session)?,
        "/last" => match state.last_prompt.clone() {
            Some(prompt) => {
                println!("{}› Re-running last prompt:{} {}{}{}", DIM, RESET, CYAN, prompt, RESET);
                return Ok(Action::Run(prompt));
            }
            None => println!("{}No previous prompt to re-run.{}", YELLOW, RESET),
        },
        "/explain" => explain(&state.session).await,
        "/save" => save_answer(&state.session, args)?,
        _ => {
            println!("{}Unknown command:{} {}", YELLOW, RESET, command);
            println!("Type /help for available commands");
        }
    }

    Ok(Action::Continue)
}

fn print_welcome(session: &Session) {
    println!("{}{}oconsole{}", MAGENTA, BOLD, RESET);
    println!("{}Your Programmatic AI Command Assistant{}", CYAN, RESET);
    println!();
    println!("  {}✓ Model:{}    {}", GREEN, RESET, session.connection().model);
    println!("  {}✓ Endpoint:{} {}", GREEN, RESET, session.connection().host);
    println!(
        "  {}✓ Agent:{}    plan, then up to {} steps",
        GREEN,
        RESET,
        session.agent().config().max_steps
    );
    println!();
    println!(
        "{}Ask a question, state a goal, or type /help for commands.{}",
        YELLOW, RESET
    );
    println!();
}

fn print_help() {
    let commands: &[(&str, &str)] = &[
        ("/help", "Show this help message"),
        ("/new, /clear-memory", "Start a new session, clearing conversational memory"),
        ("/exit, /quit", "Exit oconsole"),
        ("/cls, /clear-screen", "Clear the console screen"),
        ("/params", "Show current configuration parameters"),
        ("/model", "Show the current AI model"),
        ("/endpoint", "Show the current API endpoint"),
        ("/system", "Display the agent's system prompts"),
        ("/tools", "List all available tools for the agent"),
        ("/memory", "Display the memory log for this session"),
        ("/history", "Show recently executed generated commands"),
        ("/last", "Re-run the last prompt"),
        ("/explain", "Explain the output of the last command executed"),
        ("/save <file>", "Save the agent's last final answer to a file"),
    ];

    println!("{}oconsole commands:{}", BOLD, RESET);
    for (name, description) in commands {
        println!("  {}{:<22}{} {}", CYAN, name, RESET, description);
    }
    println!();
    println!("Anything else is sent to the agent as a goal. Ctrl-C cancels a running goal.");
}

fn print_params(session: &Session) {
    let connection = session.connection();
    let agent = &session.settings().agent;
    let history = session.agent().history();
    let budget = match history.max_tokens() {
        0 => "unlimited".to_string(),
        max => format!("{} tokens", max),
    };
    let usage = if history.is_empty() {
        "empty".to_string()
    } else {
        format!("{} turns, {} tokens", history.len(), history.token_count())
    };

    let rows = [
        ("Provider", connection.provider.to_string()),
        ("Model", connection.model.clone()),
        ("Endpoint", connection.host.clone()),
        ("API key", if connection.api_key.is_some() { "set" } else { "not set" }.to_string()),
        ("Max agent steps", session.agent().config().max_steps.to_string()),
        ("Memory budget", budget),
        ("Command timeout", format!("{}s", agent.command_timeout_secs)),
        ("History", usage),
    ];

    println!("{}Configuration Parameters:{}", BOLD, RESET);
    for (name, value) in rows {
        println!("  {}{:>16}:{} {}", GREEN, name, RESET, value);
    }
}

fn print_tools() {
    println!("{}Available Agent Tools:{}", BOLD, RESET);
    for kind in ToolKind::ALL {
        println!(
            "  {}{:<24}{} {}[{}]{} {}",
            CYAN,
            kind.name(),
            RESET,
            DIM,
            kind.security_level(),
            RESET,
            kind.description()
        );
    }
}

fn print_command_history(session: &Session) -> Result<()> {
    let commands = session.command_log().load()?;
    if commands.is_empty() {
        println!("{}No generated commands have been run yet.{}", DIM, RESET);
        return Ok(());
    }

    let skip = commands.len().saturating_sub(HISTORY_TAIL);
    println!("{}Recent commands:{}", BOLD, RESET);
    for (i, command) in commands.iter().enumerate().skip(skip) {
        println!("  {}{:>4}{}  {}", DIM, i + 1, RESET, command);
    }
    Ok(())
}

async fn explain(session: &Session) {
    let Some((command, stream)) = session.explain_last_command() else {
        println!(
            "{}No recent command output to explain. Run a command first.{}",
            YELLOW, RESET
        );
        return;
    };

    println!("{}{}Explanation for: `{}`{}", BLUE, BOLD, command, RESET);
    stream_explanation(stream, wait_for_interrupt()).await;
}

/// Print fragments as they arrive until the stream ends or `cancel` resolves.
///
/// Returns false when cancelled.
async fn stream_explanation(mut stream: TextStream, cancel: impl Future<Output = ()>) -> bool {
    let spinner = ui::spinner("Generating an explanation...");
    let mut started = false;
    tokio::pin!(cancel);

    loop {
        tokio::select! {
            fragment = stream.next() => {
                let Some(fragment) = fragment else { break };
                if !started {
                    spinner.finish_and_clear();
                    started = true;
                }
                print!("{}", fragment);
                let _ = stdout().flush();
            }
            _ = &mut cancel => {
                if !started {
                    spinner.finish_and_clear();
                }
                println!();
                println!("{}Interrupted.{}", YELLOW, RESET);
                debug!("Explanation interrupted by user");
                return false;
            }
        }
    }

    if !started {
        spinner.finish_and_clear();
        print!("Could not generate explanation.");
    }
    println!();
    true
}

fn save_answer(session: &Session, file: &str) -> Result<()> {
    if file.is_empty() {
        println!("{}Usage: /save <filename>{}", RED, RESET);
        return Ok(());
    }

    let Some(answer) = session.last_answer() else {
        println!("{}No previous answer to save.{}", YELLOW, RESET);
        return Ok(());
    };

    let path = absolute(expand_tilde(file))?;
    fs::write(&path, answer).with_context(|| format!("Failed to save {}", path.display()))?;
    println!("{}✔ Answer saved to{} {}{}{}", GREEN, RESET, CYAN, path.display(), RESET);
    Ok(())
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}
