//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use answerline_core::inference::EMPTY_MESSAGE;
use answerline_core::{
    InferenceClient, PipelineCoordinator, Reply, Status, StatusSink, list_models,
};
use answerline_search::{SearchOrchestrator, format_listing};
use answerline_shared::{
    AnswerlineError, AppConfig, InferenceConfig, PipelineConfig, Query, SearchConfig, Turn, init_config,
    load_config, load_config_from,
};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Answerline: answers from a local model, backed by fresh web results.
#[derive(Parser)]
#[command(
    name = "answerline",
    version,
    about = "Ask a locally hosted model; questions ending in '?' are answered from a web search.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.answerline/answerline.toml.
    #[arg(long, global = true, env = "ANSWERLINE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Answer a single query and exit.
    Ask {
        /// Query text.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Model to use (defaults to inference.default_model).
        #[arg(short, long)]
        model: Option<String>,

        /// Never search, even for questions.
        #[arg(long)]
        no_search: bool,
    },

    /// Interactive chat with in-memory history.
    Chat {
        /// Model to use (defaults to inference.default_model).
        #[arg(short, long)]
        model: Option<String>,

        /// Never search, even for questions.
        #[arg(long)]
        no_search: bool,

        /// Do not keep conversation history between turns.
        #[arg(long)]
        no_history: bool,
    },

    /// Show the search listing for a query without asking the model.
    Search {
        /// Query text.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Describe an image file with a vision model.
    Describe {
        /// Path to the image.
        image: PathBuf,

        /// Question about the image (defaults to "What is in this picture?").
        #[arg(short, long)]
        prompt: Option<String>,

        /// Model to use (defaults to inference.default_model).
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List locally installed models.
    Models,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "answerline=info",
        1 => "answerline=debug",
        _ => "answerline=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Ask {
            query,
            model,
            no_search,
        } => {
            let config = resolve_config(config_path.as_ref())?;
            cmd_ask(&config, &query.join(" "), model, !no_search).await
        }
        Command::Chat {
            model,
            no_search,
            no_history,
        } => {
            let config = resolve_config(config_path.as_ref())?;
            cmd_chat(&config, model, !no_search, !no_history).await
        }
        Command::Search { query } => {
            let config = resolve_config(config_path.as_ref())?;
            cmd_search(&config, &query.join(" ")).await
        }
        Command::Describe {
            image,
            prompt,
            model,
        } => {
            let config = resolve_config(config_path.as_ref())?;
            cmd_describe(&config, &image, prompt.as_deref(), model).await
        }
        Command::Models => {
            let config = resolve_config(config_path.as_ref())?;
            cmd_models(&config).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_ref()).await,
        },
    }
}

/// Load the config file (or defaults) and validate it.
fn resolve_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    config.validate()?;
    Ok(config)
}

/// Wire the inference client and, when enabled, the search orchestrator.
fn build_coordinator(config: &AppConfig) -> Result<PipelineCoordinator> {
    let inference = Arc::new(InferenceClient::new(InferenceConfig::from(config)));
    let mut coordinator = PipelineCoordinator::new(PipelineConfig::from(config), inference);

    if config.search.enabled {
        let search = SearchOrchestrator::new(SearchConfig::from(config))?;
        coordinator = coordinator.with_search(Arc::new(search));
    }

    Ok(coordinator)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(config: &AppConfig, text: &str, model: Option<String>, search: bool) -> Result<()> {
    let coordinator = build_coordinator(config)?;
    let model = model.unwrap_or_else(|| config.inference.default_model.clone());

    info!(model = %model, search, "asking");

    let query = Query::new(text, model);
    let reply = answer_with_spinner(&coordinator, &query, search).await;
    print_reply(&reply);

    Ok(())
}

async fn cmd_chat(
    config: &AppConfig,
    model: Option<String>,
    search: bool,
    mut keep_history: bool,
) -> Result<()> {
    let coordinator = build_coordinator(config)?;
    let mut model = model.unwrap_or_else(|| config.inference.default_model.clone());
    let mut history: Vec<Turn> = Vec::new();
    let max_turns = config.history.max_turns;

    println!("Model: {model}. End a question with '?' to search the web.");
    println!("{CHAT_HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = parse_chat_command(line) {
            match command {
                ChatCommand::Quit => break,
                ChatCommand::Clear => {
                    history.clear();
                    println!("History cleared.");
                }
                ChatCommand::ShowHistory => {
                    let state = if keep_history { "on" } else { "off" };
                    println!("History is {state}.");
                    print_history(&history);
                }
                ChatCommand::History(on) => {
                    keep_history = on;
                    if on {
                        println!("History enabled.");
                    } else {
                        history.clear();
                        println!("History disabled and cleared.");
                    }
                }
                ChatCommand::Model(None) => println!("Current model: {model}"),
                ChatCommand::Model(Some(name)) => {
                    model = name;
                    println!("Model set to {model}");
                }
                ChatCommand::Unknown(name) => {
                    println!("Unknown command {name}. {CHAT_HELP}");
                }
            }
            continue;
        }

        let query = Query::new(line, model.clone()).with_history(history.clone());
        let reply = answer_with_spinner(&coordinator, &query, search).await;
        print_reply(&reply);

        if keep_history && reply.outcome.is_answer() {
            push_turn(&mut history, Turn::new(line, reply.chunks.join("\n\n")), max_turns);
        }
    }

    Ok(())
}

async fn cmd_describe(
    config: &AppConfig,
    image: &Path,
    prompt: Option<&str>,
    model: Option<String>,
) -> Result<()> {
    let bytes = tokio::fs::read(image)
        .await
        .map_err(|e| AnswerlineError::io(image, e))?;
    let model = model.unwrap_or_else(|| config.inference.default_model.clone());
    let inference = InferenceClient::new(InferenceConfig::from(config));

    info!(model = %model, image = %image.display(), bytes = bytes.len(), "describing image");

    let status = CliStatus::new();
    let outcome = inference.describe_image(&bytes, prompt, &model).await;
    status.finish();

    let mut chunks = answerline_format::format(&outcome.message(), config.output.chunk_limit);
    if chunks.is_empty() {
        chunks.push(EMPTY_MESSAGE.to_string());
    }
    print_chunks(&chunks);
    Ok(())
}

async fn cmd_search(config: &AppConfig, text: &str) -> Result<()> {
    let orchestrator = SearchOrchestrator::new(SearchConfig::from(config))?;
    let results = orchestrator.try_search(text).await?;
    println!("{}", format_listing(&results));
    Ok(())
}

async fn cmd_models(config: &AppConfig) -> Result<()> {
    let models = list_models(&config.inference.list_command).await;
    if models.is_empty() {
        return Err(eyre!(
            "no models found; is `{}` installed and working?",
            config.inference.list_command.join(" ")
        ));
    }
    for name in &models {
        let marker = if *name == config.inference.default_model { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&PathBuf>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

async fn answer_with_spinner(
    coordinator: &PipelineCoordinator,
    query: &Query,
    search: bool,
) -> Reply {
    let status = CliStatus::new();
    let reply = coordinator.answer(query, search, &status).await;
    status.finish();
    reply
}

fn print_reply(reply: &Reply) {
    print_chunks(&reply.chunks);
}

/// Print each chunk as its own message.
fn print_chunks(chunks: &[String]) {
    let last = chunks.len().saturating_sub(1);
    for (i, chunk) in chunks.iter().enumerate() {
        println!("{chunk}");
        if i < last {
            println!();
        }
    }
}

const CHAT_HELP: &str = "Commands: /history [on|off], /clear, /model <name>, /quit";

/// In-chat command entered with a leading `/`.
#[derive(Debug, PartialEq, Eq)]
enum ChatCommand {
    Quit,
    Clear,
    ShowHistory,
    /// `/history on` or `/history off`.
    History(bool),
    /// `/model` shows the current model, `/model <name>` switches.
    Model(Option<String>),
    Unknown(String),
}

/// Parse a chat line as a command. Lines not starting with `/` are queries.
fn parse_chat_command(line: &str) -> Option<ChatCommand> {
    let rest = line.trim().strip_prefix('/')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match (name, arg) {
        ("quit" | "exit", _) => ChatCommand::Quit,
        ("clear", _) => ChatCommand::Clear,
        ("history", "") => ChatCommand::ShowHistory,
        ("history", "on") => ChatCommand::History(true),
        ("history", "off") => ChatCommand::History(false),
        ("model", "") => ChatCommand::Model(None),
        ("model", name) => ChatCommand::Model(Some(name.to_string())),
        _ => ChatCommand::Unknown(format!("/{rest}")),
    };
    Some(command)
}

fn print_history(history: &[Turn]) {
    if history.is_empty() {
        println!("History is empty.");
        return;
    }
    for (i, turn) in history.iter().enumerate() {
        println!("{}. You: {}", i + 1, turn.user);
        println!("   Model: {}", turn.assistant);
    }
}

/// Append a turn, dropping the oldest ones beyond `max_turns`.
fn push_turn(history: &mut Vec<Turn>, turn: Turn, max_turns: usize) {
    history.push(turn);
    if history.len() > max_turns {
        let excess = history.len() - max_turns;
        history.drain(..excess);
    }
}

// ---------------------------------------------------------------------------
// CLI status reporter
// ---------------------------------------------------------------------------

/// Status notices rendered on an indicatif spinner.
struct CliStatus {
    spinner: ProgressBar,
}

impl CliStatus {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.set_message("Thinking...");
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl StatusSink for CliStatus {
    fn notify(&self, status: Status) {
        self.spinner.set_message(status.message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_most_recent_turns() {
        let mut history = Vec::new();
        for i in 0..5 {
            push_turn(&mut history, Turn::new(format!("q{i}"), format!("a{i}")), 3);
        }
        let users: Vec<&str> = history.iter().map(|t| t.user.as_str()).collect();
        assert_eq!(users, vec!["q2", "q3", "q4"]);
    }

    #[test]
    fn chat_commands_toggle_history() {
        assert_eq!(parse_chat_command("/history on"), Some(ChatCommand::History(true)));
        assert_eq!(parse_chat_command("  /history   off "), Some(ChatCommand::History(false)));
        assert_eq!(parse_chat_command("/history"), Some(ChatCommand::ShowHistory));
        assert_eq!(
            parse_chat_command("/history maybe"),
            Some(ChatCommand::Unknown("/history maybe".into()))
        );
    }

    #[test]
    fn chat_commands_parse_model_and_quit() {
        assert_eq!(parse_chat_command("/model"), Some(ChatCommand::Model(None)));
        assert_eq!(
            parse_chat_command("/model qwen3:14b"),
            Some(ChatCommand::Model(Some("qwen3:14b".into())))
        );
        assert_eq!(parse_chat_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_chat_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_chat_command("what is rust?"), None);
    }

    #[test]
    fn cli_parses_describe() {
        let cli = Cli::try_parse_from(["answerline", "describe", "cat.jpg", "-p", "Which breed?"]).unwrap();
        match cli.command {
            Command::Describe { image, prompt, model } => {
                assert_eq!(image, PathBuf::from("cat.jpg"));
                assert_eq!(prompt.as_deref(), Some("Which breed?"));
                assert!(model.is_none());
            }
            _ => panic!("expected describe"),
        }
    }

    #[test]
    fn cli_parses_ask_with_flags() {
        let cli = Cli::try_parse_from(["answerline", "ask", "--no-search", "-m", "llama3", "is", "it", "raining?"])
            .unwrap();
        match cli.command {
            Command::Ask {
                query,
                model,
                no_search,
            } => {
                assert_eq!(query.join(" "), "is it raining?");
                assert_eq!(model.as_deref(), Some("llama3"));
                assert!(no_search);
            }
            _ => panic!("expected ask"),
        }
    }
}
