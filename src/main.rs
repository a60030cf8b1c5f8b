//! Finam Trade Assistant CLI
//!
//! Command-line front door for the tool-execution core. Tool envelopes go to
//! stdout, logs go to stderr.

use clap::{Parser, Subcommand};
use finam_trade_assistant::runner::envelope;
use finam_trade_assistant::{AssistantRunner, Config, Error, Result, ToolInvocationRequest};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "finam-assistant")]
#[command(about = "Tool-execution core for an LLM trading assistant on Finam TradeAPI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Invoke one tool and print its result envelope
    Call {
        /// Tool name, e.g. get_quotes
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
    },

    /// Serve newline-delimited tool invocations on stdin/stdout
    Serve,

    /// List the tool catalogue
    Tools {
        /// Render in OpenAI function-calling format
        #[arg(long)]
        openai: bool,
    },

    /// Show the effective configuration
    Config,
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(filter)
        .init();
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Call { tool, args } => run_call(config, tool, args).await,
        Commands::Serve => run_serve(config).await,
        Commands::Tools { openai } => run_tools(config, openai),
        Commands::Config => print_json(&config),
    }
}

fn build_runner(config: Config) -> Result<AssistantRunner> {
    let secret = Config::secret_from_env()?;
    AssistantRunner::new(config, secret)
}

async fn run_call(config: Config, tool: String, args: Option<String>) -> Result<()> {
    let arguments = match args {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| Error::Validation(vec![format!("--args is not valid JSON: {}", e)]))?,
        None => serde_json::json!({}),
    };

    let runner = build_runner(config)?;
    let result = runner
        .invoke(ToolInvocationRequest::new(tool, arguments))
        .await;
    print_json(&envelope(&result, None))
}

async fn run_serve(config: Config) -> Result<()> {
    let runner = build_runner(config)?;
    tracing::info!(
        tools = runner.registry().len(),
        base_url = %runner.config().api.base_url,
        "Serving tool invocations on stdin"
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    runner.serve(stdin, tokio::io::stdout()).await
}

fn run_tools(config: Config, openai: bool) -> Result<()> {
    // The catalogue needs no secret; a placeholder keeps the stack buildable
    let secret = Config::secret_from_env()
        .unwrap_or_else(|_| secrecy::SecretString::from(String::new()));
    let runner = AssistantRunner::new(config, secret)?;

    if openai {
        print_json(&runner.registry().openai_tools())
    } else {
        print_json(&runner.registry().descriptors())
    }
}
