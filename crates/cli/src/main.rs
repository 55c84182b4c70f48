//! citycode CLI: the main entry point.
//!
//! Commands:
//! - `run`   : Run one task, or read tasks line by line
//! - `brain` : Run a Brain/Worker session against a target
//! - `config`: Print the effective or default configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "citycode",
    about = "citycode: LLM task agent with Brain/Worker orchestration",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.citycode/config.toml)
    #[arg(short, long, global = true, env = "CITYCODE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task through the agent
    Run {
        /// The task; without it, tasks are read from stdin one per line
        #[arg(short, long)]
        prompt: Option<String>,

        /// Repository context mode: none, ast or rag
        #[arg(long)]
        context_mode: Option<String>,

        /// File whose contents are used as repository context
        #[arg(long)]
        context_file: Option<PathBuf>,
    },

    /// Run a Brain/Worker session
    Brain {
        /// Target to work on (host, IP, URL)
        #[arg(short, long)]
        target: String,

        /// What the session should achieve
        #[arg(short, long, default_value = "Gain access to the target")]
        goal: String,

        /// Brain system prompt
        #[arg(long, conflicts_with = "prompt_file")]
        prompt: Option<String>,

        /// Read the brain system prompt from a file
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// Override brain.max_iterations
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Show configuration
    Config {
        /// Print the built-in defaults instead of the effective config
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            prompt,
            context_mode,
            context_file,
        } => commands::run::run(config, prompt, context_mode, context_file).await?,
        Commands::Brain {
            target,
            goal,
            prompt,
            prompt_file,
            max_iterations,
        } => commands::brain::run(config, target, goal, prompt, prompt_file, max_iterations).await?,
        Commands::Config { default } => commands::config_cmd::show(config, default)?,
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
