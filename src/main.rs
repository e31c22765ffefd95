//! webrag CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use webrag::{
    commands::{cmd_ask, cmd_config, cmd_init, print_answer, print_config, print_init, InitOptions},
    config::Config,
    error::Result,
    pipeline::AnswerOptions,
};

#[derive(Parser)]
#[command(name = "webrag")]
#[command(version, about = "Answer questions from live web sources with cited RAG", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "WEBRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question from web sources
    Ask {
        /// The question
        query: String,

        /// Search results to fetch
        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        /// Per-page fetch timeout in seconds
        #[arg(long)]
        fetch_timeout: Option<u64>,

        /// Simultaneous page fetches
        #[arg(long)]
        concurrency: Option<usize>,

        /// Passages retrieved for the prompt
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Passage characters allowed in the prompt
        #[arg(long)]
        max_context_chars: Option<usize>,

        /// Passages indexed per run
        #[arg(long)]
        max_passages: Option<usize>,

        /// Embedding model (must match the configured model)
        #[arg(long)]
        embedding_model: Option<String>,

        /// Generation model
        #[arg(short, long)]
        model: Option<String>,

        /// End-to-end deadline in seconds
        #[arg(long)]
        deadline: Option<u64>,

        /// Minimum similarity score for passages sent to the model
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// Write the default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Config,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, log_json: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let (plain, json) = if log_json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "webrag", &mut std::io::stdout());
        }

        Commands::Init { force } => {
            let config_path = cli.config.unwrap_or_else(Config::default_config_path);
            let config = cmd_init(InitOptions { config_path, force })?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_init(&config);
            }
        }

        Commands::Config => {
            let config = load_config(cli.config)?;
            let report = cmd_config(&config);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_config(&report)?;
            }
        }

        Commands::Ask {
            query,
            max_results,
            fetch_timeout,
            concurrency,
            top_k,
            max_context_chars,
            max_passages,
            embedding_model,
            model,
            deadline,
            min_score,
        } => {
            let config = load_config(cli.config)?;
            let options = AnswerOptions {
                max_results,
                fetch_timeout: fetch_timeout.map(Duration::from_secs),
                fetch_concurrency: concurrency,
                top_k,
                max_context_chars,
                embedding_model_id: embedding_model,
                generation_model_id: model,
                max_passages,
                deadline: deadline.map(Duration::from_secs),
                min_score,
            };

            let report = cmd_ask(&config, &query, options).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_answer(&report);
            }
            report.into_result()?;
        }
    }

    Ok(())
}

/// Load the given config file, or the default one when it exists
fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(&path),
        None => Config::load_from(None),
    }
}
