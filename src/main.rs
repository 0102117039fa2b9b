use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codebase_time_machine::topic::TopicRegistry;
use codebase_time_machine::types::AnalysisResult;
use codebase_time_machine::{AnalysisClient, AnalyzeRequest, Config};
use std::path::PathBuf;
use std::process::ExitCode;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "CTM_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level regardless of configuration
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze how a topic evolved in a repository
    Analyze {
        /// Repository URL or local path git can clone from
        repository_url: String,

        /// Topic to analyze
        #[arg(short, long, default_value = "auth")]
        topic: String,

        /// Follow-up question answered from the selected commits
        #[arg(short, long)]
        question: Option<String>,

        /// Print single-line JSON
        #[arg(long)]
        compact: bool,
    },
    /// List known topics and their keywords
    Topics,
    /// Print the effective configuration as TOML
    Config,
    /// Print the JSON Schema of the analysis result
    Schema,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default().context("Failed to load configuration")?,
    };
    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config.logging.tracing_level()?
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config, cli.verbose)?;

    match cli.command {
        Command::Analyze {
            repository_url,
            topic,
            question,
            compact,
        } => {
            let client = AnalysisClient::with_config(config)?;
            let mut request = AnalyzeRequest::new(repository_url, topic);
            request.question = question;

            match client.analyze(request).await {
                Ok(result) => print_json(&result, compact)?,
                Err(e) => {
                    eprintln!("Error: {}", e.to_user_string());
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Topics => {
            let registry = TopicRegistry::with_overrides(&config.topics);
            for topic in registry.iter() {
                println!("{}: {}", topic.name, topic.keywords.join(", "));
            }
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
        Command::Schema => {
            let schema = schemars::schema_for!(AnalysisResult);
            print_json(&schema, false)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
