//! gql-uploadr - GraphQL upload relay
//!
//! Accepts files over GraphQL and forwards them to a hosted media API.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use gql_uploadr::{config::Config, server::Server};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

/// gql-uploadr - relay GraphQL file uploads to a hosted media API
#[derive(Parser, Debug)]
#[command(name = "gql-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (environment is used when it does not exist)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(args.log_level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    match args.log_format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish())?,
    }
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        let config = Config::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    } else {
        let config = Config::from_env().context("Failed to load configuration from environment")?;
        info!("No configuration file at {:?}, using environment", path);
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // .env is optional
    let _ = dotenvy::dotenv();

    init_logging(&args)?;

    info!("Starting gql-uploadr v{}", gql_uploadr::VERSION);

    let config = load_config(&args.config)?;

    if args.check_config {
        info!("Configuration is valid");
        println!("Configuration OK");
        return Ok(());
    }

    let server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
