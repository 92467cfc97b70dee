mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use strata::config::StrataConfig;
use strata::error::StartupError;
use strata::server;

#[derive(Parser)]
#[command(name = "strata", version, about = "Semantic object store with concurrent batch ingestion")]
struct Cli {
    /// Config file (defaults to ~/.strata/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Check the database, schema state and startup prerequisites
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StrataConfig::load_from(path)?,
        None => StrataConfig::load()?,
    };

    // Log to stderr so stdout stays clean for `doctor` output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            if let Err(e) = server::serve(config).await {
                if let Some(startup) = e.downcast_ref::<StartupError>() {
                    tracing::error!(error = %startup, "fatal startup error");
                    std::process::exit(startup.exit_code());
                }
                return Err(e);
            }
        }
        Command::Doctor => {
            cli::doctor::doctor(&config)?;
        }
    }

    Ok(())
}
