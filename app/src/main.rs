mod command;

use crate::command::Command;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use store::{DocumentManager, StoreConfig};
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// One document API over mongodb, elasticsearch, postgresql and sqlite.
#[derive(Parser)]
#[command(name = "doctracks")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML file with the engine and entity definitions
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging();
    let cli = Cli::parse();

    let config = match StoreConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    let manager = match DocumentManager::connect(&config).await {
        Ok(manager) => manager,
        Err(err) => {
            error!("Could not connect: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let result = command::run(&manager, cli.command).await;
    if let Err(err) = manager.close().await {
        error!("Could not close cleanly: {}", err);
    }
    match result {
        Ok(output) => {
            println!("{:#}", output);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{} ({})", err, err.status());
            ExitCode::FAILURE
        }
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {}", err);
    }
}
