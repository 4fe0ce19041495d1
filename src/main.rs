//! droid-container command line entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use droid_container::commands::{CheckConfigCommand, StartCommand};

/// Application name
const APP_NAME: &str = "droid-container";

#[derive(Parser)]
#[command(name = "droid-container", version, about = "Managed Android emulator container")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the emulator and hold it until Ctrl-C
    Start {
        /// Container configuration file
        #[arg(long)]
        config: PathBuf,
        /// Override the AVD name
        #[arg(long)]
        avd: Option<String>,
        /// Override the bootup timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Print the ready device as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file and show the resolved SDK tools
    CheckConfig {
        /// Container configuration file
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    info!("{} v{} starting...", APP_NAME, droid_container::core::VERSION);

    let cli = Cli::parse();
    match cli.command {
        Commands::Start {
            config,
            avd,
            timeout,
            json,
        } => {
            StartCommand {
                config_path: config,
                avd,
                timeout,
                json,
            }
            .execute()
            .await
        }
        Commands::CheckConfig { config } => {
            CheckConfigCommand {
                config_path: config,
            }
            .execute()
            .await
        }
    }
}
