//! Sabang CLI - Database migrations and configuration tools.
//!
//! # Usage
//!
//! ```bash
//! # Create the session store schema
//! sabang migrate
//!
//! # Validate the web front end's environment
//! sabang config check
//!
//! # Print a fresh SABANG_SESSION_SECRET
//! sabang config secret
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::io::Write;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "sabang")]
#[command(author, version, about = "Sabang CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the session store schema
    Migrate,
    /// Inspect or generate configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate configuration from the environment
    Check,
    /// Generate a session secret
    Secret,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::sessions().await?,
        Commands::Config { action } => match action {
            ConfigAction::Check => commands::config::check()?,
            ConfigAction::Secret => {
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{}", commands::config::generate_secret())?;
            }
        },
    }

    Ok(())
}
