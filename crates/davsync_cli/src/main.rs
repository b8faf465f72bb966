//! davsync CLI
//!
//! Command-line tools for inspecting collections through the change-tracking
//! layer.
//!
//! # Commands
//!
//! - `ctag` - Serve a ctag poll and print the raw response
//! - `changes` - Print the change report for a collection and token
//! - `token` - Encode or decode composite sync tokens
//! - `config` - Print the effective configuration

mod commands;

use clap::{Parser, Subcommand};
use davsync_server::{ServerConfig, StoreBackendConfig};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// davsync change-tracking tools.
#[derive(Parser)]
#[command(name = "davsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Path to a JSON store snapshot (overrides the configured store)
    #[arg(global = true, short, long)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a ctag poll for /<script>/<user>/<collection>
    Ctag {
        /// Request path
        path: String,

        /// Request URI echoed in the response (defaults to the path)
        #[arg(short, long)]
        uri: Option<String>,

        /// PROPFIND body file; the poll is only served for a ctag-only body
        #[arg(short, long)]
        body: Option<PathBuf>,
    },

    /// Print the changes to a collection since a sync token
    Changes {
        /// Collection id
        collection: String,

        /// Client sync token (omit for initial sync)
        #[arg(short, long)]
        token: Option<String>,

        /// Best-effort change limit
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Encode or decode a composite sync token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Print the effective configuration as JSON
    Config,

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum TokenAction {
    /// Encode calendar and task versions
    Encode {
        /// Calendar stream version
        calendar: u64,
        /// Task stream version
        tasks: Option<u64>,
    },
    /// Decode a wire token
    Decode {
        /// Wire token
        token: String,
    },
}

fn load_config(cli: &Cli) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(path) = &cli.store {
        config.store = StoreBackendConfig::Snapshot { path: path.clone() };
    }
    debug!(config = ?cli.config, store = ?config.store, "configuration loaded");
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Ctag { path, uri, body } => {
            let uri = uri.unwrap_or_else(|| path.clone());
            commands::ctag::run(config, &uri, &path, body.as_deref())?;
        }
        Commands::Changes {
            collection,
            token,
            limit,
        } => {
            commands::changes::run(config, &collection, token.as_deref(), limit)?;
        }
        Commands::Token { action } => match action {
            TokenAction::Encode { calendar, tasks } => {
                println!("{}", commands::token::encode(calendar, tasks));
            }
            TokenAction::Decode { token } => {
                println!("{}", commands::token::decode(&token)?);
            }
        },
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Version => {
            println!("davsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
