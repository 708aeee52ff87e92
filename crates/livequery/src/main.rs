// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! livequery - distributed live query campaigns.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use livequery_config::{ConfigError, LiveQueryConfig};

/// livequery - run SQL-like queries across a fleet of hosts in real time.
#[derive(Parser, Debug)]
#[command(name = "livequery", version, about, long_about = None)]
struct Cli {
    /// Load this config file instead of searching the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the campaign engine and its HTTP/WebSocket gateway.
    Serve,
    /// Validate the configuration and exit.
    CheckConfig,
}

fn load_config(path: Option<&std::path::Path>) -> Result<LiveQueryConfig, Vec<ConfigError>> {
    match path {
        Some(path) => livequery_config::load_and_validate_path(path),
        None => livequery_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            livequery_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("livequery: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig) => {
            println!(
                "livequery: config OK (gateway={}:{}, database={}, viewers={})",
                config.gateway.host,
                config.gateway.port,
                config.storage.database_path,
                config.gateway.bearer_tokens.len()
            );
        }
        None => {
            println!("livequery: use --help for available commands");
        }
    }
}
