#![cfg_attr(not(test), forbid(unsafe_code))]

//! Entry point for the `docchat` server binary.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::config::server::Config;
use std::path::PathBuf;

/// Document chat server
#[derive(Debug, Parser)]
#[command(name = "docchat")]
#[command(about = "Chat with your documents over HTTP and server-sent events", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind, overriding the configuration file and environment.
        #[arg(long, short)]
        port: Option<u16>,

        /// Configuration file (`.yaml`, `.yml`, `.toml` or `.json`).
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

async fn handle_serve_command(port: Option<u16>, config: Option<PathBuf>) -> anyhow::Result<()> {
    let resolved = Config::load_config(config, port).context("loading configuration")?;
    server::server::run(resolved).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => handle_serve_command(port, config).await,
    }
}
