#![cfg_attr(not(test), forbid(unsafe_code))]
#![warn(clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

//! Main entry point for the Huddle server binary.

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ::server::{commands, server};
use shared::config::server::Config;
use std::error::Error;
use std::path::PathBuf;

/// Main CLI structure for the Huddle server
#[derive(Parser)]
#[command(name = "huddle-server")]
#[command(about = "Message history and live delivery server for Huddle", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the server
    Serve {
        /// Port to bind, overriding configuration and environment
        #[arg(long, short)]
        port: Option<u16>,

        /// Path to a configuration file (yaml, json or toml)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Generate the OpenAPI document
    Spec {
        /// Output file (format from extension), or "json"/"yaml" for stdout
        output_path: Option<String>,
    },
}

/// Loads configuration and runs the server until shutdown.
///
/// # Errors
/// Returns an error if configuration loading or server startup fails.
pub async fn handle_serve_command(
    port: Option<u16>,
    config: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let resolved_config = Config::load_config(config.as_deref(), port)?;
    server::run(resolved_config).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => handle_serve_command(port, config).await,
        Commands::Spec { output_path } => commands::spec::generate_spec(output_path.as_deref()),
    }
}
