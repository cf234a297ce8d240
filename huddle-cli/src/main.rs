//! Command-line client for Huddle chats.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use shared::config::client::ClientConfig;
use tracing_subscriber::EnvFilter;
use url::Url;
use uuid::Uuid;

mod commands;

use cli::client::api::ApiClient;
use commands::{
    follow::FollowArgs,
    messages::{DeleteArgs, EditArgs, HistoryArgs, SendArgs},
};

/// Huddle CLI
#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Read, send and follow Huddle chat messages", long_about = None)]
struct Cli {
    /// Server base URL; overrides the config file and `HUDDLE_SERVER_URL`
    #[arg(long, global = true)]
    server: Option<Url>,

    /// Profile id to act as, forwarded to the server's auth header
    #[arg(long, global = true, env = "HUDDLE_PROFILE_ID")]
    profile: Option<Uuid>,

    /// Client configuration file (yaml, json or toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    History(HistoryArgs),
    Send(SendArgs),
    Edit(EditArgs),
    Delete(DeleteArgs),
    Follow(FollowArgs),

    /// Generate shell completion scripts for the CLI
    Completion {
        /// Target shell (bash, zsh, fish, powershell, elvish)
        #[arg(long, short)]
        shell: clap_complete::Shell,
    },

    /// Print or write the default client configuration
    Config {
        /// Output format: yaml, json or toml
        #[arg(long, short, default_value = "yaml")]
        format: String,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Resolved settings and an API client acting as one profile.
#[derive(Debug)]
pub struct Session {
    pub api: ApiClient,
    pub config: ClientConfig,
}

impl Session {
    fn connect(cli: &Cli) -> Result<Self> {
        let Some(profile_id) = cli.profile else {
            bail!("a profile id is required; pass --profile or set HUDDLE_PROFILE_ID");
        };

        let mut config =
            ClientConfig::load(cli.config.as_deref()).context("failed to load client config")?;
        if let Some(server) = cli.server.clone() {
            config = config.with_server_url(server);
        }

        let api = ApiClient::new(config.server_url.clone(), profile_id, config.fetch_timeout())
            .context("failed to build HTTP client")?;
        Ok(Self { api, config })
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Completion { shell } => commands::completion::generate_completion(*shell),
        Commands::Config { format, output } => {
            commands::config::generate_config(format, output.as_deref())?;
        }
        Commands::History(args) => {
            commands::messages::history(&Session::connect(&cli)?, args).await?;
        }
        Commands::Send(args) => commands::messages::send(&Session::connect(&cli)?, args).await?,
        Commands::Edit(args) => commands::messages::edit(&Session::connect(&cli)?, args).await?,
        Commands::Delete(args) => {
            commands::messages::delete(&Session::connect(&cli)?, args).await?;
        }
        Commands::Follow(args) => commands::follow::follow(Session::connect(&cli)?, args).await?,
    }

    Ok(())
}
