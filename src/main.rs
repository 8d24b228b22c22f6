use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use werewolf::config::DEFAULT_CONFIG_FILE;

mod cmd;

#[derive(Parser)]
#[command(name = "werewolf")]
#[command(version, about = "Werewolf game server with reasoning-engine players")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the game server
    Serve {
        /// Interface to bind (overrides [server] host)
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on (overrides [server] port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Play against a random local engine instead of the configured provider
        #[arg(long)]
        offline: bool,

        /// Enable dev mode (CORS permissive for a local front-end dev server)
        #[arg(long)]
        dev: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and list every problem
    Validate,
    /// Write a default werewolf.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            host,
            port,
            offline,
            dev,
        } => {
            cmd::cmd_serve(
                &cli.config,
                werewolf::config::CliOverrides {
                    host: host.clone(),
                    port: *port,
                    offline: *offline,
                    dev: *dev,
                    verbose: cli.verbose,
                },
            )
            .await?;
        }
        Commands::Config { command } => cmd::cmd_config(&cli.config, command.clone())?,
    }

    Ok(())
}
