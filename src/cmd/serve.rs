//! Game server command (`werewolf serve`).

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use werewolf::config::{CliOverrides, Settings};
use werewolf::server::{ServerConfig, start_server};
use werewolf::session::{SessionConfig, SessionManager};
use werewolf::telemetry::init_tracing;

pub async fn cmd_serve(config_path: &Path, cli: CliOverrides) -> Result<()> {
    // configuration faults stop us before any game exists
    let settings = Settings::load(config_path, cli).context("Configuration error")?;

    let _guard = init_tracing(settings.verbose, &settings.toml.storage.logs_dir)?;
    info!(
        config = %settings.config_path.display(),
        offline = settings.offline,
        players = settings.toml.game.players,
        "Configuration loaded"
    );

    let session_config =
        SessionConfig::from_settings(&settings).context("Failed to prepare game sessions")?;
    let manager = SessionManager::new(Arc::new(session_config));

    start_server(
        ServerConfig {
            addr: settings.bind_addr(),
            dev_mode: settings.dev,
        },
        manager,
    )
    .await
}
