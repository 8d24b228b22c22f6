//! Configuration view and validation commands (`werewolf config`).

use std::path::Path;

use anyhow::{Context, Result, bail};

use werewolf::config::WerewolfToml;

use crate::ConfigCommands;

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Werewolf Configuration");
            println!("======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                WerewolfToml::load(config_path)?
            } else {
                println!("No config file at {}, using defaults.", config_path.display());
                WerewolfToml::default()
            };
            println!();

            let rendered =
                toml::to_string_pretty(&toml).context("Failed to render configuration")?;
            println!("{}", rendered);

            println!("API keys (from environment):");
            let _ = dotenvy::dotenv();
            for (name, var) in [
                ("llm", &toml.llm.api_key_env),
                ("tts", &toml.tts.api_key_env),
            ] {
                let state = if std::env::var(var).is_ok_and(|v| !v.trim().is_empty()) {
                    "set"
                } else {
                    "not set"
                };
                println!("  {} = {} ({})", name, var, state);
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No config file found. Using defaults (valid).");
                return Ok(());
            }

            let toml = WerewolfToml::load(config_path)?;
            let problems = toml.validate();
            if !problems.is_empty() {
                println!("Configuration problems:");
                for problem in &problems {
                    println!("  - {}", problem);
                }
                println!();
                bail!("{} problem(s) in {}", problems.len(), config_path.display());
            }
            println!("Configuration is valid.");
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("Config file already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            WerewolfToml::default().save(config_path)?;

            println!("Created {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [game] seats, role counts and pacing");
            println!("  - [llm] provider, model and api_key_env");
            println!("  - [nicknames] and [personas] per seat");
            println!();
        }
    }

    Ok(())
}
