//! Integration tests for the werewolf binary
//!
//! These tests drive the CLI end to end: configuration commands and the
//! start-up checks of `serve`.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a werewolf Command
fn werewolf() -> Command {
    let mut cmd = cargo_bin_cmd!("werewolf");
    cmd.env_remove("WEREWOLF_LLM_API_KEY")
        .env_remove("WEREWOLF_TTS_API_KEY");
    cmd
}

fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        werewolf()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("config"));
    }

    #[test]
    fn test_version() {
        werewolf()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("werewolf"));
    }

    #[test]
    fn test_serve_help_lists_overrides() {
        werewolf()
            .args(["serve", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--port"))
            .stdout(predicate::str::contains("--offline"));
    }

    #[test]
    fn test_unknown_command_fails() {
        werewolf().arg("howl").assert().failure();
    }
}

// =============================================================================
// Config Command Tests
// =============================================================================

mod config_commands {
    use super::*;

    #[test]
    fn test_init_writes_default_file() {
        let dir = temp_dir();

        werewolf()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created werewolf.toml"));

        let content = fs::read_to_string(dir.path().join("werewolf.toml")).unwrap();
        assert!(content.contains("[game]"));
        assert!(content.contains("human_player_id"));
    }

    #[test]
    fn test_init_keeps_existing_file() {
        let dir = temp_dir();
        fs::write(dir.path().join("werewolf.toml"), "[game]\nplayers = 8\n").unwrap();

        werewolf()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(dir.path().join("werewolf.toml")).unwrap();
        assert_eq!(content, "[game]\nplayers = 8\n");
    }

    #[test]
    fn test_validate_default_file() {
        let dir = temp_dir();
        werewolf()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success();

        werewolf()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid"));
    }

    #[test]
    fn test_validate_without_file_uses_defaults() {
        let dir = temp_dir();
        werewolf()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Using defaults"));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let dir = temp_dir();
        fs::write(
            dir.path().join("werewolf.toml"),
            r#"
[game]
players = 8
werewolves = 0
seers = 2
villagers = 6
human_player_id = 9
"#,
        )
        .unwrap();

        werewolf()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("game.werewolves must be at least 1"))
            .stdout(predicate::str::contains("game.seers must be 0 or 1"))
            .stdout(predicate::str::contains("game.human_player_id"));
    }

    #[test]
    fn test_validate_unparsable_file_fails() {
        let dir = temp_dir();
        fs::write(dir.path().join("werewolf.toml"), "[game\nplayers = ").unwrap();

        werewolf()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure();
    }

    #[test]
    fn test_show_prints_effective_config() {
        let dir = temp_dir();
        fs::write(
            dir.path().join("custom.toml"),
            "[server]\nport = 6123\n\n[nicknames]\n1 = \"Mara\"\n",
        )
        .unwrap();

        werewolf()
            .current_dir(dir.path())
            .args(["--config", "custom.toml", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Config file: custom.toml"))
            .stdout(predicate::str::contains("6123"))
            .stdout(predicate::str::contains("Mara"))
            .stdout(predicate::str::contains("WEREWOLF_LLM_API_KEY (not set)"));
    }
}

// =============================================================================
// Serve Start-up Tests
// =============================================================================

mod serve_startup {
    use super::*;

    #[test]
    fn test_serve_refuses_invalid_config() {
        let dir = temp_dir();
        fs::write(dir.path().join("werewolf.toml"), "[game]\nplayers = 2\n").unwrap();

        werewolf()
            .current_dir(dir.path())
            .args(["serve", "--offline"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Configuration error"));
    }

    #[test]
    fn test_serve_requires_api_key_unless_offline() {
        let dir = temp_dir();

        werewolf()
            .current_dir(dir.path())
            .arg("serve")
            .assert()
            .failure()
            .stderr(predicate::str::contains("WEREWOLF_LLM_API_KEY"));
    }
}
