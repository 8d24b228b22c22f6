//! Write-only game snapshots.
//!
//! The session saves the whole [`Game`] after every state change, overwriting
//! the previous snapshot of the same game. Snapshots are an audit trail; the
//! server never reads them back.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::game::Game;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, game: &Game) -> Result<()>;
}

/// Game id derived from the session start time, with a short random suffix
/// so two sessions started in the same second don't share a file.
pub fn snapshot_key(started_at: DateTime<Utc>, session: Uuid) -> String {
    format!(
        "game_{}_{}",
        started_at.format("%Y%m%d_%H%M%S"),
        &session.simple().to_string()[..8]
    )
}

pub struct JsonFileStore {
    games_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(games_dir: &Path) -> Self {
        Self {
            games_dir: games_dir.to_path_buf(),
        }
    }

    pub fn path_for(&self, game_id: &str) -> PathBuf {
        self.games_dir.join(format!("{}.json", game_id))
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn save(&self, game: &Game) -> Result<()> {
        tokio::fs::create_dir_all(&self.games_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create games directory: {}",
                    self.games_dir.display()
                )
            })?;

        let path = self.path_for(&game.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(game).context("Failed to serialize game snapshot")?;
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write snapshot: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace snapshot: {}", path.display()))?;
        Ok(())
    }
}

/// Keeps every saved snapshot in memory. For tests and `--offline` dry runs.
#[derive(Default)]
pub struct MemoryStore {
    snapshots: Mutex<Vec<Game>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<Game> {
        self.snapshots
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<Game> {
        self.snapshots.lock().ok().and_then(|s| s.last().cloned())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save(&self, game: &Game) -> Result<()> {
        self.snapshots
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot store lock poisoned"))?
            .push(game.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Player, Role, SNAPSHOT_SCHEMA_VERSION};
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn game(id: &str) -> Game {
        Game::new(id, vec![Player::new(1, "A", Role::Villager, true)])
    }

    #[test]
    fn key_uses_timestamp_and_short_suffix() {
        let started = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        let key = snapshot_key(started, Uuid::nil());
        assert_eq!(key, "game_20250309_140507_00000000");
    }

    #[tokio::test]
    async fn save_overwrites_the_same_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(&dir.path().join("games"));
        let mut g = game("game_1");
        store.save(&g).await.unwrap();
        g.day = 4;
        store.save(&g).await.unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path().join("games")).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let saved: Game =
            serde_json::from_str(&fs::read_to_string(store.path_for("game_1")).unwrap()).unwrap();
        assert_eq!(saved.day, 4);
        assert_eq!(saved.schema_version, SNAPSHOT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn memory_store_keeps_history() {
        let store = MemoryStore::new();
        store.save(&game("a")).await.unwrap();
        store.save(&game("b")).await.unwrap();
        assert_eq!(store.snapshots().len(), 2);
        assert_eq!(store.last().unwrap().id, "b");
    }

    #[tokio::test]
    async fn unwritable_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("games");
        fs::write(&blocker, "not a directory").unwrap();

        let err = JsonFileStore::new(&blocker)
            .save(&game("game_1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to create games directory"));
    }
}
