//! Game sessions: one per connected client.
//!
//! - [`events`]: the client protocol and the input flags gating it
//! - [`machine`]: the phase state machine that plays one game
//! - [`manager`]: creates, feeds and destroys sessions by connection id

pub mod events;
pub mod machine;
pub mod manager;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::agent::{LlmEngine, OfflineEngine, ReasoningEngine};
use crate::config::Settings;
use crate::decision::RetryPolicy;
use crate::game::{PlayerId, TableSpec};
use crate::persistence::{JsonFileStore, SnapshotStore};
use crate::schedule::{DiscussionSettings, TurnSettings};
use crate::tts::{HttpSynthesizer, SpeechSynthesizer};

pub use events::{ClientView, InputFlags, Intent, Notification, StartOptions};
pub use machine::{GameSession, SessionLink};
pub use manager::SessionManager;

/// Everything a new session needs, shared by all sessions of a server.
pub struct SessionConfig {
    pub table: TableSpec,
    pub engine: Arc<dyn ReasoningEngine>,
    pub policy: RetryPolicy,
    pub pool_size: usize,
    pub turns: TurnSettings,
    pub discussion: DiscussionSettings,
    pub personas: HashMap<PlayerId, String>,
    pub store: Arc<dyn SnapshotStore>,
    pub tts: Option<Arc<dyn SpeechSynthesizer>>,
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let toml = &settings.toml;
        let policy = toml.retry_policy();

        let engine: Arc<dyn ReasoningEngine> = if settings.offline {
            info!("Offline mode, agents answer at random");
            Arc::new(OfflineEngine::new(None))
        } else {
            info!(
                provider = %toml.llm.provider,
                model = %toml.llm.model,
                "Using reasoning engine"
            );
            Arc::new(LlmEngine::new(
                &toml.llm,
                settings.llm_api_key.clone(),
                policy.attempt_timeout,
            )?)
        };

        let tts: Option<Arc<dyn SpeechSynthesizer>> = if toml.tts.enabled && !settings.offline {
            Some(Arc::new(HttpSynthesizer::new(
                &toml.tts,
                toml.voice_map(),
                settings.tts_api_key.clone(),
            )?))
        } else {
            None
        };

        Ok(Self {
            table: toml.table_spec(),
            engine,
            policy,
            pool_size: toml.agents.pool_size,
            turns: toml.turn_settings(),
            discussion: toml.discussion_settings(),
            personas: toml.persona_map(),
            store: Arc::new(JsonFileStore::new(&toml.storage.games_dir)),
            tts,
        })
    }
}
