//! Typed error hierarchy for the werewolf server.
//!
//! The enums follow the lifetime of a game:
//! - `ConfigError`: startup configuration faults (fatal, no game is created)
//! - `RosterError`: a game cannot be dealt from the configured role counts
//! - `AgentError`: a single reasoning-engine attempt failed (retried, then absorbed)
//! - `IntentRejection`: a client intent was refused without touching state
//! - `SessionError`: a session could not continue and must be discarded
//! - `TtsError`: speech synthesis failed (logged, never blocks the game)

use std::path::PathBuf;

use thiserror::Error;

use crate::game::PlayerId;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),

    #[error("Reasoning engine provider '{provider}' has no API key (set {env_var})")]
    MissingApiKey { provider: String, env_var: String },

    #[error("Unknown reasoning engine provider '{0}'. Valid values: openai_compatible, ollama")]
    UnknownProvider(String),
}

/// Errors raised when dealing a new game.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("Role counts add up to {roles} but the table has {players} seats")]
    CountMismatch { players: usize, roles: usize },

    #[error("Human seat {human_id} is outside 1..={players}")]
    HumanSeatOutOfRange { human_id: PlayerId, players: usize },
}

/// Failure of a single reasoning-engine attempt.
///
/// Every variant feeds the same retry-then-fallback policy; `is_retryable`
/// only distinguishes transport trouble from answers that were received but
/// unusable, which matters for logging.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AgentError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Attempt timed out after {secs:.1}s")]
    Timeout { secs: f64 },

    #[error("Provider returned HTTP {status}")]
    Status { status: u16 },

    #[error("Engine gave no answer")]
    NoAnswer,

    #[error("Target {target} is not one of {legal:?}")]
    InvalidTarget { target: PlayerId, legal: Vec<PlayerId> },

    #[error("Malformed engine response: {0}")]
    Malformed(String),
}

impl AgentError {
    /// Network-level failures, as opposed to answers that were unusable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Transport(_) | AgentError::Timeout { .. } | AgentError::Status { .. }
        )
    }
}

/// Reasons an inbound client intent was refused. Never mutates state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntentRejection {
    #[error("No game is running for this connection")]
    NoSession,

    #[error("A game is already running")]
    AlreadyStarted,

    #[error("'{intent}' is not accepted right now")]
    Inactive { intent: &'static str },

    #[error("Invalid target")]
    InvalidTarget,

    #[error("Player {0} cannot be chosen")]
    IllegalTarget(PlayerId),

    #[error("Speech text is empty")]
    EmptySpeech,

    #[error("You are no longer alive")]
    HumanEliminated,
}

/// Errors that end a session. They are reported to the client and the
/// session is discarded; the host process keeps running.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error("Session was cancelled before the game ended")]
    Cancelled,

    #[error("Client disconnected while the game was waiting for input")]
    Disconnected,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the speech synthesis collaborator.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("No voice configured for player {0}")]
    NoVoice(PlayerId),

    #[error("TTS request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("TTS provider returned HTTP {0}")]
    Status(u16),
}
