//! Server configuration read from `werewolf.toml`.
//!
//! Every section has serde defaults, so a missing file or an empty one yields
//! the stock game: eight seats (two werewolves, one seer, five villagers), the
//! human in seat 7, a 60 second discussion and three reasoning-engine
//! attempts with a one second base delay.
//!
//! Values are layered file → environment → CLI. The environment supplies API
//! keys (the file only names the variable) and may be seeded from `.env`.
//!
//! ```toml
//! [game]
//! players = 8
//! human_player_id = 7
//! werewolves = 2
//! seers = 1
//! villagers = 5
//! discussion_secs = 60
//! speech_delay_secs = { min = 2.0, max = 4.0 }
//!
//! [nicknames]
//! 1 = "Ash"
//!
//! [agents]
//! pool_size = 4
//!
//! [agents.retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//!
//! [llm]
//! provider = "ollama"
//! api_url = "http://localhost:11434/api/generate"
//! model = "qwen2.5:14b-instruct"
//!
//! [llm.params.call_types.vote]
//! temperature = 0.6
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::agent::DecisionKind;
use crate::decision::RetryPolicy;
use crate::errors::ConfigError;
use crate::game::{PlayerId, Role, RoleCounts, TableSpec};
use crate::schedule::{DiscussionSettings, TurnSettings};

pub const DEFAULT_CONFIG_FILE: &str = "werewolf.toml";

/// Inclusive range of seconds, drawn from uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SecsRange {
    pub min: f64,
    pub max: f64,
}

impl SecsRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn problems(&self, name: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if !(self.min >= 0.0 && self.max >= 0.0) {
            problems.push(format!("{} must not be negative", name));
        }
        if self.min > self.max {
            problems.push(format!(
                "{} has min {} greater than max {}",
                name, self.min, self.max
            ));
        }
        problems
    }
}

/// Table layout and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSection {
    #[serde(default = "default_players")]
    pub players: usize,
    #[serde(default = "default_human_player_id")]
    pub human_player_id: PlayerId,
    #[serde(default = "default_werewolves")]
    pub werewolves: usize,
    #[serde(default = "default_seers")]
    pub seers: usize,
    #[serde(default = "default_villagers")]
    pub villagers: usize,
    #[serde(default = "default_discussion_secs")]
    pub discussion_secs: u64,
    /// Simulated thinking time before an ordered AI speech
    #[serde(default = "default_speech_delay_secs")]
    pub speech_delay_secs: SecsRange,
    /// Chance an AI player speaks at each discussion opportunity
    #[serde(default = "default_discussion_probability")]
    pub discussion_probability: f64,
    #[serde(default = "default_discussion_interval_secs")]
    pub discussion_interval_secs: SecsRange,
    /// Speakers stop rescheduling once less than this remains
    #[serde(default = "default_discussion_min_remaining_secs")]
    pub discussion_min_remaining_secs: f64,
}

fn default_players() -> usize {
    8
}

fn default_human_player_id() -> PlayerId {
    7
}

fn default_werewolves() -> usize {
    2
}

fn default_seers() -> usize {
    1
}

fn default_villagers() -> usize {
    5
}

fn default_discussion_secs() -> u64 {
    60
}

fn default_speech_delay_secs() -> SecsRange {
    SecsRange::new(2.0, 4.0)
}

fn default_discussion_probability() -> f64 {
    0.25
}

fn default_discussion_interval_secs() -> SecsRange {
    SecsRange::new(5.0, 15.0)
}

fn default_discussion_min_remaining_secs() -> f64 {
    5.0
}

impl Default for GameSection {
    fn default() -> Self {
        Self {
            players: default_players(),
            human_player_id: default_human_player_id(),
            werewolves: default_werewolves(),
            seers: default_seers(),
            villagers: default_villagers(),
            discussion_secs: default_discussion_secs(),
            speech_delay_secs: default_speech_delay_secs(),
            discussion_probability: default_discussion_probability(),
            discussion_interval_secs: default_discussion_interval_secs(),
            discussion_min_remaining_secs: default_discussion_min_remaining_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter: f64,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_attempt_timeout_secs() -> u64 {
    30
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: 0.0,
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsSection {
    /// Upper bound on concurrent reasoning-engine calls per decision
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub retry: RetrySection,
}

fn default_pool_size() -> usize {
    4
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            retry: RetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    OpenaiCompatible,
    Ollama,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::OpenaiCompatible => write!(f, "openai_compatible"),
            Provider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai_compatible" | "openai" => Ok(Provider::OpenaiCompatible),
            "ollama" => Ok(Provider::Ollama),
            _ => Err(ConfigError::UnknownProvider(s.to_string())),
        }
    }
}

/// Sampling parameters. Unset fields inherit from the layer below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
}

impl GenerationParams {
    fn with(temperature: f64, top_p: Option<f64>, max_tokens: Option<u32>) -> Self {
        Self {
            temperature: Some(temperature),
            top_p,
            max_tokens,
            ..Self::default()
        }
    }

    /// Fields set in `other` win.
    pub fn overlay(&mut self, other: &GenerationParams) {
        if other.temperature.is_some() {
            self.temperature = other.temperature;
        }
        if other.top_p.is_some() {
            self.top_p = other.top_p;
        }
        if other.max_tokens.is_some() {
            self.max_tokens = other.max_tokens;
        }
        if other.presence_penalty.is_some() {
            self.presence_penalty = other.presence_penalty;
        }
        if other.frequency_penalty.is_some() {
            self.frequency_penalty = other.frequency_penalty;
        }
    }
}

/// Generation parameters with per-kind and per-role overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsSection {
    #[serde(default = "default_params")]
    pub defaults: GenerationParams,
    /// Keyed by decision kind: speech, vote, kill, seer_check
    #[serde(default = "default_call_type_params")]
    pub call_types: BTreeMap<String, GenerationParams>,
    /// Keyed by role: werewolf, seer, villager
    #[serde(default = "default_role_params")]
    pub roles: BTreeMap<String, GenerationParams>,
}

fn default_params() -> GenerationParams {
    GenerationParams {
        temperature: Some(0.8),
        top_p: Some(0.9),
        max_tokens: None,
        presence_penalty: Some(0.0),
        frequency_penalty: Some(0.0),
    }
}

fn default_call_type_params() -> BTreeMap<String, GenerationParams> {
    BTreeMap::from([
        (
            "speech".to_string(),
            GenerationParams {
                presence_penalty: Some(0.1),
                frequency_penalty: Some(0.2),
                ..GenerationParams::with(0.9, Some(0.95), None)
            },
        ),
        (
            "vote".to_string(),
            GenerationParams::with(0.6, Some(0.8), Some(200)),
        ),
        (
            "kill".to_string(),
            GenerationParams::with(0.7, Some(0.85), Some(150)),
        ),
        (
            "seer_check".to_string(),
            GenerationParams::with(0.5, Some(0.8), Some(100)),
        ),
    ])
}

fn default_role_params() -> BTreeMap<String, GenerationParams> {
    BTreeMap::from([
        (
            "werewolf".to_string(),
            GenerationParams {
                presence_penalty: Some(0.15),
                ..GenerationParams::with(0.85, None, None)
            },
        ),
        (
            "seer".to_string(),
            GenerationParams {
                frequency_penalty: Some(0.1),
                ..GenerationParams::with(0.75, None, None)
            },
        ),
        (
            "villager".to_string(),
            GenerationParams::with(0.8, None, None),
        ),
    ])
}

impl Default for ParamsSection {
    fn default() -> Self {
        Self {
            defaults: default_params(),
            call_types: default_call_type_params(),
            roles: default_role_params(),
        }
    }
}

impl ParamsSection {
    /// Merge defaults, then the decision kind, then the role.
    pub fn resolve(&self, kind: DecisionKind, role: Role) -> GenerationParams {
        let mut params = self.defaults.clone();
        if let Some(kind_params) = self.call_types.get(kind.as_str()) {
            params.overlay(kind_params);
        }
        if let Some(role_params) = self.roles.get(&role.to_string()) {
            params.overlay(role_params);
        }
        params
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default = "default_llm_api_url")]
    pub api_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub params: ParamsSection,
}

fn default_llm_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_api_key_env() -> String {
    "WEREWOLF_LLM_API_KEY".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            api_url: default_llm_api_url(),
            model: default_llm_model(),
            api_key_env: default_llm_api_key_env(),
            params: ParamsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tts_api_url")]
    pub api_url: String,
    #[serde(default = "default_tts_model")]
    pub model: String,
    #[serde(default = "default_tts_api_key_env")]
    pub api_key_env: String,
    /// Voice name per seat, keyed by player id
    #[serde(default)]
    pub voices: BTreeMap<String, String>,
}

fn default_tts_api_url() -> String {
    "https://api.openai.com/v1/audio/speech".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_api_key_env() -> String {
    "WEREWOLF_TTS_API_KEY".to_string()
}

impl Default for TtsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_tts_api_url(),
            model: default_tts_model(),
            api_key_env: default_tts_api_key_env(),
            voices: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_games_dir")]
    pub games_dir: PathBuf,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
}

fn default_games_dir() -> PathBuf {
    PathBuf::from("games")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            games_dir: default_games_dir(),
            logs_dir: default_logs_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Root of `werewolf.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WerewolfToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub game: GameSection,
    /// Display names keyed by player id
    #[serde(default)]
    pub nicknames: BTreeMap<String, String>,
    /// Character notes handed to the reasoning engine, keyed by player id
    #[serde(default)]
    pub personas: BTreeMap<String, String>,
    #[serde(default)]
    pub agents: AgentsSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub tts: TtsSection,
    #[serde(default)]
    pub storage: StorageSection,
}

impl WerewolfToml {
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse werewolf.toml")
    }

    /// Returns the stock configuration if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> std::result::Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize werewolf.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn role_counts(&self) -> RoleCounts {
        RoleCounts {
            werewolves: self.game.werewolves,
            seers: self.game.seers,
            villagers: self.game.villagers,
        }
    }

    pub fn nickname_map(&self) -> HashMap<PlayerId, String> {
        id_keyed(&self.nicknames)
    }

    pub fn persona_map(&self) -> HashMap<PlayerId, String> {
        id_keyed(&self.personas)
    }

    pub fn voice_map(&self) -> HashMap<PlayerId, String> {
        id_keyed(&self.tts.voices)
    }

    pub fn table_spec(&self) -> TableSpec {
        TableSpec {
            players: self.game.players,
            human_id: self.game.human_player_id,
            counts: self.role_counts(),
            nicknames: self.nickname_map(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.agents.retry;
        RetryPolicy {
            max_attempts: retry.max_attempts,
            base_delay: Duration::from_millis(retry.base_delay_ms),
            multiplier: retry.multiplier,
            max_delay: Duration::from_millis(retry.max_delay_ms),
            jitter: retry.jitter,
            attempt_timeout: Duration::from_secs(retry.attempt_timeout_secs),
        }
    }

    pub fn turn_settings(&self) -> TurnSettings {
        TurnSettings {
            speech_delay: self.game.speech_delay_secs,
            speech_timeout: Duration::from_secs(self.agents.retry.attempt_timeout_secs),
        }
    }

    pub fn discussion_settings(&self) -> DiscussionSettings {
        DiscussionSettings {
            duration: Duration::from_secs(self.game.discussion_secs),
            interval: self.game.discussion_interval_secs,
            probability: self.game.discussion_probability,
            min_remaining: Duration::from_secs_f64(self.game.discussion_min_remaining_secs.max(0.0)),
            speech_timeout: Duration::from_secs(self.agents.retry.attempt_timeout_secs),
        }
    }

    /// Every problem with the configuration. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let game = &self.game;

        if game.players < 3 {
            problems.push(format!("game.players must be at least 3, got {}", game.players));
        }
        let roles = self.role_counts().total();
        if roles != game.players {
            problems.push(format!(
                "role counts (werewolves {} + seers {} + villagers {} = {}) must equal game.players ({})",
                game.werewolves, game.seers, game.villagers, roles, game.players
            ));
        }
        if game.werewolves == 0 {
            problems.push("game.werewolves must be at least 1".to_string());
        }
        if game.seers > 1 {
            problems.push(format!("game.seers must be 0 or 1, got {}", game.seers));
        }
        if game.human_player_id == 0 || game.human_player_id as usize > game.players {
            problems.push(format!(
                "game.human_player_id must be within 1..={}, got {}",
                game.players, game.human_player_id
            ));
        }
        if game.discussion_secs == 0 {
            problems.push("game.discussion_secs must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&game.discussion_probability) {
            problems.push(format!(
                "game.discussion_probability must be within [0, 1], got {}",
                game.discussion_probability
            ));
        }
        if game.discussion_min_remaining_secs < 0.0 {
            problems.push("game.discussion_min_remaining_secs must not be negative".to_string());
        }
        problems.extend(game.speech_delay_secs.problems("game.speech_delay_secs"));
        problems.extend(
            game.discussion_interval_secs
                .problems("game.discussion_interval_secs"),
        );
        if game.discussion_interval_secs.max <= 0.0 {
            problems.push("game.discussion_interval_secs max must be positive".to_string());
        }

        for (section, map) in [
            ("nicknames", &self.nicknames),
            ("personas", &self.personas),
            ("tts.voices", &self.tts.voices),
        ] {
            for key in map.keys() {
                match key.parse::<PlayerId>() {
                    Ok(id) if id >= 1 && id as usize <= game.players => {}
                    _ => problems.push(format!("{} key '{}' is not a seat number", section, key)),
                }
            }
        }

        let agents = &self.agents;
        if agents.pool_size == 0 {
            problems.push("agents.pool_size must be at least 1".to_string());
        }
        if agents.retry.max_attempts == 0 {
            problems.push("agents.retry.max_attempts must be at least 1".to_string());
        }
        if agents.retry.multiplier < 1.0 {
            problems.push(format!(
                "agents.retry.multiplier must be at least 1.0, got {}",
                agents.retry.multiplier
            ));
        }
        if !(0.0..=1.0).contains(&agents.retry.jitter) {
            problems.push(format!(
                "agents.retry.jitter must be within [0, 1], got {}",
                agents.retry.jitter
            ));
        }
        if agents.retry.attempt_timeout_secs == 0 {
            problems.push("agents.retry.attempt_timeout_secs must be at least 1".to_string());
        }

        for key in self.llm.params.call_types.keys() {
            if !["speech", "vote", "kill", "seer_check"].contains(&key.as_str()) {
                problems.push(format!("llm.params.call_types has unknown kind '{}'", key));
            }
        }
        for key in self.llm.params.roles.keys() {
            if !["werewolf", "seer", "villager"].contains(&key.as_str()) {
                problems.push(format!("llm.params.roles has unknown role '{}'", key));
            }
        }

        problems
    }
}

fn id_keyed(map: &BTreeMap<String, String>) -> HashMap<PlayerId, String> {
    map.iter()
        .filter_map(|(key, value)| Some((key.parse::<PlayerId>().ok()?, value.clone())))
        .collect()
}

/// Values supplied on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub offline: bool,
    pub dev: bool,
    pub verbose: bool,
}

/// Fully resolved configuration for a running server.
#[derive(Debug, Clone)]
pub struct Settings {
    pub toml: WerewolfToml,
    pub config_path: PathBuf,
    pub offline: bool,
    pub dev: bool,
    pub verbose: bool,
    pub llm_api_key: Option<String>,
    pub tts_api_key: Option<String>,
}

impl Settings {
    /// Load the file, read keys from the environment, then apply CLI flags.
    ///
    /// Fails on an unreadable file, on any validation problem, and on a
    /// missing API key for a provider that needs one unless running offline.
    pub fn load(config_path: &Path, cli: CliOverrides) -> std::result::Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut toml = WerewolfToml::load_or_default(config_path)?;
        if let Some(host) = cli.host {
            toml.server.host = host;
        }
        if let Some(port) = cli.port {
            toml.server.port = port;
        }

        let problems = toml.validate();
        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }

        let llm_api_key = env_value(&toml.llm.api_key_env);
        let tts_api_key = env_value(&toml.tts.api_key_env);
        let settings = Self {
            toml,
            config_path: config_path.to_path_buf(),
            offline: cli.offline,
            dev: cli.dev,
            verbose: cli.verbose,
            llm_api_key,
            tts_api_key,
        };
        settings.ensure_engine_ready()?;
        Ok(settings)
    }

    fn ensure_engine_ready(&self) -> std::result::Result<(), ConfigError> {
        if self.offline || self.toml.llm.provider == Provider::Ollama {
            return Ok(());
        }
        if self.llm_api_key.is_none() {
            return Err(ConfigError::MissingApiKey {
                provider: self.toml.llm.provider.to_string(),
                env_var: self.toml.llm.api_key_env.clone(),
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.toml.server.host, self.toml.server.port)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}
