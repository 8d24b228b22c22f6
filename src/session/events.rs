//! Messages exchanged with the client over the socket.
//!
//! Both directions use `{"type": ..., "data": {...}}` frames.

use serde::{Deserialize, Serialize};

use crate::decision::Tally;
use crate::errors::IntentRejection;
use crate::game::{Camp, CheckResult, Game, Phase, PlayerId, Role};

/// Per-seat display colours, cycled by id.
pub const PLAYER_COLORS: [&str; 12] = [
    "#ffb3ba", "#bae1ff", "#baffc9", "#ffffba", "#ffdfba", "#e0bbff", "#ffc9de", "#c9c9ff",
    "#f5c6a5", "#a5f5e0", "#e6a5f5", "#f5e6a5",
];

/// Server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notification {
    GameStarted {
        game_id: String,
    },
    PhaseUpdate {
        phase: Phase,
        day: u32,
    },
    LogMessage {
        message: String,
    },
    NewSpeech {
        player_id: PlayerId,
        nickname: String,
        text: String,
    },
    RequestSpeech,
    StartVoting {
        targets: Vec<PlayerId>,
    },
    VotingEnded {
        tally: Tally,
        eliminated: Option<PlayerId>,
    },
    StartDiscussion {
        seconds: u64,
    },
    DiscussionEnded,
    StartNightWerewolf {
        targets: Vec<PlayerId>,
        /// Living werewolves other than the human
        teammates: Vec<PlayerId>,
    },
    RequestSeerAction {
        targets: Vec<PlayerId>,
    },
    SeerResult {
        target: PlayerId,
        nickname: String,
        result: CheckResult,
    },
    GameState {
        view: ClientView,
    },
    GameEnd {
        winner: Camp,
        roles: Vec<DisclosedRole>,
    },
    PlayAudioChunk {
        player_id: PlayerId,
        sequence: u32,
        audio_base64: String,
    },
    ErrorMessage {
        message: String,
    },
    ReloadPage,
}

impl Notification {
    pub fn log(message: impl Into<String>) -> Self {
        Notification::LogMessage {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notification::ErrorMessage {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosedRole {
    pub player_id: PlayerId,
    pub nickname: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    #[serde(default)]
    pub voice_enabled: bool,
}

/// Client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Intent {
    StartGame(StartOptions),
    SendSpeech { text: String },
    SendVote { target: serde_json::Value },
    SendNightAction { target: serde_json::Value },
    SendSeerAction { target: serde_json::Value },
    SkipDiscussion,
    RestartGame,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::StartGame(_) => "start_game",
            Intent::SendSpeech { .. } => "send_speech",
            Intent::SendVote { .. } => "send_vote",
            Intent::SendNightAction { .. } => "send_night_action",
            Intent::SendSeerAction { .. } => "send_seer_action",
            Intent::SkipDiscussion => "skip_discussion",
            Intent::RestartGame => "restart_game",
        }
    }

    /// The target id of a targeted intent. Numbers and numeric strings are
    /// both accepted.
    pub fn target_id(&self) -> Result<Option<PlayerId>, IntentRejection> {
        match self {
            Intent::SendVote { target }
            | Intent::SendNightAction { target }
            | Intent::SendSeerAction { target } => parse_target(target).map(Some),
            _ => Ok(None),
        }
    }
}

fn parse_target(value: &serde_json::Value) -> Result<PlayerId, IntentRejection> {
    let id = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    id.and_then(|id| PlayerId::try_from(id).ok())
        .filter(|id| *id > 0)
        .ok_or(IntentRejection::InvalidTarget)
}

/// Which intents the session is accepting right now. Published by the
/// session task and checked before an intent is forwarded to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InputFlags {
    pub game_started: bool,
    pub human_alive: bool,
    pub awaiting_speech: bool,
    pub discussion_active: bool,
    pub voting_active: bool,
    pub night_active: bool,
    pub seer_active: bool,
}

impl InputFlags {
    /// Flags of a finished game: nothing but a restart is accepted.
    pub fn ended() -> Self {
        Self {
            game_started: true,
            ..Self::default()
        }
    }

    pub fn check(&self, intent: &Intent) -> Result<(), IntentRejection> {
        let open = match intent {
            Intent::StartGame(_) => {
                return if self.game_started {
                    Err(IntentRejection::AlreadyStarted)
                } else {
                    Ok(())
                };
            }
            Intent::RestartGame => return Ok(()),
            Intent::SendSpeech { text } => {
                if text.trim().is_empty() {
                    return Err(IntentRejection::EmptySpeech);
                }
                self.awaiting_speech || self.discussion_active
            }
            Intent::SkipDiscussion => self.discussion_active,
            Intent::SendVote { .. } => self.voting_active,
            Intent::SendNightAction { .. } => self.night_active,
            Intent::SendSeerAction { .. } => self.seer_active,
        };

        if !self.game_started {
            return Err(IntentRejection::NoSession);
        }
        if !self.human_alive && !matches!(intent, Intent::SkipDiscussion) {
            return Err(IntentRejection::HumanEliminated);
        }
        if !open {
            return Err(IntentRejection::Inactive {
                intent: intent.name(),
            });
        }
        intent.target_id().map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPlayer {
    pub id: PlayerId,
    pub nickname: String,
    pub is_alive: bool,
    pub is_human: bool,
    pub color: String,
    /// Known to everyone once the player is out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revealed_role: Option<Role>,
}

/// What the human is allowed to see of the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientView {
    pub players: Vec<ClientPlayer>,
    pub day: u32,
    pub phase: Phase,
    pub human_id: Option<PlayerId>,
    pub human_role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Camp>,
}

impl ClientView {
    pub fn of(game: &Game) -> Self {
        let mut players: Vec<ClientPlayer> = game
            .players
            .iter()
            .map(|p| ClientPlayer {
                id: p.id,
                nickname: p.nickname.clone(),
                is_alive: p.is_alive,
                is_human: p.is_human,
                color: player_color(p.id).to_string(),
                revealed_role: p.revealed_role,
            })
            .collect();
        players.sort_unstable_by_key(|p| p.id);

        let human = game.human();
        Self {
            players,
            day: game.day,
            phase: game.phase,
            human_id: human.map(|p| p.id),
            human_role: human.map(|p| p.role),
            winner: game.winner,
        }
    }
}

pub fn player_color(id: PlayerId) -> &'static str {
    let index = (id.max(1) - 1) as usize % PLAYER_COLORS.len();
    PLAYER_COLORS[index]
}
