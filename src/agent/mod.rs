//! Reasoning-engine boundary.
//!
//! The orchestration code only sees [`ReasoningEngine`]: a request carries
//! the kind of decision, the acting player and the legal targets, and the
//! reply is free text, a target id, or an explicit no-answer. Prompt wording
//! and transport live behind the trait in [`llm`]; [`offline`] answers at
//! random without a provider.

pub mod history;
pub mod llm;
pub mod offline;
pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::game::{Game, PlayerId, Role};

pub use llm::LlmEngine;
pub use offline::OfflineEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Speech,
    Vote,
    Kill,
    SeerCheck,
}

impl DecisionKind {
    /// Name used for logging and per-kind generation parameters.
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionKind::Speech => "speech",
            DecisionKind::Vote => "vote",
            DecisionKind::Kill => "kill",
            DecisionKind::SeerCheck => "seer_check",
        }
    }

    /// JSON tool the engine must call for a targeted decision.
    pub fn tool_name(self) -> Option<&'static str> {
        match self {
            DecisionKind::Speech => None,
            DecisionKind::Vote => Some("vote_for_player"),
            DecisionKind::Kill => Some("kill_player"),
            DecisionKind::SeerCheck => Some("check_player"),
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read-only snapshot handed to the engine for one decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRequest {
    pub kind: DecisionKind,
    pub actor_id: PlayerId,
    pub actor_nickname: String,
    pub role: Role,
    pub day: u32,
    /// Empty for speeches.
    pub legal_targets: Vec<PlayerId>,
    /// History text as seen by the actor.
    pub history: String,
    pub persona: Option<String>,
}

impl DecisionRequest {
    /// Snapshot of what `actor` may know right now. `None` for an unknown id.
    pub fn for_player(
        game: &Game,
        actor: PlayerId,
        kind: DecisionKind,
        legal_targets: Vec<PlayerId>,
        persona: Option<String>,
    ) -> Option<Self> {
        let player = game.player(actor)?;
        Some(Self {
            kind,
            actor_id: actor,
            actor_nickname: player.nickname.clone(),
            role: player.role,
            day: game.day,
            legal_targets,
            history: history::history_for(game, actor),
            persona,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentReply {
    Speech(String),
    Target(PlayerId),
    NoAnswer,
}

#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn decide(&self, request: &DecisionRequest) -> Result<AgentReply, AgentError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_match_decision_kinds() {
        assert_eq!(DecisionKind::Vote.tool_name(), Some("vote_for_player"));
        assert_eq!(DecisionKind::Kill.tool_name(), Some("kill_player"));
        assert_eq!(DecisionKind::SeerCheck.tool_name(), Some("check_player"));
        assert_eq!(DecisionKind::Speech.tool_name(), None);
    }

    #[test]
    fn request_for_player_carries_role_and_history() {
        use crate::game::Player;

        let mut game = Game::new(
            "r",
            vec![
                Player::new(1, "Ash", Role::Werewolf, false),
                Player::new(2, "Birch", Role::Villager, true),
            ],
        );
        game.day = 3;
        let request =
            DecisionRequest::for_player(&game, 1, DecisionKind::Kill, vec![2], None).unwrap();
        assert_eq!(request.role, Role::Werewolf);
        assert_eq!(request.day, 3);
        assert_eq!(request.actor_nickname, "Ash");
        assert!(request.history.contains("Alive players: [1, 2]"));
        assert!(DecisionRequest::for_player(&game, 9, DecisionKind::Vote, vec![], None).is_none());
    }

    #[test]
    fn kinds_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&DecisionKind::SeerCheck).unwrap(),
            "\"seer_check\""
        );
        assert_eq!(DecisionKind::Kill.to_string(), "kill");
    }
}
