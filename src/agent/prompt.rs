//! Prompt text for the HTTP reasoning engine.

use super::{DecisionKind, DecisionRequest};
use crate::game::Role;

const RULES: &str = "You are playing a game of Werewolf.\n\
Roles: villagers, werewolves and one seer. The good camp (villagers and the seer) \
wins when every werewolf is eliminated; the werewolves win once they are at least \
as many as the good players.\n\
Each day players speak in seat order, then talk freely, then vote (no vote on day 1). \
At night the seer checks one player and the werewolves eliminate one player.";

pub fn build_prompt(request: &DecisionRequest) -> String {
    let mut sections = vec![RULES.to_string()];

    if let Some(persona) = request.persona.as_deref().filter(|p| !p.is_empty()) {
        sections.push(format!("# Your character\n{}", persona));
    }

    sections.push(format!(
        "# You\nYou are {} (#{}). Your role is {}. {}",
        request.actor_nickname,
        request.actor_id,
        request.role,
        mission(request.role)
    ));
    sections.push(format!("# History\n{}", request.history));
    sections.push(task(request));
    sections.join("\n\n")
}

fn mission(role: Role) -> &'static str {
    match role {
        Role::Werewolf => {
            "Pass as a villager, steer suspicion onto good players and protect your teammates."
        }
        Role::Seer => {
            "Use what your checks revealed to guide the vote without exposing yourself too early."
        }
        Role::Villager => {
            "Listen for contradictions, decide who is lying and vote the werewolves out."
        }
    }
}

fn task(request: &DecisionRequest) -> String {
    let Some(tool) = request.kind.tool_name() else {
        return format!(
            "# Task\nIt is day {} and it is your turn to speak. Reply with your speech only, \
             no prefix, at most two sentences.",
            request.day
        );
    };

    let action = match request.kind {
        DecisionKind::Vote => "vote one player out",
        DecisionKind::Kill => "eliminate one good player tonight",
        DecisionKind::SeerCheck => "check one player's identity tonight",
        DecisionKind::Speech => "speak",
    };
    format!(
        "# Task\nIt is day {day}. You must {action}. Legal targets: {targets:?}.\n\
         Reply with a single JSON object and nothing else, for example:\n\
         {{\"tool_name\": \"{tool}\", \"arguments\": {{\"player_id\": {example}, \"reason\": \"short reason\"}}}}",
        day = request.day,
        action = action,
        targets = request.legal_targets,
        tool = tool,
        example = request.legal_targets.first().copied().unwrap_or(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: DecisionKind) -> DecisionRequest {
        DecisionRequest {
            kind,
            actor_id: 4,
            actor_nickname: "Dune".into(),
            role: Role::Werewolf,
            day: 2,
            legal_targets: vec![2, 5],
            history: "--- Day 1 ---".into(),
            persona: Some("You speak in riddles.".into()),
        }
    }

    #[test]
    fn targeted_prompt_names_tool_and_targets() {
        let prompt = build_prompt(&request(DecisionKind::Kill));
        assert!(prompt.contains("\"tool_name\": \"kill_player\""));
        assert!(prompt.contains("Legal targets: [2, 5]"));
        assert!(prompt.contains("You are Dune (#4). Your role is werewolf."));
        assert!(prompt.contains("You speak in riddles."));
    }

    #[test]
    fn speech_prompt_has_no_tool() {
        let prompt = build_prompt(&request(DecisionKind::Speech));
        assert!(!prompt.contains("tool_name"));
        assert!(prompt.contains("your turn to speak"));
    }
}
