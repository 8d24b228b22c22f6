//! Engine that needs no provider: random legal targets and canned lines.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::prelude::*;

use super::{AgentReply, DecisionKind, DecisionRequest, ReasoningEngine};
use crate::errors::AgentError;

const LINES: &[&str] = &[
    "I have been listening carefully and nobody has convinced me yet.",
    "Something about the last few speeches does not add up.",
    "Let's not rush. I want to hear more before I decide.",
    "I trust my instincts here, and they are telling me to stay alert.",
    "We need to look at who has been quiet and who has been loud.",
];

pub struct OfflineEngine {
    rng: Mutex<StdRng>,
}

impl OfflineEngine {
    /// `Some(seed)` gives reproducible choices; `None` seeds from entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl ReasoningEngine for OfflineEngine {
    async fn decide(&self, request: &DecisionRequest) -> Result<AgentReply, AgentError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| AgentError::Transport("offline engine rng poisoned".into()))?;

        match request.kind {
            DecisionKind::Speech => {
                let line = LINES.choose(&mut *rng).copied().unwrap_or(LINES[0]);
                Ok(AgentReply::Speech(format!(
                    "I'm {} (#{}). {}",
                    request.actor_nickname, request.actor_id, line
                )))
            }
            _ => Ok(request
                .legal_targets
                .choose(&mut *rng)
                .map(|id| AgentReply::Target(*id))
                .unwrap_or(AgentReply::NoAnswer)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Role;

    fn request(kind: DecisionKind, legal: Vec<u32>) -> DecisionRequest {
        DecisionRequest {
            kind,
            actor_id: 3,
            actor_nickname: "Cedar".into(),
            role: Role::Villager,
            day: 1,
            legal_targets: legal,
            history: String::new(),
            persona: None,
        }
    }

    #[tokio::test]
    async fn targets_are_always_legal() {
        let engine = OfflineEngine::new(Some(11));
        for _ in 0..50 {
            let reply = engine
                .decide(&request(DecisionKind::Vote, vec![2, 5, 8]))
                .await
                .unwrap();
            assert!(matches!(reply, AgentReply::Target(2 | 5 | 8)));
        }
    }

    #[tokio::test]
    async fn empty_legal_set_is_no_answer() {
        let engine = OfflineEngine::new(Some(1));
        let reply = engine.decide(&request(DecisionKind::Kill, vec![])).await.unwrap();
        assert_eq!(reply, AgentReply::NoAnswer);
    }

    #[tokio::test]
    async fn speech_names_the_speaker() {
        let engine = OfflineEngine::new(Some(2));
        let reply = engine.decide(&request(DecisionKind::Speech, vec![])).await.unwrap();
        match reply {
            AgentReply::Speech(text) => assert!(text.starts_with("I'm Cedar (#3).")),
            other => panic!("expected speech, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn same_seed_same_choices() {
        let a = OfflineEngine::new(Some(99));
        let b = OfflineEngine::new(Some(99));
        let req = request(DecisionKind::Vote, (1..=8).collect());
        for _ in 0..10 {
            assert_eq!(a.decide(&req).await.unwrap(), b.decide(&req).await.unwrap());
        }
    }
}
