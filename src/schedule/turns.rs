use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{TurnSettings, draw};
use crate::agent::{AgentReply, DecisionRequest, ReasoningEngine};
use crate::decision::{RetryOutcome, RetryPolicy};
use crate::errors::AgentError;
use crate::game::{Game, PlayerId};

/// Line used when an AI speaker has nothing usable to say.
pub fn fallback_line(nickname: &str, id: PlayerId) -> String {
    format!("I'm {} (#{}). I have nothing to add this round, I pass.", nickname, id)
}

/// Walks the living players in ascending id order for one round.
///
/// Liveness is re-checked at every step, so anyone eliminated mid-round is
/// skipped without using a turn.
pub struct TurnScheduler {
    queue: VecDeque<PlayerId>,
}

impl TurnScheduler {
    pub fn new(game: &Game) -> Self {
        Self {
            queue: game.alive_ids().into(),
        }
    }

    pub fn next_speaker(&mut self, game: &Game) -> Option<PlayerId> {
        while let Some(id) = self.queue.pop_front() {
            if game.player(id).is_some_and(|p| p.is_alive) {
                return Some(id);
            }
        }
        None
    }
}

/// Produces AI speeches for ordered turns.
#[derive(Clone)]
pub struct SpeechMaker {
    engine: Arc<dyn ReasoningEngine>,
    settings: TurnSettings,
}

impl SpeechMaker {
    pub fn new(engine: Arc<dyn ReasoningEngine>, settings: TurnSettings) -> Self {
        Self { engine, settings }
    }

    /// Think for a moment, then ask the engine once. Never fails.
    pub async fn speak(&self, request: &DecisionRequest) -> String {
        let delay = draw(self.settings.speech_delay, &mut rand::rng());
        tokio::time::sleep(delay).await;

        let engine = self.engine.as_ref();
        let policy = RetryPolicy::single(self.settings.speech_timeout);
        let outcome = policy
            .run(move |_| async move {
                match engine.decide(request).await? {
                    AgentReply::Speech(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
                    AgentReply::Speech(_) | AgentReply::NoAnswer => Err(AgentError::NoAnswer),
                    AgentReply::Target(_) => {
                        Err(AgentError::Malformed("expected speech, got a target".into()))
                    }
                }
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, .. } => {
                debug!(player = request.actor_id, "Speech generated");
                value
            }
            RetryOutcome::Exhausted { last_error, .. } => {
                warn!(player = request.actor_id, error = %last_error, "Speech failed, using fallback line");
                fallback_line(&request.actor_nickname, request.actor_id)
            }
        }
    }
}
