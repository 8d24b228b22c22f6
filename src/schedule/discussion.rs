//! Free discussion window.
//!
//! Each AI speaker runs as its own task: sleep a random interval, roll
//! against the speaking probability, ask the engine for a line, repeat. The
//! tasks only read a published snapshot of the game and hand speeches back
//! over a channel; the session task appends them. Closing the window cancels
//! a token that every task checks before acting, so late replies are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{DiscussionSettings, draw};
use crate::agent::{AgentReply, DecisionKind, DecisionRequest, ReasoningEngine};
use crate::decision::{RetryOutcome, RetryPolicy};
use crate::errors::AgentError;
use crate::game::{Game, PlayerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscussionSpeech {
    pub player_id: PlayerId,
    pub text: String,
}

pub struct DiscussionWindow {
    token: CancellationToken,
    deadline: Instant,
    speeches: mpsc::Receiver<DiscussionSpeech>,
    speakers_done: bool,
    tasks: JoinSet<()>,
    closed: bool,
}

struct Speaker {
    id: PlayerId,
    persona: Option<String>,
    engine: Arc<dyn ReasoningEngine>,
    settings: DiscussionSettings,
    snapshot: watch::Receiver<Arc<Game>>,
    token: CancellationToken,
    deadline: Instant,
    tx: mpsc::Sender<DiscussionSpeech>,
}

impl DiscussionWindow {
    /// Open the window and start one task per AI speaker.
    ///
    /// The window's token is a child of `parent`, so ending the session also
    /// closes the discussion.
    pub fn open(
        settings: &DiscussionSettings,
        engine: Arc<dyn ReasoningEngine>,
        speakers: Vec<PlayerId>,
        personas: &HashMap<PlayerId, String>,
        snapshot: watch::Receiver<Arc<Game>>,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let deadline = Instant::now() + settings.duration;
        let (tx, rx) = mpsc::channel(32);
        let mut tasks = JoinSet::new();

        info!(
            speakers = speakers.len(),
            seconds = settings.duration.as_secs(),
            "Discussion opened"
        );
        for id in speakers {
            let speaker = Speaker {
                id,
                persona: personas.get(&id).cloned(),
                engine: engine.clone(),
                settings: settings.clone(),
                snapshot: snapshot.clone(),
                token: token.clone(),
                deadline,
                tx: tx.clone(),
            };
            tasks.spawn(speaker.run());
        }

        Self {
            token,
            deadline,
            speeches: rx,
            speakers_done: false,
            tasks,
            closed: false,
        }
    }

    /// Next AI speech, or `None` once the window has closed.
    ///
    /// Keeps the window open until the deadline even after every speaker
    /// has stopped, since the human may still talk. Cancel safe.
    pub async fn next_speech(&mut self) -> Option<DiscussionSpeech> {
        if self.closed {
            return None;
        }
        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    self.close();
                    return None;
                }
                _ = tokio::time::sleep_until(self.deadline) => {
                    self.close();
                    return None;
                }
                speech = self.speeches.recv(), if !self.speakers_done => match speech {
                    Some(speech) if !self.token.is_cancelled() => return Some(speech),
                    Some(_) => {}
                    None => self.speakers_done = true,
                },
            }
        }
    }

    /// Close the window. Returns `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.token.cancel();
        self.tasks.abort_all();
        self.speeches.close();
        info!("Discussion closed");
        true
    }
}

impl Drop for DiscussionWindow {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl Speaker {
    async fn run(self) {
        let mut rng = StdRng::from_rng(&mut rand::rng());
        let policy = RetryPolicy::single(self.settings.speech_timeout);

        loop {
            let wait = draw(self.settings.interval, &mut rng);
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }

            if rng.random_bool(self.settings.probability.clamp(0.0, 1.0)) {
                let game = self.snapshot.borrow().clone();
                if !game.player(self.id).is_some_and(|p| p.is_alive) {
                    return;
                }
                let Some(request) = DecisionRequest::for_player(
                    &game,
                    self.id,
                    DecisionKind::Speech,
                    Vec::new(),
                    self.persona.clone(),
                ) else {
                    return;
                };

                let outcome = tokio::select! {
                    _ = self.token.cancelled() => return,
                    outcome = policy.run(|_| self.ask(&request)) => outcome,
                };
                if self.token.is_cancelled() {
                    return;
                }
                match outcome {
                    RetryOutcome::Succeeded { value, .. } => {
                        let speech = DiscussionSpeech {
                            player_id: self.id,
                            text: value,
                        };
                        if self.tx.send(speech).await.is_err() {
                            return;
                        }
                    }
                    RetryOutcome::Exhausted { last_error, .. } => {
                        debug!(player = self.id, error = %last_error, "Discussion speech skipped");
                    }
                }
            }

            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining < self.settings.min_remaining {
                return;
            }
        }
    }

    async fn ask(&self, request: &DecisionRequest) -> Result<String, AgentError> {
        match self.engine.decide(request).await? {
            AgentReply::Speech(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            AgentReply::Speech(_) | AgentReply::NoAnswer => Err(AgentError::NoAnswer),
            AgentReply::Target(_) => Err(AgentError::Malformed("expected speech".into())),
        }
    }
}
