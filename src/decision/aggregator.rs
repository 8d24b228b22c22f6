//! Concurrent collection of contributions for one decision point.
//!
//! Agent requests run on a bounded pool (a semaphore sized
//! `min(requests, pool_size)`) and each goes through the shared
//! [`RetryPolicy`]. When the attempts run out, or the engine keeps naming
//! players outside the legal set, a uniformly random legal target stands in.
//! The human channel is awaited alongside the pool and has no timeout. The
//! caller receives the full set only once every contribution has arrived.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::agent::{AgentReply, DecisionKind, DecisionRequest, ReasoningEngine};
use crate::decision::{Contribution, ContributionSource, RetryOutcome, RetryPolicy};
use crate::errors::AgentError;
use crate::game::PlayerId;

/// Called once per resolved contribution, in completion order.
pub type ProgressFn = Arc<dyn Fn(&Contribution) + Send + Sync>;

#[derive(Clone)]
pub struct DecisionAggregator {
    engine: Arc<dyn ReasoningEngine>,
    policy: RetryPolicy,
    pool_size: usize,
    progress: Option<ProgressFn>,
}

impl DecisionAggregator {
    pub fn new(engine: Arc<dyn ReasoningEngine>, policy: RetryPolicy, pool_size: usize) -> Self {
        Self {
            engine,
            policy,
            pool_size: pool_size.max(1),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Resolve one agent's choice. Never fails; falls back to a random
    /// legal target, or to no target when the legal set is empty.
    pub async fn query_one(&self, request: DecisionRequest) -> Contribution {
        let actor = request.actor_id;
        if request.legal_targets.is_empty() {
            let contribution = Contribution {
                actor,
                target: None,
                source: ContributionSource::Fallback { attempts: 0 },
            };
            self.report(request.kind, &contribution);
            return contribution;
        }

        let engine = self.engine.as_ref();
        let legal = &request.legal_targets;
        let request_ref = &request;
        let outcome = self
            .policy
            .run(move |_attempt| async move {
                match engine.decide(request_ref).await? {
                    AgentReply::Target(target) if legal.contains(&target) => Ok(target),
                    AgentReply::Target(target) => Err(AgentError::InvalidTarget {
                        target,
                        legal: legal.clone(),
                    }),
                    AgentReply::Speech(_) => {
                        Err(AgentError::Malformed("expected a target, got free text".into()))
                    }
                    AgentReply::NoAnswer => Err(AgentError::NoAnswer),
                }
            })
            .await;

        let contribution = match outcome {
            RetryOutcome::Succeeded { value, attempts } => Contribution {
                actor,
                target: Some(value),
                source: ContributionSource::Agent { attempts },
            },
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                let target = random_legal(legal);
                warn!(
                    player = actor,
                    kind = %request.kind,
                    attempts,
                    error = %last_error,
                    fallback = ?target,
                    "Reasoning engine exhausted, using random legal target"
                );
                Contribution {
                    actor,
                    target,
                    source: ContributionSource::Fallback { attempts },
                }
            }
        };
        self.report(request.kind, &contribution);
        contribution
    }

    /// Fan requests out over the pool and wait for all of them.
    ///
    /// The result is sorted by actor id so tallies are independent of
    /// completion order.
    pub async fn query_agents(&self, requests: Vec<DecisionRequest>) -> Vec<Contribution> {
        if requests.is_empty() {
            return Vec::new();
        }

        let permits = Arc::new(Semaphore::new(self.pool_size.min(requests.len())));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<tokio::task::Id, (DecisionKind, PlayerId, Vec<PlayerId>)> =
            HashMap::new();

        for request in requests {
            let this = self.clone();
            let permits = permits.clone();
            let key = (request.kind, request.actor_id, request.legal_targets.clone());
            let handle = tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                this.query_one(request).await
            });
            pending.insert(handle.id(), key);
        }

        let mut contributions = Vec::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, contribution)) => {
                    pending.remove(&id);
                    contributions.push(contribution);
                }
                Err(err) => {
                    // The engine call panicked; the decision must still resolve.
                    if let Some((kind, actor, legal)) = pending.remove(&err.id()) {
                        warn!(player = actor, error = %err, "Agent task failed, using random legal target");
                        let contribution = Contribution {
                            actor,
                            target: random_legal(&legal),
                            source: ContributionSource::Fallback { attempts: 0 },
                        };
                        self.report(kind, &contribution);
                        contributions.push(contribution);
                    }
                }
            }
        }

        contributions.sort_by_key(|c| c.actor);
        contributions
    }

    /// Await the human contribution and the agent pool together.
    pub async fn gather<H>(&self, requests: Vec<DecisionRequest>, human: H) -> Vec<Contribution>
    where
        H: Future<Output = Option<Contribution>>,
    {
        let (human, mut contributions) = tokio::join!(human, self.query_agents(requests));
        if let Some(human) = human {
            if let Some(progress) = &self.progress {
                progress(&human);
            }
            contributions.push(human);
            contributions.sort_by_key(|c| c.actor);
        }
        contributions
    }

    fn report(&self, kind: DecisionKind, contribution: &Contribution) {
        info!(
            player = contribution.actor,
            kind = %kind,
            target = ?contribution.target,
            source = ?contribution.source,
            "Contribution resolved"
        );
        if let Some(progress) = &self.progress {
            progress(contribution);
        }
    }
}

fn random_legal(legal: &[PlayerId]) -> Option<PlayerId> {
    legal.choose(&mut rand::rng()).copied()
}
