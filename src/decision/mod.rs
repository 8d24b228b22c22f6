//! Decision points: who may act, on whom, and how contributions resolve.
//!
//! [`aggregator`] collects contributions from the human and the agents;
//! this module holds the pure legality and tally rules applied to them.

pub mod aggregator;
pub mod retry;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::{Game, PlayerId};

pub use aggregator::{DecisionAggregator, ProgressFn};
pub use retry::{RetryOutcome, RetryPolicy};

/// Where a contribution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ContributionSource {
    Human,
    Agent { attempts: u32 },
    /// Every attempt failed; the target was drawn at random.
    Fallback { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub actor: PlayerId,
    /// `None` only when the legal set was empty.
    pub target: Option<PlayerId>,
    #[serde(flatten)]
    pub source: ContributionSource,
}

impl Contribution {
    pub fn human(actor: PlayerId, target: PlayerId) -> Self {
        Self {
            actor,
            target: Some(target),
            source: ContributionSource::Human,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ContributionSource::Fallback { .. })
    }
}

/// Votes per target. Lives only until the decision resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub counts: BTreeMap<PlayerId, usize>,
    pub participants: usize,
    pub fallbacks: usize,
}

impl Tally {
    pub fn from_contributions(contributions: &[Contribution]) -> Self {
        let mut tally = Tally::default();
        for contribution in contributions {
            tally.participants += 1;
            if contribution.is_fallback() {
                tally.fallbacks += 1;
            }
            if let Some(target) = contribution.target {
                *tally.counts.entry(target).or_insert(0) += 1;
            }
        }
        tally
    }

    /// Targets sharing the highest count, ascending.
    pub fn leaders(&self) -> Vec<PlayerId> {
        let Some(top) = self.counts.values().copied().max() else {
            return Vec::new();
        };
        self.counts
            .iter()
            .filter(|(_, count)| **count == top)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    Eliminated(PlayerId),
    /// More than one target shares the top count; nobody leaves.
    Tie(Vec<PlayerId>),
    NoVotes,
}

pub fn resolve_vote(tally: &Tally) -> VoteOutcome {
    let leaders = tally.leaders();
    match leaders.as_slice() {
        [] => VoteOutcome::NoVotes,
        [single] => VoteOutcome::Eliminated(*single),
        _ => VoteOutcome::Tie(leaders),
    }
}

/// Living players other than the voter.
pub fn vote_targets(game: &Game, voter: PlayerId) -> Vec<PlayerId> {
    game.alive_ids()
        .into_iter()
        .filter(|&id| id != voter)
        .collect()
}

/// Living players who are not werewolves.
pub fn kill_targets(game: &Game) -> Vec<PlayerId> {
    let mut targets: Vec<PlayerId> = game
        .alive_players()
        .filter(|p| !p.role.is_werewolf())
        .map(|p| p.id)
        .collect();
    targets.sort_unstable();
    targets
}

/// Who decides tonight's kill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NightPlan {
    /// A living human werewolf picks, overriding the others.
    Human(PlayerId),
    /// The lowest-id living AI werewolf picks for the pack.
    Agent(PlayerId),
    Safe,
}

pub fn night_plan(game: &Game) -> NightPlan {
    let wolves = game.living_werewolves();
    if kill_targets(game).is_empty() {
        return NightPlan::Safe;
    }
    if let Some(human) = wolves.iter().find(|p| p.is_human) {
        return NightPlan::Human(human.id);
    }
    match wolves.first() {
        Some(wolf) => NightPlan::Agent(wolf.id),
        None => NightPlan::Safe,
    }
}
