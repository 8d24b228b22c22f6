//! The phase state machine.
//!
//! One [`GameSession`] task owns the [`Game`] and is its only writer. Human
//! intents arrive on an mpsc inbox, agent decisions come back from the
//! aggregator and the discussion window, and every change is persisted and
//! published before the next phase starts.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{ClientView, DisclosedRole, InputFlags, Intent, Notification, StartOptions};
use super::SessionConfig;
use crate::agent::history::overnight_line;
use crate::agent::{DecisionKind, DecisionRequest};
use crate::decision::{
    Contribution, DecisionAggregator, NightPlan, Tally, VoteOutcome, kill_targets, night_plan,
    resolve_vote, vote_targets,
};
use crate::errors::{IntentRejection, SessionError};
use crate::game::seer::{checkable_targets, record_check};
use crate::game::{
    Camp, EliminationReason, Game, Phase, PlayerId, WinCheck, check_win, conclude, eliminate,
    role_disclosure,
};
use crate::schedule::{DiscussionWindow, SpeechMaker, TurnScheduler};
use crate::tts::spawn_stream;

const INBOX_CAPACITY: usize = 16;

/// The client-facing ends of a session.
pub struct SessionLink {
    pub intents: mpsc::Sender<Intent>,
    pub flags: watch::Receiver<InputFlags>,
    /// The request the human still has to answer, if any
    pub prompt: watch::Receiver<Option<Notification>>,
    pub snapshot: watch::Receiver<Arc<Game>>,
}

/// A targeted choice the human may be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HumanChoice {
    Vote,
    NightKill,
    SeerCheck,
}

impl HumanChoice {
    fn accepts(self, intent: &Intent) -> bool {
        matches!(
            (self, intent),
            (HumanChoice::Vote, Intent::SendVote { .. })
                | (HumanChoice::NightKill, Intent::SendNightAction { .. })
                | (HumanChoice::SeerCheck, Intent::SendSeerAction { .. })
        )
    }

    fn set(self, flags: &mut InputFlags, open: bool) {
        match self {
            HumanChoice::Vote => flags.voting_active = open,
            HumanChoice::NightKill => flags.night_active = open,
            HumanChoice::SeerCheck => flags.seer_active = open,
        }
    }
}

pub struct GameSession {
    game: Game,
    config: Arc<SessionConfig>,
    voice_enabled: bool,
    /// Public decisions; every resolved vote is announced
    voting: DecisionAggregator,
    /// Night decisions; nothing is announced
    private: DecisionAggregator,
    speech: SpeechMaker,
    inbox: mpsc::Receiver<Intent>,
    notifier: broadcast::Sender<Notification>,
    flags: watch::Sender<InputFlags>,
    prompt: watch::Sender<Option<Notification>>,
    snapshot: watch::Sender<Arc<Game>>,
    token: CancellationToken,
}

impl GameSession {
    pub fn new(
        game: Game,
        config: Arc<SessionConfig>,
        options: StartOptions,
        notifier: broadcast::Sender<Notification>,
        token: CancellationToken,
    ) -> (Self, SessionLink) {
        let (intents, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (flags, flags_rx) = watch::channel(InputFlags::default());
        let (prompt, prompt_rx) = watch::channel(None);
        let (snapshot, snapshot_rx) = watch::channel(Arc::new(game.clone()));

        let private = DecisionAggregator::new(
            config.engine.clone(),
            config.policy.clone(),
            config.pool_size,
        );
        let voting = private
            .clone()
            .with_progress(vote_announcer(&game, notifier.clone()));
        let speech = SpeechMaker::new(config.engine.clone(), config.turns.clone());

        let session = Self {
            game,
            config,
            voice_enabled: options.voice_enabled,
            voting,
            private,
            speech,
            inbox,
            notifier,
            flags,
            prompt,
            snapshot,
            token,
        };
        let link = SessionLink {
            intents,
            flags: flags_rx,
            prompt: prompt_rx,
            snapshot: snapshot_rx,
        };
        (session, link)
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Play the game to the end. Returns the winning camp.
    pub async fn run(mut self) -> Result<Camp, SessionError> {
        info!(game = %self.game.id, players = self.game.players.len(), "Game started");
        self.flags.send_modify(|flags| {
            flags.game_started = true;
            flags.human_alive = true;
        });
        self.notify(Notification::GameStarted {
            game_id: self.game.id.clone(),
        });
        self.announce_state();
        self.commit().await;

        if self.game.living_seer().is_some() {
            self.enter(Phase::PreGameSeer).await;
            self.seer_check(0).await?;
        }

        loop {
            if let Some(winner) = self.day().await? {
                return Ok(winner);
            }
            self.discussion().await?;
            if self.game.day > 1
                && let Some(winner) = self.voting_round().await?
            {
                return Ok(winner);
            }
            if let Some(winner) = self.night().await? {
                return Ok(winner);
            }
        }
    }

    async fn day(&mut self) -> Result<Option<Camp>, SessionError> {
        self.enter(Phase::Day).await;
        if self.game.day > 1 {
            let line = overnight_line(&self.game, self.game.day);
            self.notify(Notification::log(line));
        } else {
            self.notify(Notification::log("Day 1 begins. Introduce yourselves."));
        }
        if let Some(winner) = self.settle().await {
            return Ok(Some(winner));
        }

        let mut turns = TurnScheduler::new(&self.game);
        while let Some(id) = turns.next_speaker(&self.game) {
            let is_human = self.game.player(id).is_some_and(|p| p.is_human);
            if is_human {
                let text = self.await_human_speech().await?;
                self.record_speech(id, text).await;
            } else {
                let Some(request) = self.request_for(id, DecisionKind::Speech, Vec::new()) else {
                    continue;
                };
                let text = cancellable(&self.token, self.speech.speak(&request)).await?;
                self.record_speech(id, text).await;
            }
        }
        Ok(None)
    }

    async fn discussion(&mut self) -> Result<(), SessionError> {
        self.enter(Phase::Discussion).await;
        let settings = self.config.discussion.clone();
        let speakers: Vec<PlayerId> = self
            .game
            .alive_players()
            .filter(|p| !p.is_human)
            .map(|p| p.id)
            .collect();
        let mut window = DiscussionWindow::open(
            &settings,
            self.config.engine.clone(),
            speakers,
            &self.config.personas,
            self.snapshot.subscribe(),
            &self.token,
        );
        self.flags.send_modify(|flags| flags.discussion_active = true);
        self.notify(Notification::StartDiscussion {
            seconds: settings.duration.as_secs(),
        });

        loop {
            tokio::select! {
                speech = window.next_speech() => match speech {
                    Some(speech) => self.record_speech(speech.player_id, speech.text).await,
                    None => break,
                },
                intent = self.inbox.recv() => match intent {
                    None => {
                        window.close();
                        self.flags.send_modify(|flags| flags.discussion_active = false);
                        return Err(SessionError::Disconnected);
                    }
                    Some(Intent::SkipDiscussion) => {
                        info!(game = %self.game.id, "Discussion skipped");
                        window.close();
                        break;
                    }
                    Some(Intent::SendSpeech { text }) => {
                        match self.game.human().filter(|p| p.is_alive).map(|p| p.id) {
                            Some(id) if !text.trim().is_empty() => {
                                self.record_speech(id, text.trim().to_string()).await;
                            }
                            Some(_) => self.reject(IntentRejection::EmptySpeech),
                            None => self.reject(IntentRejection::HumanEliminated),
                        }
                    }
                    Some(other) => self.reject(IntentRejection::Inactive { intent: other.name() }),
                },
            }
        }

        window.close();
        self.flags.send_modify(|flags| flags.discussion_active = false);
        if self.token.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        self.notify(Notification::DiscussionEnded);
        self.commit().await;
        Ok(())
    }

    async fn voting_round(&mut self) -> Result<Option<Camp>, SessionError> {
        self.enter(Phase::Voting).await;

        let voters: Vec<PlayerId> = self
            .game
            .alive_players()
            .filter(|p| !p.is_human)
            .map(|p| p.id)
            .collect();
        let requests: Vec<DecisionRequest> = voters
            .into_iter()
            .filter_map(|id| {
                self.request_for(id, DecisionKind::Vote, vote_targets(&self.game, id))
            })
            .collect();
        let human = self.game.human().filter(|p| p.is_alive).map(|p| p.id);
        let human_targets = human
            .map(|id| vote_targets(&self.game, id))
            .unwrap_or_default();

        self.notify(Notification::log("Voting is open."));
        if human.is_some() {
            self.flags.send_modify(|flags| flags.voting_active = true);
            self.ask(Notification::StartVoting {
                targets: human_targets.clone(),
            });
        }

        let aggregator = self.voting.clone();
        let token = self.token.clone();
        let mut human_error = None;
        let human_vote = async {
            let id = human?;
            match self.await_choice(HumanChoice::Vote, &human_targets).await {
                Ok(target) => Some(Contribution::human(id, target)),
                Err(err) => {
                    human_error = Some(err);
                    None
                }
            }
        };
        let contributions = cancellable(&token, aggregator.gather(requests, human_vote)).await?;
        if let Some(err) = human_error {
            return Err(err);
        }

        let tally = Tally::from_contributions(&contributions);
        let outcome = resolve_vote(&tally);
        info!(
            game = %self.game.id,
            day = self.game.day,
            counts = ?tally.counts,
            fallbacks = tally.fallbacks,
            outcome = ?outcome,
            "Vote resolved"
        );

        let eliminated = match outcome {
            VoteOutcome::Eliminated(id) => {
                eliminate(&mut self.game, id, EliminationReason::Vote);
                let role = self.game.player(id).map(|p| p.role);
                let line = match role {
                    Some(role) => format!(
                        "{} (#{}) was voted out. Role: {}.",
                        self.game.nickname(id),
                        id,
                        role
                    ),
                    None => format!("Player {} was voted out.", id),
                };
                self.notify(Notification::log(line));
                Some(id)
            }
            VoteOutcome::Tie(leaders) => {
                self.notify(Notification::log(format!(
                    "The vote is tied between {:?}. Nobody leaves today.",
                    leaders
                )));
                None
            }
            VoteOutcome::NoVotes => {
                self.notify(Notification::log("No votes were cast. Nobody leaves today."));
                None
            }
        };
        self.notify(Notification::VotingEnded { tally, eliminated });
        self.announce_state();
        self.commit().await;

        Ok(self.settle().await)
    }

    async fn night(&mut self) -> Result<Option<Camp>, SessionError> {
        if self.game.living_seer().is_some() {
            self.enter(Phase::NightSeer).await;
            self.seer_check(self.game.day).await?;
        }

        self.enter(Phase::NightWerewolf).await;
        self.notify(Notification::log("Night falls. The werewolves choose a victim."));
        let victim = match night_plan(&self.game) {
            NightPlan::Human(id) => {
                let targets = kill_targets(&self.game);
                self.flags.send_modify(|flags| flags.night_active = true);
                self.ask(Notification::StartNightWerewolf {
                    targets: targets.clone(),
                    teammates: self.game.werewolf_teammates(id),
                });
                Some(self.await_choice(HumanChoice::NightKill, &targets).await?)
            }
            NightPlan::Agent(id) => {
                match self.request_for(id, DecisionKind::Kill, kill_targets(&self.game)) {
                    Some(request) => {
                        let aggregator = self.private.clone();
                        cancellable(&self.token, aggregator.query_one(request))
                            .await?
                            .target
                    }
                    None => None,
                }
            }
            NightPlan::Safe => None,
        };

        match victim {
            Some(id) => {
                eliminate(&mut self.game, id, EliminationReason::Night);
                info!(game = %self.game.id, day = self.game.day, victim = id, "Night kill resolved");
            }
            None => info!(game = %self.game.id, day = self.game.day, "Safe night"),
        }
        self.commit().await;

        if let Some(winner) = self.settle().await {
            return Ok(Some(winner));
        }
        self.game.day += 1;
        self.commit().await;
        Ok(None)
    }

    /// One seer check, recorded against `day`. Skipped when nobody is
    /// left to check.
    async fn seer_check(&mut self, day: u32) -> Result<(), SessionError> {
        let Some(seer) = self.game.living_seer() else {
            return Ok(());
        };
        let (seer_id, seer_is_human) = (seer.id, seer.is_human);
        let targets = checkable_targets(&self.game);
        if targets.is_empty() {
            debug!(game = %self.game.id, seer = seer_id, "Nobody left to check");
            return Ok(());
        }

        let target = if seer_is_human {
            self.flags.send_modify(|flags| flags.seer_active = true);
            self.ask(Notification::RequestSeerAction {
                targets: targets.clone(),
            });
            Some(self.await_choice(HumanChoice::SeerCheck, &targets).await?)
        } else {
            match self.request_for(seer_id, DecisionKind::SeerCheck, targets) {
                Some(request) => {
                    let aggregator = self.private.clone();
                    cancellable(&self.token, aggregator.query_one(request))
                        .await?
                        .target
                }
                None => None,
            }
        };

        if let Some(target) = target
            && let Some(record) = record_check(&mut self.game, target, day)
        {
            info!(game = %self.game.id, day, target, "Seer check recorded");
            if seer_is_human {
                self.notify(Notification::SeerResult {
                    target,
                    nickname: self.game.nickname(target),
                    result: record.result,
                });
            }
            self.notify(Notification::log("The seer has made a check."));
            self.commit().await;
        }
        Ok(())
    }

    /// Wait for the human's speech in an ordered turn.
    async fn await_human_speech(&mut self) -> Result<String, SessionError> {
        self.flags.send_modify(|flags| flags.awaiting_speech = true);
        self.ask(Notification::RequestSpeech);
        loop {
            match self.next_intent().await {
                Ok(Intent::SendSpeech { text }) if !text.trim().is_empty() => {
                    self.flags.send_modify(|flags| flags.awaiting_speech = false);
                    self.prompt.send_replace(None);
                    return Ok(text.trim().to_string());
                }
                Ok(Intent::SendSpeech { .. }) => self.reject(IntentRejection::EmptySpeech),
                Ok(other) => self.reject(IntentRejection::Inactive { intent: other.name() }),
                Err(err) => {
                    self.flags.send_modify(|flags| flags.awaiting_speech = false);
                    self.prompt.send_replace(None);
                    return Err(err);
                }
            }
        }
    }

    /// Wait for the human to name one of `legal`. No timeout.
    async fn await_choice(
        &mut self,
        choice: HumanChoice,
        legal: &[PlayerId],
    ) -> Result<PlayerId, SessionError> {
        loop {
            let intent = match self.next_intent().await {
                Ok(intent) => intent,
                Err(err) => {
                    self.flags.send_modify(|flags| choice.set(flags, false));
                    self.prompt.send_replace(None);
                    return Err(err);
                }
            };
            if !choice.accepts(&intent) {
                self.reject(IntentRejection::Inactive {
                    intent: intent.name(),
                });
                continue;
            }
            match intent.target_id() {
                Ok(Some(target)) if legal.contains(&target) => {
                    self.flags.send_modify(|flags| choice.set(flags, false));
                    self.prompt.send_replace(None);
                    return Ok(target);
                }
                Ok(Some(target)) => self.reject(IntentRejection::IllegalTarget(target)),
                Ok(None) => self.reject(IntentRejection::InvalidTarget),
                Err(rejection) => self.reject(rejection),
            }
        }
    }

    async fn next_intent(&mut self) -> Result<Intent, SessionError> {
        tokio::select! {
            _ = self.token.cancelled() => Err(SessionError::Cancelled),
            intent = self.inbox.recv() => intent.ok_or(SessionError::Disconnected),
        }
    }

    fn request_for(
        &self,
        id: PlayerId,
        kind: DecisionKind,
        legal: Vec<PlayerId>,
    ) -> Option<DecisionRequest> {
        DecisionRequest::for_player(
            &self.game,
            id,
            kind,
            legal,
            self.config.personas.get(&id).cloned(),
        )
    }

    async fn record_speech(&mut self, player_id: PlayerId, text: String) {
        let Some(player) = self.game.player(player_id) else {
            return;
        };
        let (nickname, is_human) = (player.nickname.clone(), player.is_human);
        self.game.add_speech(player_id, text.clone());
        debug!(game = %self.game.id, player = player_id, "Speech recorded");

        if !is_human {
            self.voice(player_id, &text);
        }
        self.notify(Notification::NewSpeech {
            player_id,
            nickname,
            text,
        });
        self.commit().await;
    }

    fn voice(&self, player_id: PlayerId, text: &str) {
        if !self.voice_enabled {
            return;
        }
        let Some(synth) = self.config.tts.clone() else {
            return;
        };
        let notifier = self.notifier.clone();
        spawn_stream(
            synth,
            player_id,
            text.to_string(),
            self.token.child_token(),
            move |chunk| {
                let _ = notifier.send(Notification::PlayAudioChunk {
                    player_id: chunk.player_id,
                    sequence: chunk.sequence,
                    audio_base64: chunk.audio_base64,
                });
            },
        );
    }

    /// End the game if a camp has won.
    async fn settle(&mut self) -> Option<Camp> {
        match check_win(&self.game) {
            WinCheck::Continue => None,
            WinCheck::Winner(camp) => {
                self.finish(camp).await;
                Some(camp)
            }
        }
    }

    async fn finish(&mut self, winner: Camp) {
        if !conclude(&mut self.game, winner) {
            return;
        }
        self.flags.send_replace(InputFlags::ended());
        self.prompt.send_replace(None);
        info!(game = %self.game.id, day = self.game.day, winner = %winner, "Game over");

        let roles = role_disclosure(&self.game)
            .into_iter()
            .map(|(player_id, role)| DisclosedRole {
                player_id,
                nickname: self.game.nickname(player_id),
                role,
            })
            .collect();
        self.notify(Notification::log(format!("Game over. The {} win.", winner)));
        self.notify(Notification::PhaseUpdate {
            phase: Phase::Ended,
            day: self.game.day,
        });
        self.notify(Notification::GameEnd { winner, roles });
        self.announce_state();
        self.commit().await;
    }

    async fn enter(&mut self, phase: Phase) {
        self.game.phase = phase;
        debug!(game = %self.game.id, day = self.game.day, phase = %phase, "Phase entered");
        self.notify(Notification::PhaseUpdate {
            phase,
            day: self.game.day,
        });
        self.announce_state();
        self.commit().await;
    }

    fn announce_state(&self) {
        let human_alive = !self.game.is_ended() && self.game.human().is_some_and(|p| p.is_alive);
        self.flags.send_if_modified(|flags| {
            let changed = flags.human_alive != human_alive && flags.game_started;
            if changed {
                flags.human_alive = human_alive;
            }
            changed
        });
        self.notify(Notification::GameState {
            view: ClientView::of(&self.game),
        });
    }

    /// Publish the game to the discussion speakers and persist it.
    async fn commit(&mut self) {
        let game = Arc::new(self.game.clone());
        self.snapshot.send_replace(game.clone());
        if let Err(err) = self.config.store.save(&game).await {
            warn!(game = %game.id, error = %err, "Failed to save game snapshot");
        }
    }

    /// Send a request the human must answer. It is kept so that a client
    /// which missed it can be asked again.
    fn ask(&self, request: Notification) {
        self.prompt.send_replace(Some(request.clone()));
        self.notify(request);
    }

    fn reject(&self, rejection: IntentRejection) {
        debug!(game = %self.game.id, %rejection, "Intent rejected");
        self.notify(Notification::error(rejection.to_string()));
    }

    fn notify(&self, notification: Notification) {
        // no subscribers is fine; the client may be reconnecting
        let _ = self.notifier.send(notification);
    }
}

fn vote_announcer(
    game: &Game,
    notifier: broadcast::Sender<Notification>,
) -> crate::decision::ProgressFn {
    let names: HashMap<PlayerId, String> = game
        .players
        .iter()
        .map(|p| (p.id, p.label()))
        .collect();
    Arc::new(move |contribution: &Contribution| {
        let voter = names
            .get(&contribution.actor)
            .cloned()
            .unwrap_or_else(|| format!("Player {}", contribution.actor));
        let line = match contribution.target {
            Some(target) => format!(
                "{} voted for {}.",
                voter,
                names
                    .get(&target)
                    .cloned()
                    .unwrap_or_else(|| format!("Player {}", target))
            ),
            None => format!("{} abstained.", voter),
        };
        let _ = notifier.send(Notification::log(line));
    })
}

async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, SessionError> {
    tokio::select! {
        _ = token.cancelled() => Err(SessionError::Cancelled),
        value = fut => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{CheckResult, Player, Role};
    use crate::persistence::MemoryStore;
    use crate::session::testing::config;
    use serde_json::json;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    fn session(game: Game, store: Arc<MemoryStore>) -> (GameSession, SessionLink, broadcast::Receiver<Notification>) {
        let (notifier, rx) = broadcast::channel(1024);
        let (session, link) = GameSession::new(
            game,
            config(store),
            StartOptions::default(),
            notifier,
            CancellationToken::new(),
        );
        (session, link, rx)
    }

    /// Plays the human: answers every request with the lowest legal target
    /// (or `pick` when given) and skips discussions. Returns everything it
    /// saw once the session is gone.
    fn human(
        mut rx: broadcast::Receiver<Notification>,
        intents: mpsc::Sender<Intent>,
        pick: Option<PlayerId>,
    ) -> JoinHandle<Vec<Notification>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(notification) = rx.recv().await {
                let choose = |targets: &[PlayerId]| {
                    json!(pick.filter(|p| targets.contains(p)).unwrap_or(targets[0]))
                };
                let reply = match &notification {
                    Notification::RequestSpeech => Some(Intent::SendSpeech {
                        text: "I am a simple villager.".into(),
                    }),
                    Notification::StartDiscussion { .. } => Some(Intent::SkipDiscussion),
                    Notification::StartVoting { targets } => Some(Intent::SendVote {
                        target: choose(targets),
                    }),
                    Notification::StartNightWerewolf { targets, .. } => {
                        Some(Intent::SendNightAction {
                            target: choose(targets),
                        })
                    }
                    Notification::RequestSeerAction { targets } => Some(Intent::SendSeerAction {
                        target: choose(targets),
                    }),
                    _ => None,
                };
                seen.push(notification);
                if let Some(intent) = reply {
                    let _ = intents.send(intent).await;
                }
            }
            seen
        })
    }

    fn table(roles: &[(Role, bool)]) -> Game {
        let players = roles
            .iter()
            .enumerate()
            .map(|(i, (role, human))| {
                let id = i as PlayerId + 1;
                Player::new(id, format!("P{}", id), *role, *human)
            })
            .collect();
        Game::new("game_test", players)
    }

    #[tokio::test(start_paused = true)]
    async fn full_game_runs_to_a_good_camp_win() {
        let store = Arc::new(MemoryStore::new());
        let game = table(&[
            (Role::Werewolf, false),
            (Role::Seer, false),
            (Role::Villager, false),
            (Role::Villager, false),
            (Role::Villager, true),
        ]);
        let (session, link, rx) = session(game, store.clone());
        let driver = human(rx, link.intents.clone(), None);

        let winner = session.run().await.unwrap();
        // nothing but a restart is accepted once the game is over
        assert_eq!(*link.flags.borrow(), InputFlags::ended());
        drop(link);
        let seen = driver.await.unwrap();

        assert_eq!(winner, Camp::Good);
        let last = store.last().unwrap();
        assert_eq!(last.phase, Phase::Ended);
        assert_eq!(last.winner, Some(Camp::Good));
        assert_eq!(last.day, 2);

        // pre-game check hits the werewolf, the night check a villager
        let knowledge = last.player(2).unwrap().seer_knowledge.clone().unwrap();
        assert_eq!(knowledge.len(), 2);
        assert_eq!((knowledge[0].day, knowledge[0].checked_id), (0, 1));
        assert_eq!(knowledge[0].result, CheckResult::Werewolf);
        assert_eq!((knowledge[1].day, knowledge[1].checked_id), (1, 3));

        // the wolf eats the seer on night one and is voted out on day two
        assert_eq!(last.day_log(1).unwrap().eliminated_night, Some(2));
        assert_eq!(last.day_log(2).unwrap().eliminated_vote, Some(1));
        assert_eq!(last.player(1).unwrap().revealed_role, Some(Role::Werewolf));

        // everyone alive spoke in turn on day one, human included
        let day_one: Vec<PlayerId> = last.day_log(1).unwrap().speeches.iter().map(|s| s.player_id).collect();
        assert_eq!(day_one, vec![1, 2, 3, 4, 5]);

        assert!(seen.iter().any(|n| matches!(n, Notification::LogMessage { message } if message.contains("[Last night] P2 (#2) was eliminated. Role: seer."))));
        assert!(seen.iter().any(|n| matches!(n, Notification::GameEnd { winner: Camp::Good, roles } if roles.len() == 5)));
    }

    #[tokio::test(start_paused = true)]
    async fn tied_vote_eliminates_nobody() {
        let store = Arc::new(MemoryStore::new());
        let mut game = table(&[
            (Role::Werewolf, false),
            (Role::Villager, false),
            (Role::Villager, false),
            (Role::Villager, true),
        ]);
        game.day = 2;
        let (mut session, link, rx) = session(game, store);
        session.flags.send_modify(|f| {
            f.game_started = true;
            f.human_alive = true;
        });
        // agents vote 1 -> 2, 2 -> 1, 3 -> 1; the human votes 2
        let driver = human(rx, link.intents.clone(), Some(2));

        let winner = session.voting_round().await.unwrap();
        assert_eq!(winner, None);
        assert_eq!(session.game().alive_ids(), vec![1, 2, 3, 4]);
        assert_eq!(session.game().day_log(2).and_then(|l| l.eliminated_vote), None);
        drop(session);
        drop(link);

        let seen = driver.await.unwrap();
        let ended = seen.iter().find_map(|n| match n {
            Notification::VotingEnded { tally, eliminated } => Some((tally.clone(), *eliminated)),
            _ => None,
        });
        let (tally, eliminated) = ended.unwrap();
        assert_eq!(eliminated, None);
        assert_eq!(tally.counts.get(&1), Some(&2));
        assert_eq!(tally.counts.get(&2), Some(&2));
        assert!(seen.iter().any(|n| matches!(n, Notification::LogMessage { message } if message == "P2 (#2) voted for P1 (#1).")));
    }

    #[tokio::test(start_paused = true)]
    async fn human_werewolf_picks_the_night_victim() {
        let store = Arc::new(MemoryStore::new());
        let game = table(&[
            (Role::Werewolf, true),
            (Role::Werewolf, false),
            (Role::Villager, false),
            (Role::Villager, false),
            (Role::Seer, false),
        ]);
        let (mut session, link, rx) = session(game, store);
        session.flags.send_modify(|f| {
            f.game_started = true;
            f.human_alive = true;
        });
        let driver = human(rx, link.intents.clone(), Some(5));

        let winner = session.night().await.unwrap();
        assert_eq!(winner, Some(Camp::Werewolves));
        assert!(!session.game().player(5).unwrap().is_alive);
        assert_eq!(session.game().day, 1);
        drop(session);
        drop(link);

        let seen = driver.await.unwrap();
        let request = seen.iter().find_map(|n| match n {
            Notification::StartNightWerewolf { targets, teammates } => {
                Some((targets.clone(), teammates.clone()))
            }
            _ => None,
        });
        assert_eq!(request, Some((vec![3, 4, 5], vec![2])));
    }

    #[tokio::test(start_paused = true)]
    async fn night_without_a_winner_advances_the_day() {
        let store = Arc::new(MemoryStore::new());
        let game = table(&[
            (Role::Werewolf, false),
            (Role::Villager, false),
            (Role::Villager, false),
            (Role::Villager, false),
            (Role::Villager, true),
        ]);
        let (mut session, _link, _rx) = session(game, store.clone());

        assert_eq!(session.night().await.unwrap(), None);
        assert_eq!(session.game().day, 2);
        assert!(!session.game().player(2).unwrap().is_alive);
        assert_eq!(store.last().unwrap().day, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn seer_with_nobody_left_skips_the_check() {
        let store = Arc::new(MemoryStore::new());
        let mut game = table(&[
            (Role::Seer, false),
            (Role::Werewolf, false),
            (Role::Villager, true),
        ]);
        let seer = game.player_mut(1).unwrap();
        seer.seer_knowledge = Some(vec![
            crate::game::CheckRecord {
                day: 0,
                checked_id: 2,
                result: CheckResult::Werewolf,
            },
            crate::game::CheckRecord {
                day: 1,
                checked_id: 3,
                result: CheckResult::NotWerewolf,
            },
        ]);
        let (mut session, _link, _rx) = session(game, store.clone());

        session.seer_check(2).await.unwrap();
        assert_eq!(
            session.game().player(1).unwrap().seer_knowledge.as_ref().map(Vec::len),
            Some(2)
        );
        assert!(store.snapshots().is_empty());
    }

    fn errors(rx: &mut broadcast::Receiver<Notification>) -> Vec<String> {
        let mut errors = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            if let Notification::ErrorMessage { message } = notification {
                errors.push(message);
            }
        }
        errors
    }

    #[tokio::test(start_paused = true)]
    async fn human_speech_joins_a_running_discussion() {
        let store = Arc::new(MemoryStore::new());
        let mut cfg = Arc::try_unwrap(config(store.clone())).ok().unwrap();
        cfg.discussion.probability = 1.0;
        let game = table(&[
            (Role::Werewolf, false),
            (Role::Villager, false),
            (Role::Villager, true),
        ]);
        let (notifier, mut rx) = broadcast::channel(1024);
        let (mut session, link) = GameSession::new(
            game,
            Arc::new(cfg),
            StartOptions::default(),
            notifier,
            CancellationToken::new(),
        );

        for intent in [
            Intent::SendSpeech { text: "   ".into() },
            Intent::SendVote { target: json!(1) },
            Intent::SendSpeech {
                text: " I trust P2. ".into(),
            },
        ] {
            link.intents.send(intent).await.unwrap();
        }

        let start = tokio::time::Instant::now();
        session.discussion().await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(60) && elapsed < Duration::from_secs(61));

        // the human goes first and the agents keep to their own timers
        let speeches = &session.game().day_log(1).unwrap().speeches;
        assert_eq!(speeches[0].player_id, 3);
        assert_eq!(speeches[0].text, "I trust P2.");
        assert!(speeches[1..].iter().any(|s| s.player_id == 1));
        assert!(speeches[1..].iter().any(|s| s.player_id == 2));
        assert!(speeches[1..].iter().all(|s| s.player_id != 3));
        assert_eq!(
            store.last().unwrap().day_log(1).unwrap().speeches.len(),
            speeches.len()
        );
        assert!(!link.flags.borrow().discussion_active);

        let errors = errors(&mut rx);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], "Speech text is empty");
        assert!(errors[1].contains("send_vote"));
    }

    #[tokio::test(start_paused = true)]
    async fn eliminated_human_cannot_speak_in_discussion() {
        let store = Arc::new(MemoryStore::new());
        let mut game = table(&[
            (Role::Werewolf, false),
            (Role::Villager, false),
            (Role::Villager, false),
            (Role::Villager, true),
        ]);
        game.player_mut(4).unwrap().is_alive = false;
        let (mut session, link, mut rx) = session(game, store);

        link.intents
            .send(Intent::SendSpeech {
                text: "Wait, hear me out".into(),
            })
            .await
            .unwrap();
        link.intents.send(Intent::SkipDiscussion).await.unwrap();

        let start = tokio::time::Instant::now();
        session.discussion().await.unwrap();
        // the skip closes the window early
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(
            session
                .game()
                .day_log(1)
                .is_none_or(|log| log.speeches.is_empty())
        );
        assert_eq!(errors(&mut rx), vec!["You are no longer alive".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_a_waiting_session_ends_it() {
        let store = Arc::new(MemoryStore::new());
        let game = table(&[
            (Role::Villager, true),
            (Role::Werewolf, false),
            (Role::Villager, false),
            (Role::Villager, false),
        ]);
        let (notifier, _rx) = broadcast::channel(64);
        let token = CancellationToken::new();
        let (session, _link) = GameSession::new(
            game,
            config(store),
            StartOptions::default(),
            notifier,
            token.clone(),
        );
        let run = tokio::spawn(session.run());

        // the human opens day one and never speaks
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!run.is_finished());
        token.cancel();
        assert!(matches!(run.await.unwrap(), Err(SessionError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_intents_are_rejected_while_waiting() {
        let store = Arc::new(MemoryStore::new());
        let game = table(&[
            (Role::Villager, true),
            (Role::Werewolf, false),
            (Role::Villager, false),
        ]);
        let (mut session, link, mut rx) = session(game, store);

        link.intents
            .send(Intent::SendVote { target: json!(2) })
            .await
            .unwrap();
        link.intents
            .send(Intent::SendSeerAction { target: json!(9) })
            .await
            .unwrap();
        link.intents
            .send(Intent::SendSeerAction { target: json!(2) })
            .await
            .unwrap();

        let target = session
            .await_choice(HumanChoice::SeerCheck, &[2, 3])
            .await
            .unwrap();
        assert_eq!(target, 2);

        let errors = errors(&mut rx);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("send_vote"));
        assert!(errors[1].contains("9"));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_request_is_held_until_answered() {
        let store = Arc::new(MemoryStore::new());
        let game = table(&[
            (Role::Villager, true),
            (Role::Werewolf, false),
            (Role::Villager, false),
        ]);
        let (mut session, link, _rx) = session(game, store);
        let SessionLink {
            intents,
            mut prompt,
            ..
        } = link;
        assert_eq!(*prompt.borrow(), None);

        let answer = async {
            prompt.wait_for(Option::is_some).await.unwrap();
            assert_eq!(*prompt.borrow(), Some(Notification::RequestSpeech));
            intents
                .send(Intent::SendSpeech { text: "hello".into() })
                .await
                .unwrap();
        };
        let (speech, ()) = tokio::join!(session.await_human_speech(), answer);

        assert_eq!(speech.unwrap(), "hello");
        assert_eq!(*prompt.borrow(), None);
    }
}
