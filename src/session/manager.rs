use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::{ClientView, InputFlags, Intent, Notification, StartOptions};
use super::machine::GameSession;
use super::SessionConfig;
use crate::errors::{IntentRejection, SessionError};
use crate::game::{Game, deal};
use crate::persistence::snapshot_key;

struct SessionHandle {
    /// Distinguishes a restarted session from its predecessor
    id: Uuid,
    intents: mpsc::Sender<Intent>,
    flags: watch::Receiver<InputFlags>,
    prompt: watch::Receiver<Option<Notification>>,
    snapshot: watch::Receiver<Arc<Game>>,
    token: CancellationToken,
}

/// Live sessions keyed by connection id.
pub struct SessionManager {
    config: Arc<SessionConfig>,
    sessions: DashMap<Uuid, SessionHandle>,
}

impl SessionManager {
    pub fn new(config: Arc<SessionConfig>) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions: DashMap::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Route one client intent. A rejection leaves every session untouched.
    pub fn dispatch(
        self: &Arc<Self>,
        connection: Uuid,
        intent: Intent,
        notifier: &broadcast::Sender<Notification>,
    ) -> Result<(), IntentRejection> {
        match intent {
            Intent::StartGame(options) => self.start(connection, options, notifier),
            Intent::RestartGame => {
                self.destroy(connection);
                let _ = notifier.send(Notification::ReloadPage);
                Ok(())
            }
            intent => {
                let handle = self
                    .sessions
                    .get(&connection)
                    .ok_or(IntentRejection::NoSession)?;
                handle.flags.borrow().check(&intent)?;
                let name = intent.name();
                handle
                    .intents
                    .try_send(intent)
                    .map_err(|_| IntentRejection::Inactive { intent: name })
            }
        }
    }

    fn start(
        self: &Arc<Self>,
        connection: Uuid,
        options: StartOptions,
        notifier: &broadcast::Sender<Notification>,
    ) -> Result<(), IntentRejection> {
        if self.sessions.contains_key(&connection) {
            return Err(IntentRejection::AlreadyStarted);
        }

        let session_id = Uuid::new_v4();
        let game_id = snapshot_key(Utc::now(), session_id);
        let game = match deal(&game_id, &self.config.table, &mut rand::rng()) {
            Ok(game) => game,
            Err(err) => {
                let err = SessionError::from(err);
                error!(%connection, error = %err, "Could not deal a new game");
                let _ = notifier.send(Notification::error(err.to_string()));
                return Ok(());
            }
        };

        let voice = options.voice_enabled;
        let token = CancellationToken::new();
        let (session, link) = GameSession::new(
            game,
            self.config.clone(),
            options,
            notifier.clone(),
            token.clone(),
        );
        self.sessions.insert(
            connection,
            SessionHandle {
                id: session_id,
                intents: link.intents,
                flags: link.flags,
                prompt: link.prompt,
                snapshot: link.snapshot,
                token,
            },
        );
        info!(%connection, game = %game_id, voice, "Session created");

        let manager = Arc::clone(self);
        let notifier = notifier.clone();
        tokio::spawn(async move {
            let outcome = tokio::spawn(session.run()).await;
            let failure = match outcome {
                Ok(Ok(winner)) => {
                    info!(%connection, game = %game_id, winner = %winner, "Session finished");
                    return;
                }
                Ok(Err(SessionError::Cancelled)) => {
                    debug!(%connection, game = %game_id, "Session cancelled");
                    return;
                }
                Ok(Err(err)) => err.to_string(),
                Err(join_err) if join_err.is_panic() => "internal error".to_string(),
                Err(join_err) => join_err.to_string(),
            };
            warn!(%connection, game = %game_id, error = %failure, "Session failed, discarding it");
            let _ = notifier.send(Notification::error(format!(
                "The game stopped unexpectedly ({}). Restart to play again.",
                failure
            )));
            manager.discard(connection, session_id);
        });
        Ok(())
    }

    /// Re-send the table and any unanswered request to a client that missed
    /// notifications. Returns false when the connection has no session.
    pub fn resync(&self, connection: Uuid, notifier: &broadcast::Sender<Notification>) -> bool {
        let Some(handle) = self.sessions.get(&connection) else {
            return false;
        };
        let view = ClientView::of(&handle.snapshot.borrow());
        let pending = handle.prompt.borrow().clone();
        drop(handle);

        debug!(%connection, pending = pending.is_some(), "Resyncing client");
        let _ = notifier.send(Notification::GameState { view });
        if let Some(request) = pending {
            let _ = notifier.send(request);
        }
        true
    }

    /// Cancel and forget the connection's session, if any.
    pub fn destroy(&self, connection: Uuid) -> bool {
        match self.sessions.remove(&connection) {
            Some((_, handle)) => {
                handle.token.cancel();
                info!(%connection, "Session destroyed");
                true
            }
            None => false,
        }
    }

    fn discard(&self, connection: Uuid, session_id: Uuid) {
        if let Some((_, handle)) = self
            .sessions
            .remove_if(&connection, |_, handle| handle.id == session_id)
        {
            handle.token.cancel();
        }
    }
}
