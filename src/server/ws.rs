use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::session::{Intent, Notification, SessionManager};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound buffer per connection. Audio chunks make up most of it.
const OUTBOX_CAPACITY: usize = 256;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection = Uuid::new_v4();
    info!(%connection, "Client connected");

    let (sender, receiver) = socket.split();
    let (notifier, rx) = broadcast::channel(OUTBOX_CAPACITY);
    run_socket_loop(sender, receiver, rx, &state.manager, connection, &notifier).await;

    state.manager.destroy(connection);
    info!(%connection, "Client disconnected");
}

/// Forward notifications out, feed intents in, and keep the connection
/// alive with ping/pong. Returns when either side goes away.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<Notification>,
    manager: &Arc<SessionManager>,
    connection: Uuid,
    notifier: &broadcast::Sender<Notification>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    warn!(%connection, "No pong received, dropping connection");
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(notification) => {
                        let Some(json) = encode(&notification) else {
                            continue;
                        };
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%connection, skipped, "Client fell behind, notifications dropped");
                        // A dropped request would leave the client without its controls
                        manager.resync(connection, notifier);
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_text(manager, connection, notifier, text.as_str());
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

/// Parse one client frame and hand it to the session manager. Problems are
/// echoed back as `error_message` notifications.
pub(crate) fn handle_client_text(
    manager: &Arc<SessionManager>,
    connection: Uuid,
    notifier: &broadcast::Sender<Notification>,
    text: &str,
) {
    let intent: Intent = match serde_json::from_str(text) {
        Ok(intent) => intent,
        Err(err) => {
            debug!(%connection, error = %err, "Unreadable client message");
            let _ = notifier.send(Notification::error(format!("Unreadable message: {}", err)));
            return;
        }
    };

    let name = intent.name();
    if let Err(rejection) = manager.dispatch(connection, intent, notifier) {
        debug!(%connection, intent = name, %rejection, "Intent rejected");
        let _ = notifier.send(Notification::error(rejection.to_string()));
    }
}

fn encode(notification: &Notification) -> Option<String> {
    match serde_json::to_string(notification) {
        Ok(json) => Some(json),
        Err(err) => {
            warn!(error = %err, "Failed to serialize notification");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::session::testing::config;

    fn setup() -> (
        Arc<SessionManager>,
        broadcast::Sender<Notification>,
        broadcast::Receiver<Notification>,
    ) {
        let manager = SessionManager::new(config(Arc::new(MemoryStore::new())));
        let (notifier, rx) = broadcast::channel(64);
        (manager, notifier, rx)
    }

    fn error_text(rx: &mut broadcast::Receiver<Notification>) -> String {
        match rx.try_recv() {
            Ok(Notification::ErrorMessage { message }) => message,
            other => panic!("expected an error message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_json_is_echoed_as_error() {
        let (manager, notifier, mut rx) = setup();
        handle_client_text(&manager, Uuid::new_v4(), &notifier, "{not json");
        assert!(error_text(&mut rx).starts_with("Unreadable message"));
    }

    #[tokio::test]
    async fn test_unknown_intent_is_echoed_as_error() {
        let (manager, notifier, mut rx) = setup();
        handle_client_text(&manager, Uuid::new_v4(), &notifier, r#"{"type":"fly_away"}"#);
        assert!(error_text(&mut rx).starts_with("Unreadable message"));
    }

    #[tokio::test]
    async fn test_rejection_is_echoed_as_error() {
        let (manager, notifier, mut rx) = setup();
        handle_client_text(
            &manager,
            Uuid::new_v4(),
            &notifier,
            r#"{"type":"send_vote","data":{"target":3}}"#,
        );
        assert_eq!(error_text(&mut rx), "No game is running for this connection");
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_game_frame_creates_session() {
        let (manager, notifier, _rx) = setup();
        let connection = Uuid::new_v4();
        handle_client_text(
            &manager,
            connection,
            &notifier,
            r#"{"type":"start_game","data":{"voice_enabled":false}}"#,
        );
        assert_eq!(manager.len(), 1);
        manager.destroy(connection);
    }

    #[test]
    fn test_encode_uses_type_and_data() {
        let json = encode(&Notification::log("hello")).unwrap();
        assert_eq!(json, r#"{"type":"log_message","data":{"message":"hello"}}"#);
    }
}
