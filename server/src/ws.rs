use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

use crate::config::ServerConfig;
use crate::entity::FrameInput;
use crate::game_loop::GameCommand;
use crate::ledger::SharedLedger;
use crate::protocol::{ClientMsg, ServerMsg, StartRejectedMsg};
use crate::state::OUTBOX_CAPACITY;

/// Text frames larger than this close the connection
pub const MAX_MESSAGE_BYTES: usize = 1024;
/// Unparsable messages tolerated before the connection is closed
pub const MAX_PARSE_ERRORS: u32 = 5;

/// Shared app state passed to each WebSocket and REST handler
#[derive(Clone)]
pub struct AppState {
    pub game_tx: mpsc::Sender<GameCommand>,
    pub config: Arc<ServerConfig>,
    pub ledger: SharedLedger,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_BYTES * 4)
        .on_upgrade(|socket| handle_socket(socket, app_state))
}

/// Fixed one-second window message counter.
struct RateLimiter {
    max_per_sec: u32,
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    fn new(max_per_sec: u32) -> Self {
        Self {
            max_per_sec,
            window_start: Instant::now(),
            count: 0,
        }
    }

    /// Count one message. Returns false once the window's budget is exceeded.
    fn allow(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.count = 0;
        }
        self.count += 1;
        self.count <= self.max_per_sec
    }
}

async fn send_json<S>(sink: &mut S, msg: &ServerMsg) -> bool
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => sink.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // Join the game; everything addressed to this client arrives on `outbox_rx`
    let (outbox, mut outbox_rx) = mpsc::channel(OUTBOX_CAPACITY);
    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .game_tx
        .send(GameCommand::ClientJoin {
            outbox,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        tracing::error!("Failed to send ClientJoin command");
        return;
    }

    let (my_id, welcome) = match resp_rx.await {
        Ok(Some(result)) => result,
        Ok(None) => {
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
        Err(_) => {
            tracing::error!("Failed to receive welcome");
            return;
        }
    };

    tracing::info!("Client {} connected", my_id);

    if !send_json(&mut sink, &ServerMsg::Welcome(welcome)).await {
        leave(&app_state, my_id).await;
        return;
    }

    let mut parse_errors = 0u32;
    let mut limiter = RateLimiter::new(app_state.config.max_inputs_per_sec);

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_MESSAGE_BYTES {
                            tracing::warn!("Client {} sent oversized message ({} bytes)", my_id, text.len());
                            break;
                        }
                        if !limiter.allow() {
                            tracing::warn!("Client {} exceeded {} messages/s", my_id, limiter.max_per_sec);
                            break;
                        }
                        let client_msg = match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(client_msg) => client_msg,
                            Err(e) => {
                                parse_errors += 1;
                                tracing::debug!("Client {} sent unparsable message: {}", my_id, e);
                                if parse_errors >= MAX_PARSE_ERRORS {
                                    tracing::warn!("Client {} exceeded parse error limit", my_id);
                                    break;
                                }
                                continue;
                            }
                        };

                        let cmd = match client_msg {
                            ClientMsg::Start { user_id, width, height } => {
                                match app_state.config.area_for(width, height) {
                                    Ok(area) => GameCommand::Start { id: my_id, user_id, area },
                                    Err(reason) => {
                                        let msg = ServerMsg::StartRejected(StartRejectedMsg { reason });
                                        if !send_json(&mut sink, &msg).await {
                                            break;
                                        }
                                        continue;
                                    }
                                }
                            }
                            ClientMsg::Input { turn_left, turn_right, thrust, fire } => {
                                GameCommand::Input {
                                    id: my_id,
                                    input: FrameInput { turn_left, turn_right, thrust, fire },
                                }
                            }
                            ClientMsg::Pause => GameCommand::Pause { id: my_id },
                            ClientMsg::Resume => GameCommand::Resume { id: my_id },
                            ClientMsg::Exit => GameCommand::Exit { id: my_id },
                        };
                        if app_state.game_tx.send(cmd).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        parse_errors += 1;
                        if parse_errors >= MAX_PARSE_ERRORS {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("Client {} socket error: {}", my_id, e);
                        break;
                    }
                    _ => {} // Ignore ping/pong
                }
            }

            // Server -> Client
            msg = outbox_rx.recv() => {
                // None: the game loop dropped this client or shut down
                let Some(msg) = msg else { break };
                if !send_json(&mut sink, &msg).await {
                    break;
                }
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    leave(&app_state, my_id).await;
}

async fn leave(app_state: &AppState, id: u32) {
    let _ = app_state
        .game_tx
        .send(GameCommand::ClientLeave { id })
        .await;
    tracing::info!("Client {} disconnected", id);
}
