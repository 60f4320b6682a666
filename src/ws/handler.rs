//! WebSocket upgrade handler

use std::fmt::Display;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::PlayerInput;
use crate::util::rate_limit::{Admission, InputThrottle};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientEvent, ServerMsg};

/// Largest inbound frame accepted, in bytes
pub const MAX_MESSAGE_SIZE: usize = 512;

/// How long a connection may stay silent before it is dropped
pub const PONG_WAIT: Duration = Duration::from_secs(10);

/// Ping interval, kept below `PONG_WAIT` so a healthy client always answers in time
pub const PING_INTERVAL: Duration = Duration::from_secs(9);

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (player_id, outbox) = open_session(&state);

    info!(player_id = %player_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    // Spawn writer task: outbox -> WebSocket
    let writer_handle = tokio::spawn(write_loop(player_id, ws_sink, outbox));

    // Reader loop: WebSocket -> simulation
    read_loop(player_id, ws_stream, &state).await;

    close_session(&state, &player_id);
    writer_handle.abort();

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Register a fresh player and its outbox
fn open_session(state: &AppState) -> (Uuid, mpsc::Receiver<ServerMsg>) {
    let player_id = state.world.spawn_player("");
    let outbox = state.broadcaster.register(player_id);
    (player_id, outbox)
}

/// Forget the player and drop its outbox, which also ends its writer
fn close_session(state: &AppState, player_id: &Uuid) {
    state.world.remove_player(player_id);
    state.broadcaster.unregister(player_id);
}

async fn read_loop<S>(player_id: Uuid, mut ws_stream: S, state: &AppState)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut throttle = InputThrottle::new();

    loop {
        let next = match tokio::time::timeout(PONG_WAIT, ws_stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                warn!(player_id = %player_id, "Connection timed out");
                break;
            }
        };

        let Some(result) = next else {
            debug!(player_id = %player_id, "Stream ended");
            break;
        };

        match result {
            Ok(Message::Text(text)) => {
                let decoded = ClientEvent::decode(&text);

                let is_release = matches!(&decoded, Ok(Some(event)) if event.is_release());
                if !is_release {
                    if let Admission::Throttled { streak } = throttle.admit() {
                        // one warning per burst
                        if streak == 1 {
                            warn!(player_id = %player_id, "Input rate exceeded, dropping frames");
                        }
                        continue;
                    }
                }

                match decoded {
                    Ok(Some(event)) => {
                        let input = PlayerInput {
                            player_id,
                            event,
                            received_at: unix_millis(),
                        };

                        if state.simulation.submit(input).await.is_err() {
                            error!(player_id = %player_id, "Simulation stopped, closing connection");
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(player_id = %player_id, "Ignoring unsupported event type");
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                        state.broadcaster.deliver(
                            &player_id,
                            ServerMsg::Rejected {
                                reason: e.to_string(),
                            },
                        );
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(player_id = %player_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(player_id = %player_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

async fn write_loop<S>(player_id: Uuid, mut ws_sink: S, mut outbox: mpsc::Receiver<ServerMsg>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = tokio::time::interval(PING_INTERVAL);
    // the first tick fires immediately
    ping.tick().await;

    loop {
        tokio::select! {
            msg = outbox.recv() => {
                let Some(msg) = msg else {
                    debug!(player_id = %player_id, "Outbox closed");
                    break;
                };
                let frame = match encode(&msg) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!(player_id = %player_id, error = %e, "Failed to encode message");
                        continue;
                    }
                };
                if let Err(e) = ws_sink.send(frame).await {
                    debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if let Err(e) = ws_sink.send(Message::Ping(Vec::new())).await {
                    debug!(player_id = %player_id, error = %e, "Ping failed");
                    break;
                }
            }
        }
    }

    let _ = ws_sink.close().await;
}

fn encode(msg: &ServerMsg) -> Result<Message, serde_json::Error> {
    serde_json::to_string(msg).map(Message::Text)
}
