//! Push channel: `GET /ws?userId=<id>`.
//!
//! A known account id registers the socket with the connection manager; a
//! missing or unknown id gets an anonymous socket that receives the welcome
//! and nothing else. Each socket runs one task
//! that multiplexes the outbound queue and inbound frames.

use axum::extract::rejection::QueryRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{session, AppState};
use crate::protocol::{ClientMessage, PushMessage};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct WsParams {
    user_id: Option<String>,
}

pub(super) async fn handler_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    params: Result<Query<WsParams>, QueryRejection>,
) -> impl IntoResponse {
    let requested = params
        .ok()
        .and_then(|Query(p)| p.user_id)
        .and_then(|raw| raw.trim().parse::<i64>().ok());
    let account_id = match requested {
        Some(id) => match state.db.get_account(id).await {
            Ok(Some(_)) => Some(id),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, account_id = id, "push channel account lookup failed");
                None
            }
        },
        None => None,
    };
    ws.on_upgrade(move |socket| ws_loop(socket, state, account_id))
}

async fn send(socket: &mut WebSocket, message: &PushMessage) -> bool {
    let Ok(text) = serde_json::to_string(message) else {
        return false;
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}

async fn ws_loop(mut socket: WebSocket, state: Arc<AppState>, account_id: Option<i64>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<PushMessage>();
    // Anonymous sockets hold their own sender so the queue stays open.
    let mut _anonymous_tx = None;
    let connection = match account_id {
        Some(id) => {
            let handle = state.connections.register(id, tx);
            state.metrics.push_connections.set(state.connections.len() as i64);
            debug!(account_id = id, "push channel registered");
            Some(handle)
        }
        None => {
            _anonymous_tx = Some(tx);
            None
        }
    };

    if send(&mut socket, &PushMessage::welcome()).await {
        loop {
            tokio::select! {
                outbound = rx.recv() => {
                    match outbound {
                        Some(message) => {
                            if !send(&mut socket, &message).await {
                                break;
                            }
                        }
                        // Replaced by a newer connection for the same account.
                        None => break,
                    }
                }
                inbound = socket.recv() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if !handle_client_message(&mut socket, &state, account_id, text.as_str()).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        _ => {}
                    }
                }
            }
        }
    }

    if let (Some(id), Some(handle)) = (account_id, connection) {
        state.connections.deregister(id, handle);
        state.metrics.push_connections.set(state.connections.len() as i64);
        debug!(account_id = id, "push channel closed");
    }
}

/// Returns false when the socket should close.
async fn handle_client_message(
    socket: &mut WebSocket,
    state: &AppState,
    account_id: Option<i64>,
    text: &str,
) -> bool {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Sync) => {
            let Some(id) = account_id else {
                debug!("sync requested on anonymous push channel");
                return true;
            };
            match session::snapshot(state, id).await {
                Ok(user) => send(socket, &PushMessage::Sync(Box::new(user))).await,
                Err(e) => {
                    warn!(account_id = id, error = e.message(), "push sync failed");
                    true
                }
            }
        }
        Err(e) => {
            debug!(error = %e, "ignoring unrecognized push message");
            true
        }
    }
}
