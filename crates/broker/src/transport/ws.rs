// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket handlers for scanner and observer connections.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::pool::snapshot_locked;
use crate::protocol::{DeviceCommand, ObserverCommand, ServerMessage};
use crate::state::{BrokerState, ConnHandle, Role};
use crate::transport::auth;

/// Query parameters for WS upgrades.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    pub secret: Option<String>,
}

/// `GET /ws/device` — WebSocket upgrade for a scanner.
pub async fn device_handler(
    State(state): State<Arc<BrokerState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade(state, query, ws, Role::Device)
}

/// `GET /ws/observer` — WebSocket upgrade for a supervisory observer.
pub async fn observer_handler(
    State(state): State<Arc<BrokerState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade(state, query, ws, Role::Observer)
}

/// Validate the shared secret, then hand the socket to the connection task.
///
/// A bad secret is refused before any pool state is touched.
fn upgrade(
    state: Arc<BrokerState>,
    query: WsQuery,
    ws: WebSocketUpgrade,
    role: Role,
) -> axum::response::Response {
    if auth::validate_ws_secret(query.secret.as_deref(), state.config.secret.as_deref()).is_err() {
        return axum::http::Response::builder()
            .status(403)
            .body(axum::body::Body::from("unauthorized"))
            .unwrap_or_default()
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_conn(state, socket, role)).into_response()
}

/// Per-connection task: admit, pump messages, tear down.
async fn handle_conn(state: Arc<BrokerState>, socket: WebSocket, role: Role) {
    let (tx, mut outbound) = tokio::sync::mpsc::unbounded_channel::<Message>();
    let handle = state.admit(role, tx).await;
    tracing::info!(conn_id = %handle.id, role = ?role, "connection admitted");

    // New observers get the current snapshot immediately.
    if role == Role::Observer {
        let pool = state.pool.read().await;
        let msg = ServerMessage::ScannerList { scanners: snapshot_locked(&pool) };
        if let Ok(json) = serde_json::to_string(&msg) {
            let _ = handle.tx.send(Message::Text(json.into()));
        }
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: drain the outbound queue onto the socket.
    let writer_cancel = handle.cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                msg = outbound.recv() => match msg {
                    Some(msg) => {
                        if ws_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    read_loop(&state, &handle, &mut ws_rx, role).await;

    state.remove_conn(&handle.id).await;
    tracing::info!(conn_id = %handle.id, role = ?role, "connection closed");
    let _ = writer.await;
}

/// Inbound message loop.
///
/// Exits on socket close/error, on cancellation (sweep or removal), or when
/// a device connection fails to register within the grace window.
async fn read_loop(
    state: &BrokerState,
    handle: &ConnHandle,
    ws_rx: &mut SplitStream<WebSocket>,
    role: Role,
) {
    let grace = tokio::time::sleep(state.config.register_grace());
    tokio::pin!(grace);
    // Observers never register; only devices are subject to the grace window.
    let mut registered = role == Role::Observer;

    loop {
        tokio::select! {
            _ = handle.cancel.cancelled() => break,

            _ = &mut grace, if !registered => {
                tracing::warn!(conn_id = %handle.id, "scanner did not register within grace window, closing");
                break;
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match role {
                        Role::Device => {
                            if handle_device_message(state, handle, &text).await {
                                registered = true;
                            }
                        }
                        Role::Observer => handle_observer_message(state, handle, &text).await,
                    },
                    Some(Ok(Message::Pong(_))) => state.mark_alive(&handle.id).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

/// Handle one text frame from a scanner connection.
///
/// Returns true when the frame was a registration command (the grace timer
/// is disarmed even for a duplicate — the scanner is registered either way).
async fn handle_device_message(state: &BrokerState, handle: &ConnHandle, text: &str) -> bool {
    let cmd = match serde_json::from_str::<DeviceCommand>(text) {
        Ok(cmd) => cmd,
        Err(e) => {
            tracing::debug!(conn_id = %handle.id, err = %e, "ignoring malformed scanner message");
            return false;
        }
    };

    match cmd {
        DeviceCommand::Register { metadata } => {
            state.register_device(&handle.id, &metadata).await;
            true
        }
        DeviceCommand::Free => {
            state.free(&handle.id).await;
            false
        }
    }
}

/// Handle one text frame from an observer connection.
async fn handle_observer_message(state: &BrokerState, handle: &ConnHandle, text: &str) {
    let cmd = match serde_json::from_str::<ObserverCommand>(text) {
        Ok(cmd) => cmd,
        Err(e) => {
            tracing::debug!(conn_id = %handle.id, err = %e, "ignoring malformed observer message");
            return;
        }
    };

    match cmd {
        ObserverCommand::Free { id } => {
            state.free(&id).await;
        }
    }
}
