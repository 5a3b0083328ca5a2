// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the broker HTTP API.
//!
//! Uses `axum_test::TestServer` — no real TCP needed.  Scanner connections
//! are seeded directly into the state, bypassing the WebSocket layer.

use std::sync::Arc;

use axum::extract::ws::Message;
use axum::http::StatusCode;
use axum_test::TestServer;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use scanmux::config::BrokerConfig;
use scanmux::state::{BrokerState, Role};
use scanmux::transport::build_router;

fn test_config(secret: Option<&str>) -> BrokerConfig {
    BrokerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        secret: secret.map(str::to_owned),
        heartbeat_ms: 30000,
        register_grace_ms: 10000,
    }
}

fn test_state(secret: Option<&str>) -> Arc<BrokerState> {
    Arc::new(BrokerState::new(test_config(secret), CancellationToken::new()))
}

fn test_server(state: Arc<BrokerState>) -> TestServer {
    let router = build_router(state);
    TestServer::new(router).expect("failed to create test server")
}

/// Admit and register a fake scanner connection; returns its id and outbound queue.
async fn insert_scanner(state: &BrokerState) -> (String, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = state.admit(Role::Device, tx).await;
    state.register_device(&handle.id, &serde_json::Map::new()).await;
    (handle.id.clone(), rx)
}

fn next_json(rx: &mut mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
    loop {
        match rx.try_recv().expect("expected a queued message") {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("valid json frame")
            }
            _ => continue,
        }
    }
}

// -- Health -------------------------------------------------------------------

#[tokio::test]
async fn health_reports_pool_counts() {
    let state = test_state(None);
    insert_scanner(&state).await;
    insert_scanner(&state).await;

    let server = test_server(state);
    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["connection_count"], 2);
    assert_eq!(body["scanner_count"], 2);
}

// -- List ---------------------------------------------------------------------

#[tokio::test]
async fn list_empty_pool() {
    let state = test_state(None);
    let server = test_server(state);

    let resp = server.get("/api/v1/scanners").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["devices"].as_array().map(|a| a.len()), Some(0));
}

#[tokio::test]
async fn list_shows_registered_scanners() {
    let state = test_state(None);
    let (id_a, _rx_a) = insert_scanner(&state).await;
    let (id_b, _rx_b) = insert_scanner(&state).await;

    let server = test_server(state);
    let resp = server.get("/api/v1/scanners").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    let devices = body["devices"].as_array().expect("devices array");
    assert_eq!(devices.len(), 2);
    let ids: Vec<&str> = devices.iter().filter_map(|d| d["id"].as_str()).collect();
    assert!(ids.contains(&id_a.as_str()));
    assert!(ids.contains(&id_b.as_str()));
    assert!(devices.iter().all(|d| d["status"] == "free"));
}

// -- Assign -------------------------------------------------------------------

#[tokio::test]
async fn assign_with_no_scanners_returns_400() {
    let state = test_state(None);
    let server = test_server(state);

    let resp = server.post("/api/v1/assign").json(&serde_json::json!({"name": "alice"})).await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "NO_DEVICE_AVAILABLE");
}

/// The reference walkthrough: register, assign Alice, refuse Bob, self-free.
#[tokio::test]
async fn assignment_scenario_round_trip() {
    let state = test_state(None);
    let (scanner_id, mut rx) = insert_scanner(&state).await;
    let server = test_server(Arc::clone(&state));

    // Pool shows one free scanner.
    let resp = server.get("/api/v1/scanners").await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["devices"][0]["id"], scanner_id.as_str());
    assert_eq!(body["devices"][0]["status"], "free");

    // Assign Alice.
    let resp = server.post("/api/v1/assign").json(&serde_json::json!({"name": "Alice"})).await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["deviceId"], scanner_id.as_str());

    // The scanner was told about its occupant.
    let msg = next_json(&mut rx);
    assert_eq!(msg["type"], "assign");
    assert_eq!(msg["user"]["name"], "Alice");

    // Pool shows it occupied.
    let resp = server.get("/api/v1/scanners").await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["devices"][0]["status"], "occupied");
    assert_eq!(body["devices"][0]["occupant"]["name"], "Alice");
    assert!(body["devices"][0]["startTime"].is_u64());

    // No scanner left for Bob.
    let resp = server.post("/api/v1/assign").json(&serde_json::json!({"name": "Bob"})).await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    // Self-release: the scanner returns to the pool and is confirmed free.
    assert!(state.free(&scanner_id).await);
    let msg = next_json(&mut rx);
    assert_eq!(msg["type"], "freed");

    let resp = server.get("/api/v1/scanners").await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["devices"][0]["status"], "free");
    assert!(body["devices"][0].get("occupant").is_none());
}

#[tokio::test]
async fn removed_scanner_no_longer_listed() {
    let state = test_state(None);
    let (scanner_id, _rx) = insert_scanner(&state).await;

    let server = test_server(Arc::clone(&state));
    server.post("/api/v1/assign").json(&serde_json::json!({"name": "alice"})).await;

    // Connection drops while occupied: entry deleted entirely.
    state.remove_conn(&scanner_id).await;

    let resp = server.get("/api/v1/scanners").await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["devices"].as_array().map(|a| a.len()), Some(0));
}

// -- Auth ---------------------------------------------------------------------

#[tokio::test]
async fn api_requires_secret_when_configured() {
    let state = test_state(Some("hunter2"));
    let server = test_server(state);

    let resp = server.get("/api/v1/scanners").await;
    resp.assert_status(StatusCode::FORBIDDEN);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = server.post("/api/v1/assign").json(&serde_json::json!({"name": "alice"})).await;
    resp.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn api_accepts_correct_secret() {
    let state = test_state(Some("hunter2"));
    let server = test_server(state);

    let resp = server.get("/api/v1/scanners").authorization_bearer("hunter2").await;
    resp.assert_status_ok();
}

#[tokio::test]
async fn api_rejects_wrong_secret() {
    let state = test_state(Some("hunter2"));
    let server = test_server(state);

    let resp = server.get("/api/v1/scanners").authorization_bearer("wrong").await;
    resp.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_is_exempt_from_auth() {
    let state = test_state(Some("hunter2"));
    let server = test_server(state);

    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();
}
