// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the scanner pool broker.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::BrokerState;

/// Build the axum `Router` with all broker routes.
pub fn build_router(state: Arc<BrokerState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // External command surface
        .route("/api/v1/assign", post(http::assign))
        .route("/api/v1/scanners", get(http::list_scanners))
        // Persistent channels
        .route("/ws/device", get(ws::device_handler))
        .route("/ws/observer", get(ws::observer_handler))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
