// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the broker's external command surface.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::BrokerError;
use crate::protocol::StatusTag;
use crate::state::BrokerState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub connection_count: usize,
    pub scanner_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignResponse {
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub devices: Vec<DeviceInfo>,
}

#[derive(Debug, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub status: StatusTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupant: Option<serde_json::Value>,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<BrokerState>>) -> impl IntoResponse {
    let pool = s.pool.read().await;
    let scanner_count = pool.conns.values().filter(|c| c.device.is_some()).count();
    Json(HealthResponse {
        status: "running".to_owned(),
        connection_count: pool.conns.len(),
        scanner_count,
    })
}

/// `POST /api/v1/assign` — hand a free scanner to the posted occupant.
///
/// The body is the opaque occupant descriptor from the session-issuing
/// system, forwarded to the chosen scanner verbatim.
pub async fn assign(
    State(s): State<Arc<BrokerState>>,
    Json(occupant): Json<serde_json::Value>,
) -> impl IntoResponse {
    match s.assign(occupant).await {
        Some(device_id) => Json(AssignResponse { device_id }).into_response(),
        None => BrokerError::NoDeviceAvailable
            .to_http_response("no free scanner in the pool")
            .into_response(),
    }
}

/// `GET /api/v1/scanners` — point-in-time pool inspection.
pub async fn list_scanners(State(s): State<Arc<BrokerState>>) -> impl IntoResponse {
    let devices = s
        .snapshot()
        .await
        .into_iter()
        .map(|scanner| DeviceInfo {
            id: scanner.id,
            status: scanner.status,
            occupant: scanner.occupant,
            start_time: scanner.occupied_since,
        })
        .collect();
    Json(ListResponse { devices })
}
