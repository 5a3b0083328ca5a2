// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::BrokerError;
use crate::state::BrokerState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate the shared secret from a Bearer header.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), BrokerError> {
    let expected = match expected {
        Some(secret) => secret,
        None => return Ok(()),
    };

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(BrokerError::Unauthorized)?;

    let supplied = header.strip_prefix("Bearer ").ok_or(BrokerError::Unauthorized)?;
    if constant_time_eq(supplied, expected) {
        Ok(())
    } else {
        Err(BrokerError::Unauthorized)
    }
}

/// Validate the shared secret supplied as a connection parameter (`?secret=`).
pub fn validate_ws_secret(supplied: Option<&str>, expected: Option<&str>) -> Result<(), BrokerError> {
    let expected = match expected {
        Some(secret) => secret,
        None => return Ok(()),
    };

    match supplied {
        Some(value) if constant_time_eq(value, expected) => Ok(()),
        _ => Err(BrokerError::Unauthorized),
    }
}

/// Axum middleware that enforces shared-secret authentication.
///
/// Exempt: `/api/v1/health` and WebSocket upgrades (`/ws/`).
/// WS auth is handled via query param in the WS handlers.
pub async fn auth_layer(
    state: State<Arc<BrokerState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();

    if path == "/api/v1/health" || path.starts_with("/ws/") {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), state.config.secret.as_deref()) {
        let body = crate::error::ErrorResponse { error: code.to_error_body("unauthorized") };
        return (
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::FORBIDDEN),
            axum::Json(body),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
