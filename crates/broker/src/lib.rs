// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scanmux: connection registry and assignment broker for a pool of
//! barcode-scanner devices.

pub mod config;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod state;
pub mod sweep;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;
use crate::state::BrokerState;
use crate::sweep::spawn_liveness_sweep;
use crate::transport::build_router;

/// Run the broker until shutdown.
pub async fn run(config: BrokerConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = Arc::new(BrokerState::new(config, shutdown.clone()));

    if state.config.secret.is_some() {
        tracing::info!("scanmux listening on {addr}");
    } else {
        tracing::info!("scanmux listening on {addr} (auth disabled)");
    }
    spawn_liveness_sweep(Arc::clone(&state));

    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
