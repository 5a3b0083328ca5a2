// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic liveness sweep over all connections.
//!
//! Each pass closes connections that missed the previous probe, then flips
//! the alive flag and probes the rest.  A dead connection is therefore
//! detected within two sweep intervals at worst.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::Message;

use crate::state::{BrokerState, ConnHandle};

/// Spawn the background liveness sweep task.
pub fn spawn_liveness_sweep(state: Arc<BrokerState>) {
    let interval = state.config.heartbeat_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            sweep_once(&state).await;
        }
    });
}

/// One sweep pass.  Holds the pool lock only to snapshot handles; probes and
/// closures happen lock-free.
pub async fn sweep_once(state: &BrokerState) {
    let handles: Vec<Arc<ConnHandle>> = {
        let pool = state.pool.read().await;
        pool.conns.values().map(|c| Arc::clone(&c.handle)).collect()
    };

    for handle in &handles {
        // Skip connections already torn down since the snapshot was taken.
        if handle.cancel.is_cancelled() {
            continue;
        }

        // One atomic op: read the flag and arm the next probe.
        if handle.alive.swap(false, Ordering::Relaxed) {
            if handle.tx.send(Message::Ping(Bytes::new())).is_err() {
                tracing::debug!(conn_id = %handle.id, "heartbeat probe not queued, connection closing");
            }
        } else {
            tracing::warn!(conn_id = %handle.id, role = ?handle.role, "connection missed heartbeat, closing");
            handle.cancel.cancel();
        }
    }
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod tests;
