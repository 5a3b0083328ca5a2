// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assignment broker: all pool mutations and observer fan-out.
//!
//! Every state transition (register, assign, free, removal) takes the pool
//! write lock, so no two operations on the same scanner are ever concurrent.
//! Outbound sends are unbounded-queue pushes; a failed send is logged and
//! never propagates into the mutation path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{ScannerInfo, ServerMessage, StatusTag};
use crate::state::{epoch_ms, BrokerState, ConnHandle, Device, DeviceStatus, Pool, PoolConn, Role};

impl BrokerState {
    /// Admit an authenticated connection into the pool.
    ///
    /// The caller must have validated the shared secret before calling this;
    /// an unauthenticated peer must never appear in the pool.
    pub async fn admit(&self, role: Role, tx: mpsc::UnboundedSender<Message>) -> Arc<ConnHandle> {
        let handle = Arc::new(ConnHandle {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            tx,
            alive: AtomicBool::new(true),
            cancel: CancellationToken::new(),
        });
        let mut pool = self.pool.write().await;
        pool.conns
            .insert(handle.id.clone(), PoolConn { handle: Arc::clone(&handle), device: None });
        handle
    }

    /// Record a heartbeat reply.  No-op for ids already removed.
    pub async fn mark_alive(&self, id: &str) {
        let pool = self.pool.read().await;
        if let Some(conn) = pool.conns.get(id) {
            conn.handle.alive.store(true, Ordering::Relaxed);
        }
    }

    /// Register a device connection as an assignable scanner.
    ///
    /// Duplicate registrations and registrations from non-device connections
    /// are logged no-ops.
    pub async fn register_device(
        &self,
        id: &str,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> bool {
        let mut pool = self.pool.write().await;
        let Some(conn) = pool.conns.get_mut(id) else {
            tracing::debug!(conn_id = %id, "registration from unknown connection ignored");
            return false;
        };
        if conn.handle.role != Role::Device {
            tracing::warn!(conn_id = %id, "registration from non-device connection ignored");
            return false;
        }
        if conn.device.is_some() {
            tracing::warn!(scanner_id = %id, "duplicate registration ignored");
            return false;
        }
        conn.device = Some(Device { status: DeviceStatus::Free });
        if metadata.is_empty() {
            tracing::info!(scanner_id = %id, "scanner registered");
        } else {
            let meta = serde_json::Value::Object(metadata.clone());
            tracing::info!(scanner_id = %id, metadata = %meta, "scanner registered");
        }
        broadcast_locked(&pool);
        true
    }

    /// Hand a free scanner to the given occupant.
    ///
    /// The selection and the `free -> occupied` flip happen under the same
    /// write lock, so two concurrent assigns can never pick the same scanner.
    /// Returns the scanner id, or `None` when no scanner is free (nothing is
    /// mutated in that case).
    pub async fn assign(&self, occupant: serde_json::Value) -> Option<String> {
        let mut pool = self.pool.write().await;

        // Any free scanner is acceptable; no ordering guarantee.
        let target = pool
            .conns
            .values()
            .find(|c| matches!(c.device, Some(Device { status: DeviceStatus::Free })))
            .map(|c| c.handle.id.clone());
        let Some(id) = target else {
            tracing::info!("assignment requested but no scanner is free");
            return None;
        };

        if let Some(conn) = pool.conns.get_mut(&id) {
            if let Some(device) = conn.device.as_mut() {
                device.status =
                    DeviceStatus::Occupied { occupant: occupant.clone(), since_ms: epoch_ms() };
            }
            send_to(&conn.handle, &ServerMessage::Assign { user: occupant });
        }
        tracing::info!(scanner_id = %id, "scanner assigned");
        broadcast_locked(&pool);
        Some(id)
    }

    /// Return a scanner to the free pool.
    ///
    /// Both self-release and observer force-free converge here.  The scanner
    /// is told it has been freed in either case.  Unknown or already-free
    /// targets are logged no-ops.
    pub async fn free(&self, id: &str) -> bool {
        let mut pool = self.pool.write().await;
        let Some(conn) = pool.conns.get_mut(id) else {
            tracing::debug!(scanner_id = %id, "free for unknown scanner ignored");
            return false;
        };
        match conn.device.as_mut() {
            Some(device) if matches!(device.status, DeviceStatus::Occupied { .. }) => {
                device.status = DeviceStatus::Free;
                send_to(&conn.handle, &ServerMessage::Freed);
                tracing::info!(scanner_id = %id, "scanner freed");
                broadcast_locked(&pool);
                true
            }
            _ => {
                tracing::debug!(scanner_id = %id, "free for unregistered or already-free scanner ignored");
                false
            }
        }
    }

    /// Remove a connection from the pool.
    ///
    /// Called from connection teardown.  A registered scanner is deleted
    /// whatever its status; its former occupant gets no compensating signal.
    pub async fn remove_conn(&self, id: &str) {
        let mut pool = self.pool.write().await;
        let Some(conn) = pool.conns.remove(id) else {
            return;
        };
        conn.handle.cancel.cancel();
        if conn.device.is_some() {
            tracing::info!(scanner_id = %id, "scanner removed from pool");
            broadcast_locked(&pool);
        } else {
            tracing::debug!(conn_id = %id, role = ?conn.handle.role, "connection removed");
        }
    }

    /// Point-in-time snapshot of all registered scanners, sorted by id.
    pub async fn snapshot(&self) -> Vec<ScannerInfo> {
        let pool = self.pool.read().await;
        snapshot_locked(&pool)
    }
}

/// Render the scanner list from a locked pool, sorted by id for determinism.
pub fn snapshot_locked(pool: &Pool) -> Vec<ScannerInfo> {
    let mut scanners: Vec<ScannerInfo> = pool
        .conns
        .values()
        .filter_map(|conn| {
            let device = conn.device.as_ref()?;
            Some(match &device.status {
                DeviceStatus::Free => ScannerInfo {
                    id: conn.handle.id.clone(),
                    status: StatusTag::Free,
                    occupant: None,
                    occupied_since: None,
                },
                DeviceStatus::Occupied { occupant, since_ms } => ScannerInfo {
                    id: conn.handle.id.clone(),
                    status: StatusTag::Occupied,
                    occupant: Some(occupant.clone()),
                    occupied_since: Some(*since_ms),
                },
            })
        })
        .collect();
    scanners.sort_by(|a, b| a.id.cmp(&b.id));
    scanners
}

/// Push the current snapshot to every observer connection.
///
/// Delivery is best-effort and per-observer: a closed observer queue is
/// skipped without affecting the rest or the triggering operation.
pub fn broadcast_locked(pool: &Pool) {
    let msg = ServerMessage::ScannerList { scanners: snapshot_locked(pool) };
    let Ok(json) = serde_json::to_string(&msg) else {
        return;
    };
    for conn in pool.conns.values().filter(|c| c.handle.role == Role::Observer) {
        if conn.handle.tx.send(Message::Text(json.clone().into())).is_err() {
            tracing::debug!(conn_id = %conn.handle.id, "observer queue closed, skipping");
        }
    }
}

/// Queue a message to a single connection, fire-and-forget.
fn send_to(handle: &ConnHandle, msg: &ServerMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            if handle.tx.send(Message::Text(json.into())).is_err() {
                tracing::debug!(conn_id = %handle.id, "connection queue closed, message dropped");
            }
        }
        Err(e) => {
            tracing::debug!(conn_id = %handle.id, err = %e, "failed to serialize message");
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
