// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;

/// Shared broker state.
pub struct BrokerState {
    /// Every live connection, keyed by connection id.  All device status
    /// mutations happen under this single lock.
    pub pool: RwLock<Pool>,
    pub config: BrokerConfig,
    pub shutdown: CancellationToken,
}

impl BrokerState {
    pub fn new(config: BrokerConfig, shutdown: CancellationToken) -> Self {
        Self { pool: RwLock::new(Pool::default()), config, shutdown }
    }
}

/// The connection pool: live connections plus registered scanner state.
#[derive(Default)]
pub struct Pool {
    pub conns: HashMap<String, PoolConn>,
}

/// A live connection and, for registered scanners, its device state.
pub struct PoolConn {
    pub handle: Arc<ConnHandle>,
    /// `Some` once a device connection has sent `register-scanner`.
    pub device: Option<Device>,
}

/// Connection role, fixed at accept time from the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Device,
    Observer,
}

/// Shared per-connection handle.
///
/// Held by the pool, the connection task, and the liveness sweep.  The
/// outbound queue is unbounded so sends never block a lock holder.
pub struct ConnHandle {
    pub id: String,
    pub role: Role,
    pub tx: mpsc::UnboundedSender<Message>,
    /// Set true on accept and on every heartbeat reply, flipped false by the
    /// sweep before each probe.
    pub alive: AtomicBool,
    pub cancel: CancellationToken,
}

/// A registered scanner.
pub struct Device {
    pub status: DeviceStatus,
}

/// Occupancy state of a registered scanner.
#[derive(Debug, Clone)]
pub enum DeviceStatus {
    Free,
    Occupied { occupant: serde_json::Value, since_ms: u64 },
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
