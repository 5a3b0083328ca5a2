// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON wire protocol for the persistent scanner and observer channels.
//!
//! One JSON object per text frame, discriminated by a `type` field.
//! Heartbeats are transport-level ping/pong and never appear here.

use serde::{Deserialize, Serialize};

/// Messages a scanner connection may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum DeviceCommand {
    /// Register this connection as an assignable scanner.  Extra fields are
    /// free-form metadata (model, firmware, ...) and are logged, not stored.
    #[serde(rename = "register-scanner")]
    Register {
        #[serde(flatten)]
        metadata: serde_json::Map<String, serde_json::Value>,
    },
    /// Self-release after a finished session.
    #[serde(rename = "free")]
    Free,
}

/// Messages an observer connection may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ObserverCommand {
    /// Supervisory force-free of a specific scanner.
    #[serde(rename = "free")]
    Free { id: String },
}

/// Messages the broker pushes to scanner and observer connections.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Sent to a scanner when it is handed to a session.
    Assign { user: serde_json::Value },
    /// Sent to a scanner when it returns to the free pool.
    Freed,
    /// Full pool snapshot, pushed to every observer on every change.
    ScannerList { scanners: Vec<ScannerInfo> },
}

/// One scanner in a pool snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ScannerInfo {
    pub id: String,
    pub status: StatusTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupant: Option<serde_json::Value>,
    #[serde(rename = "occupiedSince", skip_serializing_if = "Option::is_none")]
    pub occupied_since: Option<u64>,
}

/// Wire rendering of a scanner's occupancy status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTag {
    Free,
    Occupied,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
