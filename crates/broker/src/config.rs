// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the scanner pool broker.
#[derive(Debug, Clone, clap::Parser)]
pub struct BrokerConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "SCANMUX_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9700, env = "SCANMUX_PORT")]
    pub port: u16,

    /// Shared secret for API and scanner connections. If unset, auth is disabled.
    #[arg(long, env = "SCANMUX_SECRET")]
    pub secret: Option<String>,

    /// Heartbeat sweep interval in milliseconds.
    #[arg(long, default_value_t = 30000, env = "SCANMUX_HEARTBEAT_MS")]
    pub heartbeat_ms: u64,

    /// Grace period for a scanner connection to register, in milliseconds.
    #[arg(long, default_value_t = 10000, env = "SCANMUX_REGISTER_GRACE_MS")]
    pub register_grace_ms: u64,
}

impl BrokerConfig {
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_ms)
    }

    pub fn register_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.register_grace_ms)
    }
}
