//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use skyrelay_core::protocol::DEFAULT_ACCESS_HINT;
use skyrelay_settings::RelaySettings;

/// Runtime configuration for [`RelayServer`](crate::server::RelayServer).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
    /// Evict sessions empty for this long; `0` disables eviction.
    pub session_idle_ttl_secs: u64,
    /// Sweeper period in seconds.
    pub sweep_interval_secs: u64,
    /// Text of `access_required.hint`.
    pub access_hint: String,
}

impl ServerConfig {
    /// Derive server config from loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            heartbeat_interval_secs: settings.server.heartbeat_interval_secs,
            heartbeat_timeout_secs: settings.server.heartbeat_timeout_secs,
            max_message_size: settings.server.max_message_size,
            send_queue_capacity: settings.server.send_queue_capacity,
            session_idle_ttl_secs: settings.sessions.idle_ttl_secs,
            sweep_interval_secs: settings.sessions.sweep_interval_secs,
            access_hint: settings.sessions.access_hint.clone(),
        }
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Pong deadline, never shorter than one ping period.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs).max(self.heartbeat_interval())
    }

    /// Idle TTL, or `None` when eviction is disabled.
    pub fn session_idle_ttl(&self) -> Option<Duration> {
        (self.session_idle_ttl_secs > 0).then(|| Duration::from_secs(self.session_idle_ttl_secs))
    }

    /// Sweeper period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024, // 1 MiB
            send_queue_capacity: 256,
            session_idle_ttl_secs: 86_400,
            sweep_interval_secs: 60,
            access_hint: DEFAULT_ACCESS_HINT.into(),
        }
    }
}
