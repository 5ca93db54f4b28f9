//! Listener and connection settings.

use serde::{Deserialize, Serialize};

/// Server network and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` auto-assigns).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Seconds between server-initiated Ping frames.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a Pong before a connection is closed.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_connections: 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024,
            send_queue_capacity: 256,
        }
    }
}
