//! `GET /health` body: a read-only snapshot for external monitors.

use std::time::Instant;

use serde::Serialize;

/// Snapshot of relay load.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Whole seconds since startup.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Sessions in the registry, including ones whose producer is offline.
    pub active_sessions: usize,
}

/// Snapshot the relay's counters.
pub fn health_check(
    started: Instant,
    connections: usize,
    active_sessions: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: started.elapsed().as_secs(),
        connections,
        active_sessions,
    }
}
