//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Upgrades refused because `max_connections` was reached (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Sessions in the registry (gauge).
pub const RELAY_SESSIONS_ACTIVE: &str = "relay_sessions_active";
/// Sessions removed by the idle sweeper (counter).
pub const RELAY_SESSIONS_EVICTED_TOTAL: &str = "relay_sessions_evicted_total";
/// Frames forwarded (counter, labels: direction).
pub const RELAY_MESSAGES_FORWARDED_TOTAL: &str = "relay_messages_forwarded_total";
/// Frames dropped (counter, labels: reason).
pub const RELAY_MESSAGES_DROPPED_TOTAL: &str = "relay_messages_dropped_total";
/// Access requests (counter, labels: outcome).
pub const RELAY_ACCESS_REQUESTS_TOTAL: &str = "relay_access_requests_total";
/// Undecodable inbound frames (counter).
pub const RELAY_MALFORMED_MESSAGES_TOTAL: &str = "relay_malformed_messages_total";
