//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use skyrelay_core::ConnectionId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::relay::{ConnectionHandle, LifecycleManager, MessageRouter};

/// How long the writer task gets to flush a close frame after teardown.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Per-connection knobs taken from [`ServerConfig`].
#[derive(Clone, Copy, Debug)]
pub struct ConnectionSettings {
    /// Outbound queue depth.
    pub send_queue_capacity: usize,
    /// Ping period.
    pub heartbeat_interval: Duration,
    /// Close after this long without a pong or any inbound frame.
    pub heartbeat_timeout: Duration,
}

impl From<&ServerConfig> for ConnectionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            send_queue_capacity: config.send_queue_capacity.max(1),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }
}

/// Run a relay connection until the client leaves, the handle is closed
/// (supersession, heartbeat timeout), or the server shuts down.
///
/// 1. Creates the [`ConnectionHandle`] and its bounded outbound queue
/// 2. Spawns the writer: drains the queue and sends periodic Pings
/// 3. Routes each inbound text frame through the [`MessageRouter`]
/// 4. Runs [`LifecycleManager::on_close`] exactly once on the way out
#[instrument(skip_all, fields(conn_id = %conn_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    conn_id: ConnectionId,
    router: Arc<MessageRouter>,
    lifecycle: Arc<LifecycleManager>,
    settings: ConnectionSettings,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<str>>(settings.send_queue_capacity);
    let connection = Arc::new(ConnectionHandle::with_id(conn_id, send_tx));
    let close = connection.close_token();

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Writer task: outbound queue plus heartbeat.
    let outbound_conn = Arc::clone(&connection);
    let outbound_close = connection.close_token();
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(settings.heartbeat_interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                biased;
                () = outbound_close.cancelled() => break,
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > settings.heartbeat_timeout
                    {
                        warn!(timeout = ?settings.heartbeat_timeout, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        // Wake the reader if the writer is the side that gave up.
        outbound_conn.close();
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    loop {
        let frame = tokio::select! {
            () = close.cancelled() => {
                debug!("connection closed by relay");
                break;
            }
            () = shutdown.cancelled() => {
                debug!("server shutting down");
                break;
            }
            frame = ws_rx.next() => frame,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read error");
                break;
            }
            None => break,
        };

        connection.mark_alive();
        match msg {
            Message::Text(text) => {
                let outcome = router.route(&connection, text.as_str());
                trace!(?outcome, "routed frame");
            }
            // Some clients send JSON as binary frames.
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    let outcome = router.route(&connection, text);
                    trace!(?outcome, "routed frame");
                }
                Err(_) => debug!(len = data.len(), "discarding non-UTF8 binary frame"),
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    let outcome = lifecycle.on_close(&connection);
    info!(?outcome, dropped = connection.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());

    let abort = outbound.abort_handle();
    if tokio::time::timeout(CLOSE_GRACE, outbound).await.is_err() {
        abort.abort();
    }
}

#[cfg(test)]
mod tests {
    // The session loop needs a real socket; it is covered end to end in
    // tests/integration.rs.

    use super::*;

    #[test]
    fn settings_from_config() {
        let config = ServerConfig {
            send_queue_capacity: 8,
            heartbeat_interval_secs: 5,
            heartbeat_timeout_secs: 15,
            ..ServerConfig::default()
        };
        let settings = ConnectionSettings::from(&config);
        assert_eq!(settings.send_queue_capacity, 8);
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(settings.heartbeat_timeout, Duration::from_secs(15));
    }

    #[test]
    fn zero_queue_capacity_is_clamped() {
        let config = ServerConfig {
            send_queue_capacity: 0,
            ..ServerConfig::default()
        };
        assert_eq!(ConnectionSettings::from(&config).send_queue_capacity, 1);
    }
}
