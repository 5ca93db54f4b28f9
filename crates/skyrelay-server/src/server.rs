//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use skyrelay_core::ConnectionId;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::relay::{LifecycleManager, MessageRouter, SessionRegistry, spawn_sweeper};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{ConnectionSettings, ConnectionTracker, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session registry.
    pub registry: Arc<SessionRegistry>,
    /// Inbound frame router.
    pub router: Arc<MessageRouter>,
    /// Teardown handler.
    pub lifecycle: Arc<LifecycleManager>,
    /// Admission control.
    pub connections: Arc<ConnectionTracker>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Per-connection settings.
    pub connection_settings: ConnectionSettings,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics_handle: Option<PrometheusHandle>,
}

/// Background tasks started by [`RelayServer::listen`].
pub struct ServerHandle {
    /// Bound address.
    pub addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Task handles, for [`ShutdownCoordinator::graceful_shutdown`].
    pub fn into_tasks(self) -> Vec<JoinHandle<()>> {
        self.tasks
    }
}

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    router: Arc<MessageRouter>,
    lifecycle: Arc<LifecycleManager>,
    connections: Arc<ConnectionTracker>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics_handle: Option<PrometheusHandle>,
    start_time: Instant,
}

impl RelayServer {
    /// Create a new server with an empty registry.
    pub fn new(config: ServerConfig, metrics_handle: Option<PrometheusHandle>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let router = Arc::new(MessageRouter::with_hint(
            Arc::clone(&registry),
            config.access_hint.clone(),
        ));
        let lifecycle = Arc::new(LifecycleManager::new(Arc::clone(&registry)));
        let connections = Arc::new(ConnectionTracker::new(config.max_connections));
        Self {
            config,
            registry,
            router,
            lifecycle,
            connections,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics_handle,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            router: Arc::clone(&self.router),
            lifecycle: Arc::clone(&self.lifecycle),
            connections: Arc::clone(&self.connections),
            shutdown: Arc::clone(&self.shutdown),
            connection_settings: ConnectionSettings::from(&self.config),
            max_message_size: self.config.max_message_size,
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind, start serving, and start the idle-session sweeper.
    ///
    /// Everything stops when the shutdown token is cancelled.
    pub async fn listen(&self) -> std::io::Result<ServerHandle> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let mut tasks = Vec::with_capacity(2);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        }));

        if let Some(ttl) = self.config.session_idle_ttl() {
            tasks.push(spawn_sweeper(
                Arc::clone(&self.registry),
                ttl,
                self.config.sweep_interval(),
                self.shutdown.token(),
            ));
        }

        info!(%addr, max_connections = self.config.max_connections, "relay server listening");
        Ok(ServerHandle { addr, tasks })
    }

    /// Session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Live WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.connections.active()
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.connections.active(),
        state.registry.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(permit) = state.connections.try_acquire() else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(max = state.connections.max(), "connection limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            run_ws_session(
                socket,
                ConnectionId::new(),
                state.router,
                state.lifecycle,
                state.connection_settings,
                state.shutdown.token(),
            )
            .await;
            drop(permit);
        })
}
