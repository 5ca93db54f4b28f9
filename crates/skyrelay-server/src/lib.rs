//! # skyrelay-server
//!
//! Session relay core and the Axum `WebSocket` gateway in front of it.
//!
//! - [`relay`]: connection handles, sessions, the registry, access control,
//!   the message router, teardown, and idle-session eviction
//! - [`websocket`]: per-connection read/write loops, heartbeat, admission
//! - HTTP endpoints: `/ws`, `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{RelayServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
