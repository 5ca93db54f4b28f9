//! WebSocket gateway: per-connection read/write loops and admission control.

pub mod session;
pub mod tracker;

pub use session::{ConnectionSettings, run_ws_session};
pub use tracker::{ConnectionPermit, ConnectionTracker};
