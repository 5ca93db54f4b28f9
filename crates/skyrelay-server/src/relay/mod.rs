//! Session relay core: connections, sessions, routing, access, teardown.

pub mod access;
pub mod connection;
pub mod lifecycle;
pub mod registry;
pub mod router;
pub mod session;
pub mod sweeper;

pub use access::{AccessDecision, is_privileged};
pub use connection::{ConnectionHandle, ConnectionState, Role};
pub use lifecycle::{CloseOutcome, LifecycleManager};
pub use registry::{Registration, SessionRegistry};
pub use router::{MessageRouter, RouteOutcome};
pub use session::Session;
pub use sweeper::spawn_sweeper;
