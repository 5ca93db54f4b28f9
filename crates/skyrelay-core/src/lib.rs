//! # skyrelay-core
//!
//! Foundation types shared by every SkyRelay crate.
//!
//! - [`ids`]: branded identifiers for sessions and connections
//! - [`protocol`]: inbound message parsing and outbound envelopes
//! - [`errors`]: the relay error taxonomy
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;

pub use errors::{RelayError, Result};
pub use ids::{ConnectionId, SessionKey};
pub use protocol::{Credentials, InboundMessage, MessageKind, ServerMessage};
