//! Relay error taxonomy.
//!
//! None of these are fatal to the process. The worst outcome of any variant
//! is a dropped message or a connection that stays unauthenticated.

use thiserror::Error;

use crate::ids::SessionKey;
use crate::protocol::MessageKind;

/// Errors produced while routing one inbound message.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RelayError {
    /// A subscriber tried to join a key no producer has registered.
    #[error("unknown session: {0}")]
    UnknownSession(SessionKey),

    /// A producer tried to register a blank session key.
    #[error("session key is empty")]
    InvalidKey,

    /// The supplied secret matched neither enabled credential.
    #[error("access denied")]
    AuthDenied,

    /// The frame could not be decoded as a relay message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A privileged command arrived from a subscriber without access.
    #[error("privileged command requires access: {0}")]
    PrivilegeRequired(MessageKind),

    /// The forwarding target is not connected.
    #[error("peer unavailable")]
    PeerUnavailable,

    /// A connection tried to identify twice.
    #[error("connection already identified")]
    AlreadyIdentified,

    /// An operation that needs a joined subscriber came from elsewhere.
    #[error("connection has not joined a session")]
    NotJoined,
}

impl RelayError {
    /// Stable label for the `reason`/`outcome` metric labels.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::UnknownSession(_) => "unknown_session",
            Self::InvalidKey => "invalid_key",
            Self::AuthDenied => "auth_denied",
            Self::MalformedMessage(_) => "malformed_message",
            Self::PrivilegeRequired(_) => "privilege_required",
            Self::PeerUnavailable => "peer_unavailable",
            Self::AlreadyIdentified => "already_identified",
            Self::NotJoined => "not_joined",
        }
    }

    /// Whether the sender gets a reply envelope for this error.
    ///
    /// Malformed input and unreachable peers are dropped silently; the
    /// router counts them under [`error_kind`](Self::error_kind) instead.
    pub fn is_reported(&self) -> bool {
        !matches!(self, Self::MalformedMessage(_) | Self::PeerUnavailable)
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
