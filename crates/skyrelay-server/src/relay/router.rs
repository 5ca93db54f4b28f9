//! Message router: the per-connection protocol state machine.
//!
//! `Unidentified` → `Producer` via `register_producer`, or → `Subscriber`
//! via `join_session`; a subscriber becomes authorized via `request_access`.
//! Every other frame is forwarded verbatim: producer → all subscribers,
//! subscriber → producer (privileged kinds only once authorized).

use std::sync::Arc;

use metrics::counter;
use secrecy::SecretString;
use skyrelay_core::protocol::DEFAULT_ACCESS_HINT;
use skyrelay_core::{Credentials, InboundMessage, MessageKind, RelayError, ServerMessage, SessionKey};
use tracing::{debug, info};

use super::access::{self, AccessDecision};
use super::connection::{ConnectionHandle, Role};
use super::registry::SessionRegistry;
use crate::metrics::{
    RELAY_ACCESS_REQUESTS_TOTAL, RELAY_MALFORMED_MESSAGES_TOTAL, RELAY_MESSAGES_DROPPED_TOTAL,
    RELAY_MESSAGES_FORWARDED_TOTAL,
};

/// What the router did with one inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Connection registered as producer.
    Registered {
        /// Whether the session was created by this registration.
        created: bool,
    },
    /// Connection joined as subscriber.
    Joined {
        /// Whether the producer was online at join time.
        producer_online: bool,
    },
    /// Access request granted.
    AccessGranted,
    /// Frame forwarded.
    Forwarded {
        /// Number of connections the frame was queued for.
        recipients: usize,
    },
    /// Request refused; the sender got a reply envelope.
    Rejected(RelayError),
    /// Frame discarded without a reply.
    Dropped(RelayError),
}

/// Routes inbound frames for every connection of one relay.
pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
    access_hint: String,
}

impl MessageRouter {
    /// Create a router over `registry` with the default `access_required` hint.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self::with_hint(registry, DEFAULT_ACCESS_HINT)
    }

    /// Create a router with a custom `access_required` hint.
    pub fn with_hint(registry: Arc<SessionRegistry>, access_hint: impl Into<String>) -> Self {
        Self {
            registry,
            access_hint: access_hint.into(),
        }
    }

    /// Registry this router mutates.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Handle one inbound text frame from `conn`. Replies are queued on
    /// `conn` before this returns.
    pub fn route(&self, conn: &Arc<ConnectionHandle>, text: &str) -> RouteOutcome {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(err) => {
                counter!(RELAY_MALFORMED_MESSAGES_TOTAL).increment(1);
                return self.refuse(conn, err);
            }
        };

        match message {
            InboundMessage::RegisterProducer { key, credentials } => {
                self.register_producer(conn, key, credentials)
            }
            InboundMessage::JoinSession { key } => self.join_session(conn, &key),
            InboundMessage::RequestAccess { secret } => self.request_access(conn, &secret),
            InboundMessage::Forward { kind, raw } => self.forward(conn, kind, raw),
        }
    }

    fn register_producer(
        &self,
        conn: &Arc<ConnectionHandle>,
        key: SessionKey,
        credentials: Credentials,
    ) -> RouteOutcome {
        if conn.role() != Role::Unidentified {
            return self.refuse(conn, RelayError::AlreadyIdentified);
        }
        if !key.is_valid() {
            return self.refuse(conn, RelayError::InvalidKey);
        }

        // `registered` is queued by the registry under the session lock.
        let registration = self.registry.register_producer(key, conn, credentials);
        info!(
            conn_id = %conn.id(),
            session = %registration.key,
            created = registration.created,
            superseded = registration.superseded,
            "producer registered"
        );
        RouteOutcome::Registered {
            created: registration.created,
        }
    }

    fn join_session(&self, conn: &Arc<ConnectionHandle>, key: &SessionKey) -> RouteOutcome {
        if conn.role() != Role::Unidentified {
            return self.refuse(conn, RelayError::AlreadyIdentified);
        }

        match self.registry.join_subscriber(key, conn) {
            Ok(producer_online) => {
                info!(conn_id = %conn.id(), session = %key, producer_online, "subscriber joined");
                RouteOutcome::Joined { producer_online }
            }
            Err(err) => self.refuse(conn, err),
        }
    }

    fn request_access(&self, conn: &Arc<ConnectionHandle>, secret: &SecretString) -> RouteOutcome {
        let session = match conn.role() {
            Role::Subscriber => self.registry.lookup(conn),
            Role::Producer | Role::Unidentified => None,
        };
        let Some(session) = session else {
            return self.refuse(conn, RelayError::NotJoined);
        };

        match access::request_access(&session, conn, secret) {
            AccessDecision::Granted => {
                counter!(RELAY_ACCESS_REQUESTS_TOTAL, "outcome" => "granted").increment(1);
                info!(conn_id = %conn.id(), session = %session.key(), "access granted");
                let _ = conn.send_message(&ServerMessage::AccessGranted);
                RouteOutcome::AccessGranted
            }
            AccessDecision::Denied => self.refuse(conn, RelayError::AuthDenied),
        }
    }

    fn forward(&self, conn: &Arc<ConnectionHandle>, kind: MessageKind, raw: Arc<str>) -> RouteOutcome {
        match conn.role() {
            Role::Unidentified => self.refuse(conn, RelayError::PeerUnavailable),
            Role::Subscriber => self.forward_upstream(conn, kind, raw),
            Role::Producer => self.forward_downstream(conn, &raw),
        }
    }

    /// Subscriber → producer.
    fn forward_upstream(
        &self,
        conn: &Arc<ConnectionHandle>,
        kind: MessageKind,
        raw: Arc<str>,
    ) -> RouteOutcome {
        if access::is_privileged(&kind) && !conn.has_privileged_access() {
            return self.refuse(conn, RelayError::PrivilegeRequired(kind));
        }

        let delivered = self
            .registry
            .lookup(conn)
            .is_some_and(|session| session.send_to_producer(raw));
        if delivered {
            counter!(RELAY_MESSAGES_FORWARDED_TOTAL, "direction" => "upstream").increment(1);
            RouteOutcome::Forwarded { recipients: 1 }
        } else {
            self.refuse(conn, RelayError::PeerUnavailable)
        }
    }

    /// Producer → every open subscriber. A superseded producer reaches nobody.
    fn forward_downstream(&self, conn: &Arc<ConnectionHandle>, raw: &Arc<str>) -> RouteOutcome {
        let Some(recipients) = self
            .registry
            .lookup(conn)
            .and_then(|session| session.fan_out(conn.id(), raw))
        else {
            return self.refuse(conn, RelayError::PeerUnavailable);
        };

        counter!(RELAY_MESSAGES_FORWARDED_TOTAL, "direction" => "downstream")
            .increment(recipients as u64);
        RouteOutcome::Forwarded { recipients }
    }

    /// Turn `err` into the reply envelope or a silent drop, and count it.
    fn refuse(&self, conn: &ConnectionHandle, err: RelayError) -> RouteOutcome {
        let kind = err.error_kind();
        match &err {
            RelayError::AuthDenied | RelayError::NotJoined => {
                counter!(RELAY_ACCESS_REQUESTS_TOTAL, "outcome" => kind).increment(1);
            }
            _ => counter!(RELAY_MESSAGES_DROPPED_TOTAL, "reason" => kind).increment(1),
        }

        if !err.is_reported() {
            debug!(conn_id = %conn.id(), error = %err, "dropping frame");
            return RouteOutcome::Dropped(err);
        }
        info!(conn_id = %conn.id(), error = %err, "request refused");
        if let Some(reply) = self.envelope(&err) {
            let _ = conn.send_message(&reply);
        }
        RouteOutcome::Rejected(err)
    }

    fn envelope(&self, err: &RelayError) -> Option<ServerMessage> {
        match err {
            RelayError::UnknownSession(_) | RelayError::InvalidKey => {
                Some(ServerMessage::invalid_id())
            }
            RelayError::AlreadyIdentified => Some(ServerMessage::already_identified()),
            RelayError::AuthDenied | RelayError::NotJoined => Some(ServerMessage::AccessDenied),
            RelayError::PrivilegeRequired(_) => Some(ServerMessage::AccessRequired {
                hint: self.access_hint.clone(),
            }),
            RelayError::MalformedMessage(_) | RelayError::PeerUnavailable => None,
        }
    }
}
