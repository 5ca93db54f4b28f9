//! Connection handle: one duplex WebSocket as seen by the relay core.
//!
//! The handle never touches the socket directly. Outbound frames go through
//! a bounded channel drained by the connection's writer task, so every send
//! here is non-blocking and a slow peer only ever loses its own frames.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use skyrelay_core::{ConnectionId, ServerMessage, SessionKey};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Role a connection has identified as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// No `register_producer` / `join_session` accepted yet.
    Unidentified,
    /// The session's authoritative endpoint.
    Producer,
    /// A remote control client.
    Subscriber,
}

/// Router state of one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Fresh connection.
    Unidentified,
    /// Registered as the producer for `key`.
    Producer {
        /// Session key.
        key: SessionKey,
    },
    /// Joined `key` as a subscriber.
    Subscriber {
        /// Session key.
        key: SessionKey,
        /// Whether a `request_access` has succeeded on this connection.
        authorized: bool,
    },
    /// Torn down; terminal.
    Closed,
}

/// Shared handle to one connected client.
pub struct ConnectionHandle {
    id: ConnectionId,
    state: Mutex<ConnectionState>,
    tx: mpsc::Sender<Arc<str>>,
    close_token: CancellationToken,
    connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ConnectionHandle {
    /// Create a handle around the writer task's send channel.
    pub fn new(tx: mpsc::Sender<Arc<str>>) -> Self {
        Self::with_id(ConnectionId::new(), tx)
    }

    /// Create a handle with a caller-chosen ID.
    pub fn with_id(id: ConnectionId, tx: mpsc::Sender<Arc<str>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: Mutex::new(ConnectionState::Unidentified),
            tx,
            close_token: CancellationToken::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection ID.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Snapshot of the router state.
    pub fn state(&self) -> ConnectionState {
        self.state.lock().clone()
    }

    /// Identified role (`Closed` reports the role it is no longer playing as
    /// `Unidentified`).
    pub fn role(&self) -> Role {
        match &*self.state.lock() {
            ConnectionState::Producer { .. } => Role::Producer,
            ConnectionState::Subscriber { .. } => Role::Subscriber,
            ConnectionState::Unidentified | ConnectionState::Closed => Role::Unidentified,
        }
    }

    /// Session this connection is bound to, if any.
    pub fn session_key(&self) -> Option<SessionKey> {
        match &*self.state.lock() {
            ConnectionState::Producer { key } | ConnectionState::Subscriber { key, .. } => {
                Some(key.clone())
            }
            ConnectionState::Unidentified | ConnectionState::Closed => None,
        }
    }

    /// Whether this subscriber may send privileged commands.
    pub fn has_privileged_access(&self) -> bool {
        matches!(
            &*self.state.lock(),
            ConnectionState::Subscriber {
                authorized: true,
                ..
            }
        )
    }

    pub(crate) fn bind_producer(&self, key: SessionKey) {
        *self.state.lock() = ConnectionState::Producer { key };
    }

    pub(crate) fn bind_subscriber(&self, key: SessionKey) {
        *self.state.lock() = ConnectionState::Subscriber {
            key,
            authorized: false,
        };
    }

    /// Flip a subscriber to authorized. Returns `false` for any other state.
    pub(crate) fn grant_access(&self) -> bool {
        match &mut *self.state.lock() {
            ConnectionState::Subscriber { authorized, .. } => {
                *authorized = true;
                true
            }
            _ => false,
        }
    }

    /// Move to `Closed`, returning the state it left.
    ///
    /// A second call returns `Closed`, which callers treat as "already torn down".
    pub(crate) fn mark_closed(&self) -> ConnectionState {
        std::mem::replace(&mut *self.state.lock(), ConnectionState::Closed)
    }

    /// Queue a text frame.
    ///
    /// Returns `false` if the connection is closing or its queue is full or
    /// closed; the frame is dropped and the drop counter incremented.
    pub fn send(&self, frame: Arc<str>) -> bool {
        if self.close_token.is_cancelled() {
            return false;
        }
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(crate::metrics::RELAY_MESSAGES_DROPPED_TOTAL, "reason" => "backpressure")
                .increment(1);
            false
        }
    }

    /// Serialize a relay message and queue it.
    pub fn send_message(&self, message: &ServerMessage) -> bool {
        match message.encode() {
            Ok(json) => self.send(Arc::from(json)),
            Err(e) => {
                warn!(conn_id = %self.id, error = %e, "failed to serialize relay message");
                false
            }
        }
    }

    /// Whether frames can still be delivered.
    pub fn is_open(&self) -> bool {
        !self.close_token.is_cancelled() && !self.tx.is_closed()
    }

    /// Ask the connection's session loop to shut down.
    pub fn close(&self) {
        self.close_token.cancel();
    }

    /// Token cancelled by [`close`](Self::close).
    pub fn close_token(&self) -> CancellationToken {
        self.close_token.clone()
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag for heartbeat.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
