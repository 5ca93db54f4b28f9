//! Session registry: `SessionKey` → [`Session`].
//!
//! Backed by a sharded `DashMap`, so unrelated sessions never contend. Every
//! mutation takes the shard lock first and the session lock second; eviction
//! follows the same order, which keeps a join or register from attaching to a
//! session that is being removed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::{counter, gauge};
use skyrelay_core::{Credentials, RelayError, Result, SessionKey};
use tracing::{debug, info};

use super::connection::ConnectionHandle;
use super::session::Session;
use crate::metrics::{RELAY_SESSIONS_ACTIVE, RELAY_SESSIONS_EVICTED_TOTAL};

/// Result of [`SessionRegistry::register_producer`].
#[derive(Debug)]
pub struct Registration {
    /// The registered key.
    pub key: SessionKey,
    /// Whether this call created the session.
    pub created: bool,
    /// Whether a different live producer was replaced (and closed).
    pub superseded: bool,
}

/// Owner of every live session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, Arc<Session>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the session for `key` with `handle` as its producer.
    ///
    /// An existing session keeps its subscribers; producer and credentials
    /// are overwritten. `handle` is bound and sent `registered` under the
    /// session lock. A superseded producer connection is closed after all
    /// locks are released.
    pub fn register_producer(
        &self,
        key: SessionKey,
        handle: &Arc<ConnectionHandle>,
        credentials: Credentials,
    ) -> Registration {
        let (created, superseded) = match self.sessions.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let superseded = entry.get().replace_producer(Arc::clone(handle), credentials);
                (false, superseded)
            }
            Entry::Vacant(entry) => {
                let session = Session::new(key.clone(), Arc::clone(handle), credentials);
                let _ = entry.insert(Arc::new(session));
                (true, None)
            }
        };

        if created {
            gauge!(RELAY_SESSIONS_ACTIVE).increment(1.0);
        }
        let superseded = match superseded {
            Some(old) => {
                info!(session = %key, old_conn = %old.id(), "closing superseded producer");
                old.close();
                true
            }
            None => false,
        };

        Registration {
            key,
            created,
            superseded,
        }
    }

    /// Attach `handle` to an existing session as an unauthorized subscriber.
    ///
    /// `joined` is queued on `handle` before the subscriber becomes visible
    /// to forwards or teardown. Returns whether the producer is connected.
    pub fn join_subscriber(&self, key: &SessionKey, handle: &Arc<ConnectionHandle>) -> Result<bool> {
        let session = self
            .sessions
            .get(key)
            .ok_or_else(|| RelayError::UnknownSession(key.clone()))?;
        Ok(session.add_subscriber(Arc::clone(handle)))
    }

    /// Resolve the session a connection is bound to.
    pub fn lookup(&self, handle: &ConnectionHandle) -> Option<Arc<Session>> {
        handle.session_key().and_then(|key| self.get(&key))
    }

    /// Session for `key`.
    pub fn get(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Detach `handle` as producer of `key`, keeping the session, and send
    /// `producer_offline` to its subscribers.
    ///
    /// Returns how many subscribers were notified, or `None` if the session
    /// is gone or `handle` is no longer its producer (e.g. it was superseded).
    pub fn remove_producer(&self, key: &SessionKey, handle: &ConnectionHandle) -> Option<usize> {
        self.sessions.get(key)?.detach_producer(handle.id())
    }

    /// Detach a subscriber. Returns whether it was a member.
    pub fn remove_subscriber(&self, key: &SessionKey, handle: &ConnectionHandle) -> bool {
        self.sessions
            .get(key)
            .is_some_and(|session| session.remove_subscriber(handle.id()))
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove sessions that have been empty for at least `ttl`.
    pub fn evict_idle(&self, ttl: Duration) -> Vec<SessionKey> {
        let now = Instant::now();
        let mut evicted = Vec::new();
        self.sessions.retain(|key, session| {
            if session.is_idle_for(now, ttl) {
                evicted.push(key.clone());
                false
            } else {
                true
            }
        });

        if !evicted.is_empty() {
            let n = evicted.len() as u64;
            counter!(RELAY_SESSIONS_EVICTED_TOTAL).increment(n);
            gauge!(RELAY_SESSIONS_ACTIVE).decrement(n as f64);
            debug!(count = n, "evicted idle sessions");
        }
        evicted
    }
}
