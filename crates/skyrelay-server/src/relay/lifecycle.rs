//! Connection teardown.
//!
//! The handle is marked closed before the registry is touched, so a torn
//! down connection can never be handed a frame once `on_close` returns.

use std::sync::Arc;

use tracing::info;

use super::connection::{ConnectionHandle, ConnectionState};
use super::registry::SessionRegistry;

/// What teardown changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The producer left; this many subscribers were sent `producer_offline`.
    ProducerLeft {
        /// Subscribers notified.
        notified: usize,
    },
    /// A superseded producer left; nothing changed in its session.
    StaleProducer,
    /// A subscriber left its session.
    SubscriberLeft,
    /// Nothing to do: never identified, or already torn down.
    Noop,
}

/// Applies registry mutations when a connection closes.
pub struct LifecycleManager {
    registry: Arc<SessionRegistry>,
}

impl LifecycleManager {
    /// Create a lifecycle manager over `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Tear down `conn`. Idempotent: only the first call has any effect.
    pub fn on_close(&self, conn: &ConnectionHandle) -> CloseOutcome {
        let previous = conn.mark_closed();
        conn.close();

        match previous {
            ConnectionState::Producer { key } => {
                let Some(notified) = self.registry.remove_producer(&key, conn) else {
                    info!(conn_id = %conn.id(), session = %key, "superseded producer closed");
                    return CloseOutcome::StaleProducer;
                };
                info!(conn_id = %conn.id(), session = %key, notified, "producer offline");
                CloseOutcome::ProducerLeft { notified }
            }
            ConnectionState::Subscriber { key, .. } => {
                let _ = self.registry.remove_subscriber(&key, conn);
                info!(conn_id = %conn.id(), session = %key, "subscriber left");
                CloseOutcome::SubscriberLeft
            }
            ConnectionState::Unidentified | ConnectionState::Closed => CloseOutcome::Noop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::connection::tests::{drain, make_connection};
    use skyrelay_core::{Credentials, SessionKey};

    fn creds() -> Credentials {
        Credentials::new("pw1".into(), String::new(), None)
    }

    #[test]
    fn producer_close_notifies_each_subscriber_once() {
        let registry = Arc::new(SessionRegistry::new());
        let lifecycle = LifecycleManager::new(registry.clone());
        let key = SessionKey::from("ABC123");
        let (producer, _prx) = make_connection();
        let (s1, mut rx1) = make_connection();
        let (s2, mut rx2) = make_connection();
        let _ = registry.register_producer(key.clone(), &producer, creds());
        let _ = registry.join_subscriber(&key, &s1);
        let _ = registry.join_subscriber(&key, &s2);

        assert_eq!(lifecycle.on_close(&producer), CloseOutcome::ProducerLeft { notified: 2 });
        assert_eq!(lifecycle.on_close(&producer), CloseOutcome::Noop);

        let expected = vec![
            serde_json::json!({"type": "joined", "producerOnline": true}),
            serde_json::json!({"type": "producer_offline"}),
        ];
        assert_eq!(drain(&mut rx1), expected);
        assert_eq!(drain(&mut rx2), expected);

        let session = registry.get(&key).unwrap();
        assert!(session.producer_id().is_none());
        assert_eq!(session.subscriber_count(), 2);
    }

    #[test]
    fn offline_is_the_last_word_after_join() {
        let registry = Arc::new(SessionRegistry::new());
        let lifecycle = LifecycleManager::new(registry.clone());
        let key = SessionKey::from("ABC123");
        let (producer, _prx) = make_connection();
        let (sub, mut srx) = make_connection();
        let _ = registry.register_producer(key.clone(), &producer, creds());

        assert_eq!(registry.join_subscriber(&key, &sub), Ok(true));
        let _ = lifecycle.on_close(&producer);

        let frames = drain(&mut srx);
        assert_eq!(frames.last(), Some(&serde_json::json!({"type": "producer_offline"})));
        assert_eq!(frames[0], serde_json::json!({"type": "joined", "producerOnline": true}));
    }

    #[test]
    fn torn_down_subscriber_gets_nothing_more() {
        let registry = Arc::new(SessionRegistry::new());
        let lifecycle = LifecycleManager::new(registry.clone());
        let key = SessionKey::from("k");
        let (producer, _prx) = make_connection();
        let (sub, mut srx) = make_connection();
        let _ = registry.register_producer(key.clone(), &producer, creds());
        let _ = registry.join_subscriber(&key, &sub);
        let _ = lifecycle.on_close(&sub);
        let _ = drain(&mut srx);

        let session = registry.get(&key).unwrap();
        assert_eq!(session.fan_out(producer.id(), &Arc::from("{}")), Some(0));
        assert_eq!(lifecycle.on_close(&producer), CloseOutcome::ProducerLeft { notified: 0 });
        assert!(srx.try_recv().is_err());
    }

    #[test]
    fn session_accepts_new_producer_after_close() {
        let registry = Arc::new(SessionRegistry::new());
        let lifecycle = LifecycleManager::new(registry.clone());
        let key = SessionKey::from("k");
        let (p1, _rx1) = make_connection();
        let _ = registry.register_producer(key.clone(), &p1, creds());
        let _ = lifecycle.on_close(&p1);

        let (p2, _rx2) = make_connection();
        let reg = registry.register_producer(key.clone(), &p2, creds());
        assert!(!reg.created);
        assert!(registry.get(&key).unwrap().producer_online());
    }

    #[test]
    fn superseded_producer_close_is_silent() {
        let registry = Arc::new(SessionRegistry::new());
        let lifecycle = LifecycleManager::new(registry.clone());
        let key = SessionKey::from("k");
        let (old, _orx) = make_connection();
        let (new, _nrx) = make_connection();
        let (sub, mut srx) = make_connection();
        let _ = registry.register_producer(key.clone(), &old, creds());
        let _ = registry.join_subscriber(&key, &sub);
        let _ = registry.register_producer(key.clone(), &new, creds());

        let _ = drain(&mut srx);

        assert_eq!(lifecycle.on_close(&old), CloseOutcome::StaleProducer);
        assert!(drain(&mut srx).is_empty());
        assert_eq!(registry.get(&key).unwrap().producer_id().as_ref(), Some(new.id()));
    }

    #[test]
    fn subscriber_close_removes_membership() {
        let registry = Arc::new(SessionRegistry::new());
        let lifecycle = LifecycleManager::new(registry.clone());
        let key = SessionKey::from("k");
        let (producer, mut prx) = make_connection();
        let (sub, _srx) = make_connection();
        let _ = registry.register_producer(key.clone(), &producer, creds());
        let _ = registry.join_subscriber(&key, &sub);
        let _ = drain(&mut prx);

        assert_eq!(lifecycle.on_close(&sub), CloseOutcome::SubscriberLeft);
        assert!(!registry.get(&key).unwrap().has_subscriber(sub.id()));
        assert!(drain(&mut prx).is_empty());
        assert!(!sub.is_open());
    }

    #[test]
    fn unidentified_close_is_noop() {
        let registry = Arc::new(SessionRegistry::new());
        let lifecycle = LifecycleManager::new(registry.clone());
        let (conn, _rx) = make_connection();
        assert_eq!(lifecycle.on_close(&conn), CloseOutcome::Noop);
        assert_eq!(lifecycle.on_close(&conn), CloseOutcome::Noop);
        assert!(registry.is_empty());
    }

    #[test]
    fn close_after_session_evicted_is_safe() {
        let registry = Arc::new(SessionRegistry::new());
        let lifecycle = LifecycleManager::new(registry.clone());
        let (conn, _rx) = make_connection();
        conn.bind_subscriber(SessionKey::from("gone"));
        assert_eq!(lifecycle.on_close(&conn), CloseOutcome::SubscriberLeft);
    }
}
