//! One relay session: a producer slot, a subscriber set, and credentials.
//!
//! All mutable state sits behind a single `parking_lot::Mutex`. Nothing in
//! here awaits, and sends are `try_send`, so the lock is never held across I/O.
//!
//! Acknowledgements (`registered`, `joined`) are queued while the lock is
//! held, so they always precede any frame or `producer_offline` that a
//! concurrent forward or teardown derives from the new membership.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use skyrelay_core::{ConnectionId, Credentials, ServerMessage, SessionKey};
use tracing::warn;

use super::connection::ConnectionHandle;

struct SessionInner {
    producer: Option<Arc<ConnectionHandle>>,
    subscribers: HashMap<ConnectionId, Arc<ConnectionHandle>>,
    credentials: Credentials,
    /// Set while the session has neither a producer nor subscribers.
    idle_since: Option<Instant>,
}

impl SessionInner {
    fn refresh_idle(&mut self) {
        let empty = self.producer.is_none() && self.subscribers.is_empty();
        match (empty, self.idle_since) {
            (true, None) => self.idle_since = Some(Instant::now()),
            (false, Some(_)) => self.idle_since = None,
            _ => {}
        }
    }
}

/// A session keyed by the producer-chosen [`SessionKey`].
pub struct Session {
    key: SessionKey,
    inner: Mutex<SessionInner>,
}

impl Session {
    /// New session with `producer` attached.
    ///
    /// The producer is bound and acknowledged before the session is
    /// published, so nothing can reach it ahead of `registered`.
    pub(crate) fn new(
        key: SessionKey,
        producer: Arc<ConnectionHandle>,
        credentials: Credentials,
    ) -> Self {
        acknowledge_producer(&producer, &key);
        Self {
            key,
            inner: Mutex::new(SessionInner {
                producer: Some(producer),
                subscribers: HashMap::new(),
                credentials,
                idle_since: None,
            }),
        }
    }

    /// Session key.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Install `producer` and overwrite the credentials.
    ///
    /// Returns the previous producer if it was a different connection; the
    /// caller closes it once no locks are held.
    pub(crate) fn replace_producer(
        &self,
        producer: Arc<ConnectionHandle>,
        credentials: Credentials,
    ) -> Option<Arc<ConnectionHandle>> {
        let mut inner = self.inner.lock();
        inner.credentials = credentials;
        acknowledge_producer(&producer, &self.key);
        let previous = inner.producer.replace(producer);
        inner.refresh_idle();
        let new_id = inner.producer.as_ref().map(|p| p.id().clone());
        previous.filter(|old| Some(old.id()) != new_id.as_ref())
    }

    /// Clear the producer slot if it still holds connection `id`, and queue
    /// `producer_offline` on every subscriber.
    ///
    /// Returns how many subscribers took the notice, or `None` if `id` was
    /// not the current producer.
    pub(crate) fn detach_producer(&self, id: &ConnectionId) -> Option<usize> {
        let mut inner = self.inner.lock();
        if !inner.producer.as_ref().is_some_and(|p| p.id() == id) {
            return None;
        }
        inner.producer = None;
        inner.refresh_idle();

        let notice: Arc<str> = match ServerMessage::ProducerOffline.encode() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(session = %self.key, error = %e, "failed to serialize producer_offline");
                return Some(0);
            }
        };
        let mut notified = 0;
        for subscriber in inner.subscribers.values() {
            if subscriber.send(Arc::clone(&notice)) {
                notified += 1;
            } else {
                warn!(conn_id = %subscriber.id(), "failed to send producer_offline");
            }
        }
        Some(notified)
    }

    /// Add a subscriber, bind it, and queue `joined` on it.
    ///
    /// Returns whether a producer is connected, which is exactly what the
    /// queued `joined` reports.
    pub(crate) fn add_subscriber(&self, handle: Arc<ConnectionHandle>) -> bool {
        let mut inner = self.inner.lock();
        // Attached means online: whoever clears the slot owes this subscriber
        // a `producer_offline`, so the two replies can never disagree.
        let producer_online = inner.producer.is_some();
        handle.bind_subscriber(self.key.clone());
        let _ = handle.send_message(&ServerMessage::Joined { producer_online });
        let _ = inner.subscribers.insert(handle.id().clone(), handle);
        inner.refresh_idle();
        producer_online
    }

    /// Remove a subscriber. Returns whether it was a member.
    pub(crate) fn remove_subscriber(&self, id: &ConnectionId) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.subscribers.remove(id).is_some();
        inner.refresh_idle();
        removed
    }

    /// Queue `frame` on every open subscriber, but only if `id` is still this
    /// session's producer.
    ///
    /// Sends happen under the session lock, so a subscriber whose teardown
    /// has finished never receives another frame. Returns the number of
    /// subscribers that took the frame.
    pub(crate) fn fan_out(&self, id: &ConnectionId, frame: &Arc<str>) -> Option<usize> {
        let inner = self.inner.lock();
        if !inner.producer.as_ref().is_some_and(|p| p.id() == id) {
            return None;
        }
        Some(
            inner
                .subscribers
                .values()
                .filter(|sub| sub.is_open() && sub.send(Arc::clone(frame)))
                .count(),
        )
    }

    /// Number of joined subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Whether connection `id` is a joined subscriber.
    pub fn has_subscriber(&self, id: &ConnectionId) -> bool {
        self.inner.lock().subscribers.contains_key(id)
    }

    /// Whether a producer is attached.
    pub fn producer_online(&self) -> bool {
        self.inner.lock().producer.is_some()
    }

    /// ID of the attached producer, if any.
    pub fn producer_id(&self) -> Option<ConnectionId> {
        self.inner.lock().producer.as_ref().map(|p| p.id().clone())
    }

    /// Queue `frame` for the producer.
    ///
    /// The check and the send happen under the session lock, so a concurrent
    /// producer swap can never leave the frame on a stale handle.
    pub(crate) fn send_to_producer(&self, frame: Arc<str>) -> bool {
        let inner = self.inner.lock();
        match &inner.producer {
            Some(producer) if producer.is_open() => producer.send(frame),
            _ => false,
        }
    }

    pub(crate) fn with_credentials<R>(&self, f: impl FnOnce(&Credentials) -> R) -> R {
        f(&self.inner.lock().credentials)
    }

    /// Whether the session has been empty for at least `ttl` as of `now`.
    pub(crate) fn is_idle_for(&self, now: Instant, ttl: Duration) -> bool {
        self.inner
            .lock()
            .idle_since
            .is_some_and(|since| now.saturating_duration_since(since) >= ttl)
    }
}

fn acknowledge_producer(producer: &ConnectionHandle, key: &SessionKey) {
    producer.bind_producer(key.clone());
    let _ = producer.send_message(&ServerMessage::Registered { key: key.clone() });
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("producer", &inner.producer.as_ref().map(|p| p.id().clone()))
            .field("subscribers", &inner.subscribers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::connection::Role;
    use crate::relay::connection::tests::{drain, make_connection};
    use serde_json::json;

    fn creds() -> Credentials {
        Credentials::new("pw1".into(), "guest".into(), None)
    }

    type Fixture = (
        Session,
        Arc<ConnectionHandle>,
        tokio::sync::mpsc::Receiver<Arc<str>>,
    );

    fn session_with_producer() -> Fixture {
        let (producer, rx) = make_connection();
        (
            Session::new(SessionKey::from("ABC123"), producer.clone(), creds()),
            producer,
            rx,
        )
    }

    #[test]
    fn new_session_has_producer() {
        let (session, producer, _prx) = session_with_producer();
        assert_eq!(session.key().as_str(), "ABC123");
        assert_eq!(session.producer_id().as_ref(), Some(producer.id()));
        assert!(session.producer_online());
        assert_eq!(session.subscriber_count(), 0);
    }

    #[test]
    fn replace_with_same_handle_supersedes_nothing() {
        let (session, producer, _prx) = session_with_producer();
        assert!(session.replace_producer(producer, creds()).is_none());
    }

    #[test]
    fn replace_returns_previous_producer() {
        let (session, old, _prx) = session_with_producer();
        let (new, _rx) = make_connection();
        let superseded = session.replace_producer(new.clone(), creds()).unwrap();
        assert_eq!(superseded.id(), old.id());
        assert_eq!(session.producer_id().as_ref(), Some(new.id()));
    }

    #[test]
    fn detach_producer_is_identity_checked() {
        let (session, old, _prx) = session_with_producer();
        let (new, _rx) = make_connection();
        let _ = session.replace_producer(new.clone(), creds());

        assert!(session.detach_producer(old.id()).is_none());
        assert_eq!(session.producer_id().as_ref(), Some(new.id()));

        assert_eq!(session.detach_producer(new.id()), Some(0));
        assert!(session.producer_id().is_none());
    }

    #[test]
    fn subscriber_membership() {
        let (session, _producer, _prx) = session_with_producer();
        let (sub, _rx) = make_connection();

        assert!(session.add_subscriber(sub.clone()));
        assert!(session.has_subscriber(sub.id()));
        assert_eq!(session.subscriber_count(), 1);

        // Re-adding does not duplicate.
        let _ = session.add_subscriber(sub.clone());
        assert_eq!(session.subscriber_count(), 1);

        assert!(session.remove_subscriber(sub.id()));
        assert!(!session.remove_subscriber(sub.id()));
        assert!(!session.has_subscriber(sub.id()));
    }

    #[test]
    fn only_the_current_producer_fans_out() {
        let (session, producer, _prx) = session_with_producer();
        let (sub, _rx) = make_connection();
        let _ = session.add_subscriber(sub);
        let (stranger, _rx2) = make_connection();

        let frame: Arc<str> = Arc::from("{}");
        assert_eq!(session.fan_out(producer.id(), &frame), Some(1));
        assert_eq!(session.fan_out(stranger.id(), &frame), None);
    }

    #[tokio::test]
    async fn send_to_producer_requires_open_producer() {
        let (producer, mut rx) = make_connection();
        let session = Session::new(SessionKey::from("k"), producer.clone(), creds());
        let _ = drain(&mut rx);

        assert!(session.send_to_producer(Arc::from("one")));
        assert_eq!(&*rx.recv().await.unwrap(), "one");

        let _ = session.detach_producer(producer.id());
        assert!(!session.send_to_producer(Arc::from("two")));
    }

    #[test]
    fn idle_tracking() {
        let (session, producer, _prx) = session_with_producer();
        let now = Instant::now();
        assert!(!session.is_idle_for(now, Duration::ZERO));

        let _ = session.detach_producer(producer.id());
        assert!(session.is_idle_for(Instant::now(), Duration::ZERO));
        assert!(!session.is_idle_for(Instant::now(), Duration::from_secs(3600)));

        let (sub, _rx) = make_connection();
        let _ = session.add_subscriber(sub.clone());
        assert!(!session.is_idle_for(Instant::now(), Duration::ZERO));

        let _ = session.remove_subscriber(sub.id());
        assert!(session.is_idle_for(Instant::now(), Duration::ZERO));
    }

    #[test]
    fn producer_acknowledged_on_create_and_replace() {
        let (session, producer, mut prx) = session_with_producer();
        assert_eq!(producer.role(), Role::Producer);
        assert_eq!(drain(&mut prx), vec![json!({"type": "registered", "key": "ABC123"})]);

        let (next, mut nrx) = make_connection();
        let _ = session.replace_producer(next, creds());
        assert_eq!(drain(&mut nrx), vec![json!({"type": "registered", "key": "ABC123"})]);
    }

    #[test]
    fn joined_reflects_state_at_insertion() {
        let (session, producer, _prx) = session_with_producer();
        let (early, mut erx) = make_connection();
        assert!(session.add_subscriber(early));

        assert_eq!(session.detach_producer(producer.id()), Some(1));

        let (late, mut lrx) = make_connection();
        assert!(!session.add_subscriber(late.clone()));
        assert_eq!(late.role(), Role::Subscriber);

        assert_eq!(
            drain(&mut erx),
            vec![
                json!({"type": "joined", "producerOnline": true}),
                json!({"type": "producer_offline"}),
            ]
        );
        assert_eq!(drain(&mut lrx), vec![json!({"type": "joined", "producerOnline": false})]);
    }

    #[test]
    fn credentials_replaced_on_reregister() {
        let (session, producer, _prx) = session_with_producer();
        let _ = session.replace_producer(
            producer,
            Credentials::new("new".into(), String::new(), None),
        );
        assert!(!session.with_credentials(|c| c.secondary_enabled));
    }
}
