//! Background eviction of sessions nobody is using.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::registry::SessionRegistry;

/// Every `interval`, evict sessions that have had no producer and no
/// subscribers for at least `ttl`. Exits when `cancel` fires.
pub fn spawn_sweeper(
    registry: Arc<SessionRegistry>,
    ttl: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = registry.evict_idle(ttl);
                    if !evicted.is_empty() {
                        info!(count = evicted.len(), sessions = ?evicted, "evicted idle sessions");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::connection::tests::make_connection;
    use skyrelay_core::{Credentials, SessionKey};

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_and_stops() {
        let registry = Arc::new(SessionRegistry::new());
        let (producer, _rx) = make_connection();
        let key = SessionKey::from("k");
        let _ = registry.register_producer(
            key.clone(),
            &producer,
            Credentials::new("pw1".into(), String::new(), None),
        );
        let _ = registry.remove_producer(&key, &producer);

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(
            registry.clone(),
            Duration::ZERO,
            Duration::from_secs(1),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(registry.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_keeps_live_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let (producer, _rx) = make_connection();
        let _ = registry.register_producer(
            SessionKey::from("live"),
            &producer,
            Credentials::new("pw1".into(), String::new(), None),
        );

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(
            registry.clone(),
            Duration::ZERO,
            Duration::from_secs(1),
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(registry.len(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
