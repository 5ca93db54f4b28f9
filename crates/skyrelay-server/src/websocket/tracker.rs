//! Connection admission: caps concurrent WebSockets at `max_connections`.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Semaphore-backed ceiling on live connections.
#[derive(Debug)]
pub struct ConnectionTracker {
    permits: Arc<Semaphore>,
    max: usize,
}

/// One admitted connection; the slot frees when this drops.
pub type ConnectionPermit = OwnedSemaphorePermit;

impl ConnectionTracker {
    /// Create a tracker admitting at most `max` connections.
    pub fn new(max: usize) -> Self {
        let max = max.min(Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Reserve a slot without waiting. `None` when the relay is full.
    pub fn try_acquire(&self) -> Option<ConnectionPermit> {
        Arc::clone(&self.permits).try_acquire_owned().ok()
    }

    /// Live connections.
    pub fn active(&self) -> usize {
        self.max - self.permits.available_permits()
    }

    /// Ceiling.
    pub fn max(&self) -> usize {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_max() {
        let tracker = ConnectionTracker::new(2);
        let a = tracker.try_acquire();
        let b = tracker.try_acquire();
        assert!(a.is_some() && b.is_some());
        assert!(tracker.try_acquire().is_none());
        assert_eq!(tracker.active(), 2);
    }

    #[test]
    fn drop_releases_slot() {
        let tracker = ConnectionTracker::new(1);
        let permit = tracker.try_acquire().unwrap();
        assert!(tracker.try_acquire().is_none());
        drop(permit);
        assert_eq!(tracker.active(), 0);
        assert!(tracker.try_acquire().is_some());
    }

    #[test]
    fn zero_max_admits_nothing() {
        let tracker = ConnectionTracker::new(0);
        assert!(tracker.try_acquire().is_none());
        assert_eq!(tracker.active(), 0);
    }

    #[test]
    fn oversized_max_is_clamped() {
        let tracker = ConnectionTracker::new(usize::MAX);
        assert_eq!(tracker.max(), Semaphore::MAX_PERMITS);
        assert_eq!(tracker.active(), 0);
    }

    #[tokio::test]
    async fn permit_moves_into_task() {
        let tracker = Arc::new(ConnectionTracker::new(1));
        let permit = tracker.try_acquire().unwrap();
        tokio::spawn(async move { drop(permit) }).await.unwrap();
        assert_eq!(tracker.active(), 0);
    }
}
