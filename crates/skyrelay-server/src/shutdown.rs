//! Process-wide stop signal.
//!
//! One `CancellationToken` fans out to axum's graceful shutdown, every
//! connection loop, and the idle-session sweeper.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::graceful_shutdown`] waits when no timeout is given.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the relay's root cancellation token.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Fresh coordinator; nothing is cancelled yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that fires when shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Start shutdown. Repeat calls are no-ops.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("relay shutdown requested");
        }
        self.token.cancel();
    }

    /// `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown and drain `tasks`.
    ///
    /// Returns `false` if the deadline passed first. Tasks still running at
    /// that point are left to the runtime.
    pub async fn graceful_shutdown(
        &self,
        tasks: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> bool {
        let deadline = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        info!(tasks = tasks.len(), deadline = ?deadline, "draining relay tasks");

        match tokio::time::timeout(deadline, futures::future::join_all(tasks)).await {
            Ok(results) => {
                let panicked = results.iter().filter(|r| r.is_err()).count();
                if panicked > 0 {
                    warn!(panicked, "relay tasks ended abnormally");
                }
                true
            }
            Err(_) => {
                warn!(deadline = ?deadline, "relay tasks still running at shutdown deadline");
                false
            }
        }
    }
}
