//! Shutdown coordination.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Long-running tasks subscribe and stop when the signal fires. Subscribers
/// created after [`Shutdown::trigger`] still observe it.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Future resolving once shutdown has been triggered.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            // A closed channel means the coordinator is gone; stop as well.
            let _ = rx.wait_for(|triggered| *triggered).await;
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// How the drain phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight request finished.
    Completed,
    /// The grace period elapsed; the server task was aborted.
    Forced,
}

/// Wait up to `grace` for the server task to finish after shutdown was
/// triggered, aborting it afterwards.
pub async fn drain<T>(mut server: JoinHandle<T>, grace: Duration) -> DrainOutcome {
    match tokio::time::timeout(grace, &mut server).await {
        Ok(Ok(_)) => DrainOutcome::Completed,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Server task failed during shutdown");
            DrainOutcome::Completed
        }
        Err(_) => {
            tracing::warn!(grace = ?grace, "Shutdown grace period elapsed, forcing exit");
            server.abort();
            DrainOutcome::Forced
        }
    }
}
