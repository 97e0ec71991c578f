//! Graceful shutdown signaling.
//!
//! A [`ShutdownSignal`] coordinates shutdown across the accept loops and
//! the drain coordinator. It can be cloned freely; all clones observe the
//! same trigger.
//!
//! # Example
//!
//! ```rust,ignore
//! let shutdown = ShutdownSignal::with_os_signals();
//!
//! tokio::select! {
//!     _ = shutdown.wait() => tracing::info!("shutting down"),
//!     _ = accept_loop() => {}
//! }
//! ```

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable, idempotent shutdown trigger.
///
/// # Example
///
/// ```rust
/// use gangway_server::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// let other = shutdown.clone();
///
/// shutdown.trigger();
/// assert!(other.is_shutdown());
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Creates a new, untriggered shutdown signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Triggers shutdown. Safe to call any number of times.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns `true` if shutdown has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until shutdown is triggered.
    ///
    /// Completes immediately if the signal was already triggered.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // wait_for only errs when the sender is dropped, which cannot
        // happen while `self` holds it.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Creates a shutdown signal wired to the process termination signals.
    ///
    /// Triggers on SIGTERM or SIGINT on Unix, Ctrl+C elsewhere. The reload
    /// signal (SIGHUP) is the supervisor's concern, not the worker's.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            wait_for_termination().await;
            trigger.trigger();
        });

        signal
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for a process termination signal.
async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to register SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to register SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, draining"),
            _ = sigint.recv() => tracing::info!("received SIGINT, draining"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to wait for Ctrl+C");
            return;
        }
        tracing::info!("received Ctrl+C, draining");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_is_untriggered() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_shutdown());
    }

    #[test]
    fn test_trigger_is_idempotent() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.trigger();
        assert!(signal.is_shutdown());
    }

    #[test]
    fn test_clones_observe_trigger() {
        let a = ShutdownSignal::new();
        let b = a.clone();
        a.trigger();
        assert!(b.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_completes_after_trigger() {
        let signal = ShutdownSignal::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.trigger();
        });

        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("wait should complete");
    }

    #[tokio::test]
    async fn test_wait_completes_immediately_when_already_triggered() {
        let signal = ShutdownSignal::new();
        signal.trigger();

        tokio::time::timeout(Duration::from_millis(10), signal.wait())
            .await
            .expect("wait should complete immediately");
    }
}
