use std::time::Duration;

use eyre::{Result, WrapErr};
use parking_lot::Mutex;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Why the gateway is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Requested programmatically
    Requested,
}

/// Process-wide shutdown coordination.
///
/// Signals (or [`GracefulShutdown::trigger`]) cancel a shared token; the
/// server, the scanner and the directory watcher all stop on that token.
pub struct GracefulShutdown {
    token: CancellationToken,
    reason: Mutex<Option<ShutdownReason>>,
    drain_timeout: Duration,
}

impl GracefulShutdown {
    /// Shutdown manager with a 30 second drain timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(drain_timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Mutex::new(None),
            drain_timeout,
        }
    }

    /// Token cancelled once shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Time in-flight requests get before the server is dropped.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason.lock()
    }

    /// Start shutting down. Returns `false` when shutdown was already underway.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let mut current = self.reason.lock();
        if current.is_some() {
            tracing::debug!(?reason, "Shutdown already initiated, ignoring");
            return false;
        }
        *current = Some(reason);
        tracing::info!(?reason, "Initiating graceful shutdown");
        self.token.cancel();
        true
    }

    /// Wait for SIGINT or SIGTERM (or a programmatic trigger).
    pub async fn run_signal_handler(&self) -> Result<()> {
        let terminate = wait_for_sigterm();
        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to listen for Ctrl+C")?;
                self.trigger(ShutdownReason::Interrupt);
            }
            result = terminate => {
                result?;
                self.trigger(ShutdownReason::Terminate);
            }
            _ = self.token.cancelled() => {}
        }
        Ok(())
    }

    /// Resolve once shutdown has started.
    pub async fn wait(&self) -> ShutdownReason {
        self.token.cancelled().await;
        self.reason().unwrap_or(ShutdownReason::Requested)
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("Failed to register SIGTERM handler")?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
