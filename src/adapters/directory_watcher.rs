use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use eyre::{Result, WrapErr};
use notify::{RecursiveMode, Watcher};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::core::router::Router;

/// Quiet period after a file event before rescanning, so editors that write
/// in several steps trigger a single reload.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Turns file system notifications for the route directory into rescans.
///
/// The directory monitor stays the source of truth: events only trigger an
/// early scan, they are never interpreted themselves.
pub struct DirectoryWatcher {
    directory: PathBuf,
    _watcher: notify::RecommendedWatcher,
    events: mpsc::Receiver<()>,
}

impl DirectoryWatcher {
    pub fn new(directory: impl Into<PathBuf>, extension: &str) -> Result<Self> {
        let directory = directory.into();
        let (tx, rx) = mpsc::channel(1);
        let extension = OsString::from(extension);

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if (event.kind.is_modify()
                            || event.kind.is_create()
                            || event.kind.is_remove())
                            && event
                                .paths
                                .iter()
                                .any(|p| p.extension() == Some(extension.as_os_str()))
                        {
                            tracing::trace!(kind = ?event.kind, "Route file event");
                            // A pending signal already covers this event.
                            let _ = tx.try_send(());
                        }
                    }
                    Err(e) => tracing::error!("Route directory watch error: {:?}", e),
                }
            })?;
        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .wrap_err_with(|| format!("Failed to watch route directory {}", directory.display()))?;

        tracing::info!(directory = %directory.display(), "Watching route directory");
        Ok(Self {
            directory,
            _watcher: watcher,
            events: rx,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Rescan `router` after each burst of events until `shutdown` fires.
    /// Scans run on the blocking pool.
    pub fn spawn(
        mut self,
        router: Arc<Router>,
        debounce: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = self.events.recv() => {
                        if event.is_none() {
                            break;
                        }
                    }
                }
                tokio::time::sleep(debounce).await;
                while self.events.try_recv().is_ok() {}

                let router = router.clone();
                match tokio::task::spawn_blocking(move || router.rescan()).await {
                    Ok(report) if !report.is_empty() => {
                        tracing::debug!(
                            installed = report.installed.len(),
                            replaced = report.replaced.len(),
                            removed = report.removed.len(),
                            "Rescan triggered by file event"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Route rescan task failed: {}", e),
                }
            }
            tracing::debug!(directory = %self.directory.display(), "Route directory watcher stopped");
        })
    }
}
