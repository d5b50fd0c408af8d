//! Periodic driver for a [`DirectoryMonitor`].
use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    core::monitor::{DirectoryMonitor, FileChangeSet},
    ports::scheduler::{ScheduledTask, Scheduler},
};

/// Default scan period.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScannerError {
    #[error("scan interval must be positive, got {0}")]
    InvalidInterval(i64),

    #[error("scanner is already started")]
    AlreadyStarted,
}

/// Receives the non-empty change sets produced by scans.
pub trait ChangeListener: Send + Sync + 'static {
    fn on_changes(&self, changes: FileChangeSet);
}

/// Scans a shared [`DirectoryMonitor`] on a fixed-rate schedule and forwards
/// changes to a listener.
pub struct PeriodicScanner {
    monitor: Arc<Mutex<DirectoryMonitor>>,
    scheduler: Arc<dyn Scheduler>,
    listener: Arc<dyn ChangeListener>,
    interval: Duration,
    task: Option<Box<dyn ScheduledTask>>,
}

impl PeriodicScanner {
    pub fn new(
        monitor: Arc<Mutex<DirectoryMonitor>>,
        scheduler: Arc<dyn Scheduler>,
        listener: Arc<dyn ChangeListener>,
    ) -> Self {
        Self {
            monitor,
            scheduler,
            listener,
            interval: DEFAULT_SCAN_INTERVAL,
            task: None,
        }
    }

    /// Set the period in seconds. Takes effect on the next `start`.
    pub fn set_scan_interval(&mut self, seconds: i64) -> Result<(), ScannerError> {
        match u64::try_from(seconds) {
            Ok(seconds) if seconds > 0 => {
                self.interval = Duration::from_secs(seconds);
                Ok(())
            }
            _ => Err(ScannerError::InvalidInterval(seconds)),
        }
    }

    /// Set a sub-second or humantime-derived period.
    pub fn set_scan_period(&mut self, period: Duration) -> Result<(), ScannerError> {
        if period.is_zero() {
            return Err(ScannerError::InvalidInterval(0));
        }
        self.interval = period;
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        self.interval
    }

    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }

    /// Schedule scans immediately and then once per interval.
    pub fn start(&mut self) -> Result<(), ScannerError> {
        if self.task.is_some() {
            return Err(ScannerError::AlreadyStarted);
        }
        let monitor = self.monitor.clone();
        let listener = self.listener.clone();
        let job = Arc::new(move || scan_once(&monitor, listener.as_ref()));
        self.task = Some(
            self.scheduler
                .schedule_at_fixed_rate(Duration::ZERO, self.interval, job),
        );
        tracing::info!(interval = ?self.interval, "Periodic route scanning started");
        Ok(())
    }

    /// Cancel the scheduled scans. Calling `stop` again is a no-op.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
            tracing::info!("Periodic route scanning stopped");
        }
    }
}

impl Drop for PeriodicScanner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run one scan and forward a non-empty result.
///
/// The monitor stays locked while the listener runs, so a change set is
/// always applied before the next scan can observe newer state.
pub fn scan_once(monitor: &Mutex<DirectoryMonitor>, listener: &dyn ChangeListener) {
    let mut monitor = monitor.lock();
    let changes = monitor.scan();
    if !changes.is_empty() {
        listener.on_changes(changes);
    }
}
