use std::time::Duration;

use tokio::{runtime::Handle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ports::scheduler::{ScheduledJob, ScheduledTask, Scheduler};

/// Scheduler adapter backed by the tokio runtime.
///
/// Each run executes on the blocking pool and the next tick is only awaited
/// after it returns, so runs of one job never overlap. Ticks missed while a
/// run was in progress are delayed rather than bunched up.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Create a scheduler bound to the current runtime.
    ///
    /// # Panics
    /// Panics when called outside of a tokio runtime.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_at_fixed_rate(
        &self,
        initial_delay: Duration,
        period: Duration,
        job: ScheduledJob,
    ) -> Box<dyn ScheduledTask> {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        self.handle.spawn(async move {
            let start = tokio::time::Instant::now() + initial_delay;
            let mut ticks = tokio::time::interval_at(start, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticks.tick() => {}
                }
                let job = job.clone();
                let run = tokio::task::spawn_blocking(move || job());
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    result = run => {
                        if let Err(e) = result {
                            tracing::error!("Scheduled job failed: {}", e);
                        }
                    }
                }
            }
            tracing::debug!("Scheduled job loop finished");
        });
        Box::new(TokioTask { token })
    }
}

struct TokioTask {
    token: CancellationToken,
}

impl ScheduledTask for TokioTask {
    fn cancel(&self) {
        self.token.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
