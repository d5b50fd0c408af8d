use std::{sync::Arc, time::Duration};

/// Work item run on every tick of a schedule.
pub type ScheduledJob = Arc<dyn Fn() + Send + Sync>;

/// Handle to a repeating schedule.
pub trait ScheduledTask: Send + Sync {
    /// Stop future runs and interrupt the current one if possible.
    fn cancel(&self);

    fn is_cancelled(&self) -> bool;
}

/// Scheduler defines the port for running a job periodically
pub trait Scheduler: Send + Sync + 'static {
    /// Run `job` after `initial_delay`, then once per `period`.
    ///
    /// Implementations must not overlap runs of the same job.
    fn schedule_at_fixed_rate(
        &self,
        initial_delay: Duration,
        period: Duration,
        job: ScheduledJob,
    ) -> Box<dyn ScheduledTask>;
}
