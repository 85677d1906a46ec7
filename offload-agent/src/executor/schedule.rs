//! Progress polling cadence.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::supervisor::WorkerTable;

/// What the orchestrator should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// Workers are still running; report progress.
    Report,
    /// Every worker is terminal.
    Complete,
    /// Shutdown was requested before the tick.
    Interrupted,
}

/// Fixed-interval tick combined with the job-completion predicate.
///
/// The first tick fires one full period after creation. A slow report cycle
/// delays the following ticks instead of bunching them up.
pub struct PollSchedule {
    interval: Interval,
}

impl PollSchedule {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Sleep until the next tick, then refresh the worker table.
    pub async fn next(&mut self, table: &mut WorkerTable, shutdown: &CancellationToken) -> Cycle {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Cycle::Interrupted,
            _ = self.interval.tick() => {}
        }

        table.poll();
        if table.all_terminal() {
            Cycle::Complete
        } else {
            Cycle::Report
        }
    }
}
