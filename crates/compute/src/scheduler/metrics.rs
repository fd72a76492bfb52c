use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler counters, exposed through pool snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerMetrics {
    pub tasks_submitted: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    /// Submissions answered from the memo cache without dispatch.
    pub cache_hits: u64,
    pub ranges_dispatched: u64,
    /// Ranges that had to wait in the pending queue.
    pub ranges_queued: u64,
    pub unit_faults: u64,
    /// Reports for tasks that had already settled or failed.
    pub late_reports_discarded: u64,
    /// Pending entries dropped because their task failed first.
    pub pending_purged: u64,
    /// Highest number of simultaneously running units observed.
    pub peak_running: usize,
    pub units_spawned: u64,
    pub units_terminated: u64,
    /// Mean submit-to-settle time of successful tasks.
    pub avg_task_duration: Duration,
    pub last_settled: Option<DateTime<Utc>>,
}

impl SchedulerMetrics {
    /// Record a successful settle.
    pub fn record_success(&mut self, duration: Duration) {
        self.tasks_succeeded += 1;
        self.last_settled = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.tasks_succeeded;
        self.avg_task_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_task_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub fn record_failure(&mut self) {
        self.tasks_failed += 1;
        self.last_settled = Some(Utc::now());
    }

    pub fn observe_running(&mut self, running: usize) {
        self.peak_running = self.peak_running.max(running);
    }
}
