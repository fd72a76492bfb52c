use tracing::{debug, warn};
use wheelhouse_core::UnitFault;

use super::Scheduler;
use crate::aggregate::{aggregate, sort};
use crate::error_log::ErrorRecord;
use crate::scheduler::task::TaskError;
use crate::scheduler::types::{TaskId, UnitId};
use crate::unit::{UnitEvent, UnitFactory, UnitOutput, UnitReport};

impl<F: UnitFactory> Scheduler<F> {
    /// Apply one unit report: update the owning task, settle it if this was
    /// its last outstanding range, then give the freed slot to the head of
    /// the pending queue.
    pub fn on_unit_report(&mut self, event: UnitEvent) {
        let UnitEvent {
            unit_id,
            task_id,
            range_index,
            report,
        } = event;

        if !self.pool.release(unit_id) {
            warn!(unit_id, task_id, "Report from a unit that is not running, ignoring");
            return;
        }
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.active_units.remove(&unit_id);
        }

        match report {
            UnitReport::Success(output) => self.complete_range(task_id, range_index, output),
            UnitReport::Failure(fault) => self.fail_range(unit_id, task_id, range_index, &fault),
        }

        self.service_queue(unit_id);
    }

    fn complete_range(&mut self, task_id: TaskId, range_index: usize, output: UnitOutput) {
        let Some(task) = self.tasks.get_mut(&task_id) else {
            self.metrics.late_reports_discarded += 1;
            debug!(task_id, range_index, "Discarding late report");
            return;
        };
        if task.data_type.is_none() {
            task.data_type = output.data_type;
        }
        if !task.record_output(range_index, output.data) {
            warn!(task_id, range_index, "Duplicate or unknown range report, ignoring");
            return;
        }
        if task.is_done() {
            self.settle_success(task_id);
        }
    }

    fn settle_success(&mut self, task_id: TaskId) {
        let Some(mut task) = self.tasks.remove(&task_id) else {
            return;
        };
        let result = sort(
            aggregate(task.take_outputs(), task.aggregate, task.data_type),
            task.sort,
        );
        if let Some(key) = task.cache_key.take() {
            self.cache.store(key, result.clone());
        }
        let elapsed = task.submitted_at.elapsed();
        self.metrics.record_success(elapsed);
        debug!(task_id, ranges = task.thread_count, ?elapsed, "Task settled");
        task.settle(Ok(result));
    }

    fn fail_range(&mut self, unit_id: UnitId, task_id: TaskId, range_index: usize, fault: &UnitFault) {
        let record = ErrorRecord::from_fault(unit_id, task_id, range_index, fault);
        warn!(unit_id, task_id, range_index, "{}", record.message);
        self.errors.record(record.clone());
        self.metrics.unit_faults += 1;

        if self.tasks.contains_key(&task_id) {
            self.reject(task_id, TaskError::Unit(record));
        } else {
            self.metrics.late_reports_discarded += 1;
        }
    }

    /// Fail a live task immediately. Ranges still running are not cancelled;
    /// their reports are discarded when they arrive.
    pub(super) fn reject(&mut self, task_id: TaskId, error: TaskError) {
        let Some(mut task) = self.tasks.remove(&task_id) else {
            return;
        };
        let purged = self.pool.purge_task(task_id);
        self.metrics.pending_purged += purged as u64;
        self.metrics.record_failure();
        warn!(task_id, purged, error = %error, "Task failed");
        task.settle(Err(error));
    }

    /// Give the slot `unit_id` just freed to the first pending range that
    /// still belongs to a live task, or park the unit.
    fn service_queue(&mut self, unit_id: UnitId) {
        while let Some(work) = self.pool.pop_pending() {
            let (task_id, range_index) = (work.task_id, work.range_index);
            if !self.tasks.contains_key(&task_id) {
                self.metrics.pending_purged += 1;
                continue;
            }
            match self.pool.hand_off(unit_id, work) {
                Ok(next) => {
                    self.mark_dispatched(task_id, next, range_index);
                    return;
                }
                Err(e) => {
                    warn!(task_id, range_index, error = %e, "Could not start unit");
                    self.reject(task_id, TaskError::Spawn(e.to_string()));
                }
            }
        }
        self.pool.retire(unit_id);
    }
}
