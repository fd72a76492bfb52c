use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use wheelhouse_core::PartitionError;

use super::Scheduler;
use crate::cache::CacheKey;
use crate::partition::partition_len;
use crate::pool::Dispatch;
use crate::scheduler::task::{Task, TaskError, TaskResult};
use crate::scheduler::types::{TaskId, TaskRequest, UnitId};
use crate::unit::{UnitFactory, UnitWork};

impl<F: UnitFactory> Scheduler<F> {
    /// Accept a task and dispatch its ranges.
    ///
    /// The result is delivered through `settle`, possibly before this call
    /// returns (memo cache hit, spawn failure). A partition error settles
    /// the task and is also returned.
    pub fn submit(
        &mut self,
        request: TaskRequest,
        settle: oneshot::Sender<TaskResult>,
    ) -> Result<TaskId, PartitionError> {
        let TaskRequest {
            operator,
            input,
            params,
            threads,
            aggregate,
            data_type,
            cacheable,
            sort,
        } = request;

        // Fan-out beyond capacity is allowed; extra ranges wait in the
        // pending queue.
        let threads = if self.legacy { 1 } else { threads.max(1) };
        let len = input.as_ref().map_or(0, Vec::len);
        let ranges = match partition_len(len, threads) {
            Ok(ranges) => ranges,
            Err(e) => {
                let _ = settle.send(Err(TaskError::Partition(e.clone())));
                return Err(e);
            }
        };

        let id = self.next_task_id;
        self.next_task_id += 1;
        self.metrics.tasks_submitted += 1;

        let cache_key = cacheable
            .unwrap_or(self.memoize)
            .then(|| CacheKey::new(&operator, input.as_deref(), &params, data_type));
        if let Some(hit) = cache_key.as_ref().and_then(|key| self.cache.lookup(key)) {
            debug!(task_id = id, "Memo cache hit");
            let output = hit.clone();
            self.metrics.cache_hits += 1;
            self.metrics.record_success(Duration::ZERO);
            let _ = settle.send(Ok(output));
            return Ok(id);
        }

        let operator = Arc::new(operator);
        let input = Arc::new(input.unwrap_or_default());
        let params = Arc::new(params);
        let task = Task::new(
            id,
            ranges.clone(),
            Arc::clone(&operator),
            Arc::clone(&input),
            Arc::clone(&params),
            aggregate,
            sort,
            data_type,
            cache_key,
            settle,
        );
        self.tasks.insert(id, task);
        debug!(task_id = id, threads, len, op = operator.name(), "Task accepted");

        for (range_index, range) in ranges.into_iter().enumerate() {
            let bounds = range.clip(input.len());
            let work = UnitWork {
                task_id: id,
                range_index,
                range,
                offset: bounds.start,
                operator: Arc::clone(&operator),
                slice: input[bounds].to_vec(),
                params: Arc::clone(&params),
                data_type,
            };
            match self.pool.try_dispatch(work) {
                Ok(Dispatch::Dispatched(unit_id)) => self.mark_dispatched(id, unit_id, range_index),
                Ok(Dispatch::Queued) => self.metrics.ranges_queued += 1,
                Err(e) => {
                    warn!(task_id = id, range_index, error = %e, "Could not start unit");
                    self.reject(id, TaskError::Spawn(e.to_string()));
                    break;
                }
            }
        }
        Ok(id)
    }

    pub(super) fn mark_dispatched(&mut self, task_id: TaskId, unit_id: UnitId, range_index: usize) {
        if let Some(task) = self.tasks.get_mut(&task_id) {
            task.active_units.insert(unit_id);
        }
        self.metrics.ranges_dispatched += 1;
        self.metrics.observe_running(self.pool.running_count());
        if self.verbose {
            info!(task_id, unit_id, range_index, "Dispatched range");
        } else {
            debug!(task_id, unit_id, range_index, "Dispatched range");
        }
    }
}
