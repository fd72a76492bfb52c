use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;
use wheelhouse_core::{DataType, Operator, PartitionError, SortOrder, WheelhouseError};

use super::types::{TaskId, UnitId};
use crate::aggregate::TaskOutput;
use crate::cache::CacheKey;
use crate::error_log::ErrorRecord;
use crate::partition::IndexRange;

/// Why a task did not produce an output.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// A unit reported a failure; siblings were abandoned.
    #[error("{0}")]
    Unit(ErrorRecord),
    #[error("Unit spawn failed: {0}")]
    Spawn(String),
    #[error("Invalid partition: {0}")]
    Partition(#[from] PartitionError),
    /// The runtime shut down before the task settled.
    #[error("Task abandoned before settling")]
    Abandoned,
    #[error(transparent)]
    Runtime(#[from] WheelhouseError),
}

pub type TaskResult = Result<TaskOutput, TaskError>;

/// Completion signal for a submitted task. Await it for the result.
#[derive(Debug)]
pub struct TaskHandle {
    rx: oneshot::Receiver<TaskResult>,
}

/// Create a connected settle sender and handle.
pub fn settle_channel() -> (oneshot::Sender<TaskResult>, TaskHandle) {
    let (tx, rx) = oneshot::channel();
    (tx, TaskHandle { rx })
}

impl TaskHandle {
    /// Non-blocking poll. `None` while the task is still running.
    pub fn try_result(&mut self) -> Option<TaskResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TaskError::Abandoned)),
        }
    }
}

impl Future for TaskHandle {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(TaskError::Abandoned)))
    }
}

/// Live bookkeeping for one accepted task.
pub struct Task {
    pub id: TaskId,
    pub thread_count: usize,
    pub ranges: Vec<IndexRange>,
    pub operator: Arc<Operator>,
    pub input: Arc<Vec<Value>>,
    pub params: Arc<Value>,
    /// Per-range outputs, filled as units report.
    pub output: Vec<Option<Vec<Value>>>,
    pub completed: usize,
    pub active_units: HashSet<UnitId>,
    pub aggregate: bool,
    pub sort: Option<SortOrder>,
    pub data_type: Option<DataType>,
    pub cache_key: Option<CacheKey>,
    pub submitted_at: Instant,
    settle: Option<oneshot::Sender<TaskResult>>,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TaskId,
        ranges: Vec<IndexRange>,
        operator: Arc<Operator>,
        input: Arc<Vec<Value>>,
        params: Arc<Value>,
        aggregate: bool,
        sort: Option<SortOrder>,
        data_type: Option<DataType>,
        cache_key: Option<CacheKey>,
        settle: oneshot::Sender<TaskResult>,
    ) -> Self {
        let thread_count = ranges.len();
        Self {
            id,
            thread_count,
            ranges,
            operator,
            input,
            params,
            output: vec![None; thread_count],
            completed: 0,
            active_units: HashSet::new(),
            aggregate,
            sort,
            data_type,
            cache_key,
            submitted_at: Instant::now(),
            settle: Some(settle),
        }
    }

    /// Every range has reported and no unit is still working on this task.
    pub fn is_done(&self) -> bool {
        self.completed == self.thread_count && self.active_units.is_empty()
    }

    /// Store the output of `range_index`. Returns `false` for an out-of-range
    /// index or a range that already reported.
    pub fn record_output(&mut self, range_index: usize, data: Vec<Value>) -> bool {
        match self.output.get_mut(range_index) {
            Some(slot @ None) => {
                *slot = Some(data);
                self.completed += 1;
                true
            }
            _ => false,
        }
    }

    /// Outputs in range order.
    pub fn take_outputs(&mut self) -> Vec<Vec<Value>> {
        self.output
            .iter_mut()
            .map(|slot| slot.take().unwrap_or_default())
            .collect()
    }

    /// Deliver the final result. Only the first call has any effect.
    pub fn settle(&mut self, result: TaskResult) {
        if let Some(tx) = self.settle.take() {
            // The submitter may have dropped its handle.
            let _ = tx.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn task(ranges: usize) -> (Task, TaskHandle) {
        let (tx, handle) = settle_channel();
        let ranges = (0..ranges as i64).map(|k| IndexRange { start: k, end: k }).collect();
        let task = Task::new(
            1,
            ranges,
            Arc::new(Operator::Identity),
            Arc::new(vec![]),
            Arc::new(Value::Null),
            true,
            None,
            None,
            None,
            tx,
        );
        (task, handle)
    }

    #[test]
    fn duplicate_range_report_is_rejected() {
        let (mut t, _h) = task(2);
        assert!(t.record_output(1, vec![json!(1)]));
        assert!(!t.record_output(1, vec![json!(2)]));
        assert!(!t.record_output(5, vec![]));
        assert_eq!(t.completed, 1);
    }

    #[test]
    fn done_requires_no_active_units() {
        let (mut t, _h) = task(1);
        t.active_units.insert(0);
        t.record_output(0, vec![]);
        assert!(!t.is_done());
        t.active_units.remove(&0);
        assert!(t.is_done());
    }

    #[test]
    fn settles_once() {
        let (mut t, mut h) = task(1);
        assert!(h.try_result().is_none());
        t.settle(Ok(TaskOutput::Flat(vec![json!(1)])));
        t.settle(Err(TaskError::Abandoned));
        assert_eq!(h.try_result().unwrap().unwrap(), TaskOutput::Flat(vec![json!(1)]));
    }

    #[test]
    fn dropped_task_abandons_handle() {
        let (t, mut h) = task(1);
        drop(t);
        assert!(matches!(h.try_result(), Some(Err(TaskError::Abandoned))));
    }
}
