use serde::{Deserialize, Serialize};
use serde_json::Value;
use wheelhouse_core::{DataType, Operator, SortOrder};

use super::metrics::SchedulerMetrics;
use crate::error_log::ErrorRecord;

/// Process-unique, monotonically increasing task identifier.
pub type TaskId = u64;

/// Execution unit identifier. Persistent units use `0..capacity`.
pub type UnitId = usize;

/// A request to run an operator over an input, split across `threads` units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub operator: Operator,
    /// Array to partition. `None` runs the operator once per range over an
    /// empty slice.
    #[serde(default)]
    pub input: Option<Vec<Value>>,
    /// Auxiliary parameters passed unchanged to every unit.
    #[serde(default)]
    pub params: Value,
    /// Number of ranges. 0 is treated as 1 and more than
    /// [`MAX_RANGES`](crate::partition::MAX_RANGES) is rejected; ranges
    /// beyond the pool's capacity queue until a unit frees up.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Merge per-range outputs into one sequence.
    #[serde(default = "default_aggregate")]
    pub aggregate: bool,
    #[serde(default)]
    pub data_type: Option<DataType>,
    /// Memoize the result. `None` follows the pool's `memoize` setting.
    #[serde(default)]
    pub cacheable: Option<bool>,
    #[serde(default)]
    pub sort: Option<SortOrder>,
}

fn default_threads() -> usize {
    1
}

fn default_aggregate() -> bool {
    true
}

impl TaskRequest {
    pub fn new(operator: Operator) -> Self {
        Self {
            operator,
            input: None,
            params: Value::Null,
            threads: default_threads(),
            aggregate: default_aggregate(),
            data_type: None,
            cacheable: None,
            sort: None,
        }
    }

    pub fn input(mut self, input: Vec<Value>) -> Self {
        self.input = Some(input);
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn aggregate(mut self, aggregate: bool) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = Some(cacheable);
        self
    }

    pub fn sort(mut self, order: SortOrder) -> Self {
        self.sort = Some(order);
        self
    }

    pub fn input_len(&self) -> usize {
        self.input.as_ref().map_or(0, Vec::len)
    }
}

/// Point-in-time view of the pool and scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub capacity: usize,
    pub persistent: bool,
    pub running: Vec<UnitId>,
    pub pending: usize,
    pub live_tasks: usize,
    pub cache_entries: usize,
    pub errors: Vec<ErrorRecord>,
    pub metrics: SchedulerMetrics,
}
