use std::collections::HashMap;

use tracing::info;
use wheelhouse_core::PoolConfig;

use crate::cache::MemoCache;
use crate::error_log::ErrorLog;
use crate::pool::PoolManager;
use crate::scheduler::metrics::SchedulerMetrics;
use crate::scheduler::task::Task;
use crate::scheduler::types::{PoolSnapshot, TaskId};
use crate::unit::{UnitFactory, UnitSpawnError};

/// Owns every piece of mutable scheduling state: the task registry, the
/// pool, the memo cache, and the error log.
///
/// All methods are synchronous and must be driven from a single control
/// thread; see [`crate::runtime::Runtime`].
pub struct Scheduler<F: UnitFactory> {
    pub(super) pool: PoolManager<F>,
    pub(super) tasks: HashMap<TaskId, Task>,
    pub(super) cache: MemoCache,
    pub(super) errors: ErrorLog,
    pub(super) metrics: SchedulerMetrics,
    pub(super) next_task_id: TaskId,
    /// Default for requests that leave `cacheable` unset.
    pub(super) memoize: bool,
    /// Force every task onto one range.
    pub(super) legacy: bool,
    /// Log each dispatch at info level.
    pub(super) verbose: bool,
}

impl<F: UnitFactory> Scheduler<F> {
    /// Build a scheduler and its pool from `config`.
    pub fn new(config: &PoolConfig, factory: F) -> Result<Self, UnitSpawnError> {
        let capacity = if config.legacy { 1 } else { config.resolved_capacity() };
        let pool = PoolManager::new(factory, capacity, config.persistence)?;
        info!(
            capacity,
            persistent = config.persistence,
            legacy = config.legacy,
            "Scheduler initialized"
        );
        Ok(Self {
            pool,
            tasks: HashMap::new(),
            cache: MemoCache::new(),
            errors: ErrorLog::new(),
            metrics: SchedulerMetrics::default(),
            next_task_id: 0,
            memoize: config.memoize,
            legacy: config.legacy,
            verbose: config.debug,
        })
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Number of tasks accepted but not yet settled.
    pub fn live_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn cache(&self) -> &MemoCache {
        &self.cache
    }

    /// Current metrics, with unit lifecycle counters taken from the pool.
    pub fn metrics(&self) -> SchedulerMetrics {
        let mut m = self.metrics.clone();
        m.units_spawned = self.pool.units_spawned();
        m.units_terminated = self.pool.units_terminated();
        m
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            capacity: self.pool.capacity(),
            persistent: self.pool.is_persistent(),
            running: self.pool.running_ids(),
            pending: self.pool.pending_count(),
            live_tasks: self.tasks.len(),
            cache_entries: self.cache.len(),
            errors: self.errors.to_vec(),
            metrics: self.metrics(),
        }
    }

    /// Tear down every unit. Unsettled tasks are dropped, which resolves
    /// their handles as abandoned.
    pub fn shutdown(&mut self) {
        info!(
            live_tasks = self.tasks.len(),
            pending = self.pool.pending_count(),
            "Scheduler shutting down"
        );
        self.pool.shutdown();
        self.tasks.clear();
    }
}
