//! Pool manager: owns the execution units, the running set, and the FIFO
//! pending queue of ranges waiting for a free unit.
//!
//! The pool never looks at tasks. Whether a queued range still belongs to a
//! live task is the scheduler's call.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tracing::{debug, info};

use crate::scheduler::types::{TaskId, UnitId};
use crate::unit::{ExecutionUnit, UnitFactory, UnitSpawnError, UnitWork};

/// Outcome of offering a range to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Posted to this unit.
    Dispatched(UnitId),
    /// All units busy; appended to the pending queue.
    Queued,
}

pub struct PoolManager<F: UnitFactory> {
    factory: F,
    capacity: usize,
    persistent: bool,
    units: HashMap<UnitId, F::Unit>,
    /// Persistent units not currently running, in release order.
    idle: VecDeque<UnitId>,
    running: BTreeSet<UnitId>,
    pending: VecDeque<UnitWork>,
    next_unit_id: UnitId,
    spawned: u64,
    terminated: u64,
}

impl<F: UnitFactory> PoolManager<F> {
    /// Build a pool of `capacity` slots. Persistent pools spawn every unit
    /// up front.
    pub fn new(factory: F, capacity: usize, persistent: bool) -> Result<Self, UnitSpawnError> {
        let mut pool = Self {
            factory,
            capacity: capacity.max(1),
            persistent,
            units: HashMap::new(),
            idle: VecDeque::new(),
            running: BTreeSet::new(),
            pending: VecDeque::new(),
            next_unit_id: 0,
            spawned: 0,
            terminated: 0,
        };

        if persistent {
            for _ in 0..pool.capacity {
                match pool.spawn_unit() {
                    Ok(id) => pool.idle.push_back(id),
                    Err(e) => {
                        pool.shutdown();
                        return Err(e);
                    }
                }
            }
            info!(capacity = pool.capacity, "Persistent pool ready");
        }
        Ok(pool)
    }

    fn spawn_unit(&mut self) -> Result<UnitId, UnitSpawnError> {
        let id = self.next_unit_id;
        let unit = self.factory.spawn(id)?;
        self.next_unit_id += 1;
        self.units.insert(id, unit);
        self.spawned += 1;
        debug!(unit_id = id, "Spawned unit");
        Ok(id)
    }

    /// Post `work` to a free unit, or queue it when all slots are taken.
    pub fn try_dispatch(&mut self, work: UnitWork) -> Result<Dispatch, UnitSpawnError> {
        if self.running.len() >= self.capacity {
            debug!(task_id = work.task_id, range = work.range_index, "Pool saturated, queueing range");
            self.pending.push_back(work);
            return Ok(Dispatch::Queued);
        }

        let id = if self.persistent {
            match self.idle.pop_front() {
                Some(id) => id,
                None => {
                    self.pending.push_back(work);
                    return Ok(Dispatch::Queued);
                }
            }
        } else {
            self.spawn_unit()?
        };

        self.post(id, work);
        Ok(Dispatch::Dispatched(id))
    }

    /// Hand queued `work` to the slot `freed` just gave up, bypassing the
    /// capacity check. Persistent units take it themselves; a non-persistent
    /// unit is torn down and a fresh one takes its slot.
    pub fn hand_off(&mut self, freed: UnitId, work: UnitWork) -> Result<UnitId, UnitSpawnError> {
        let id = if self.persistent {
            freed
        } else {
            self.retire(freed);
            self.spawn_unit()?
        };
        self.post(id, work);
        Ok(id)
    }

    fn post(&mut self, id: UnitId, work: UnitWork) {
        if let Some(unit) = self.units.get_mut(&id) {
            self.running.insert(id);
            unit.post(work);
        }
    }

    /// Mark a unit as no longer running. Returns `false` if it was not.
    pub fn release(&mut self, id: UnitId) -> bool {
        self.running.remove(&id)
    }

    /// Park a released unit with nothing left to do. Non-persistent units
    /// are torn down.
    pub fn retire(&mut self, id: UnitId) {
        if self.persistent {
            if self.units.contains_key(&id) && !self.idle.contains(&id) {
                self.idle.push_back(id);
            }
        } else if let Some(mut unit) = self.units.remove(&id) {
            unit.terminate();
            self.terminated += 1;
            debug!(unit_id = id, "Terminated unit");
        }
    }

    /// Head of the pending queue.
    pub fn pop_pending(&mut self) -> Option<UnitWork> {
        self.pending.pop_front()
    }

    /// Drop queued ranges of `task_id`. Returns how many were removed.
    pub fn purge_task(&mut self, task_id: TaskId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|w| w.task_id != task_id);
        before - self.pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn running_ids(&self) -> Vec<UnitId> {
        self.running.iter().copied().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn units_spawned(&self) -> u64 {
        self.spawned
    }

    pub fn units_terminated(&self) -> u64 {
        self.terminated
    }

    /// Terminate every unit and forget all queued work.
    pub fn shutdown(&mut self) {
        for (_, mut unit) in self.units.drain() {
            unit.terminate();
            self.terminated += 1;
        }
        self.idle.clear();
        self.running.clear();
        self.pending.clear();
    }
}
