use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use wheelhouse_core::UnitFault;

use super::{ExecutionUnit, UnitEvent, UnitEventSender, UnitFactory, UnitReport, UnitSpawnError, UnitWork};
use crate::scheduler::types::UnitId;

/// Execution unit backed by a dedicated OS thread.
///
/// The thread drains an inbox of [`UnitWork`] one item at a time, so a
/// persistent unit can serve many payloads over its lifetime. Panics inside
/// an operator are caught and reported as faults.
pub struct ThreadUnit {
    id: UnitId,
    inbox: Option<mpsc::UnboundedSender<UnitWork>>,
    events: UnitEventSender,
}

impl ThreadUnit {
    pub fn spawn(id: UnitId, events: UnitEventSender) -> Result<Self, UnitSpawnError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<UnitWork>();
        let reply = events.clone();

        thread::Builder::new()
            .name(format!("wheelhouse-unit-{}", id))
            .spawn(move || {
                while let Some(work) = rx.blocking_recv() {
                    let report = run_isolated(&work);
                    if reply.send(UnitEvent::for_work(id, &work, report)).is_err() {
                        // Control loop is gone; nobody is listening.
                        break;
                    }
                }
                debug!(unit_id = id, "unit thread exiting");
            })
            .map_err(|source| UnitSpawnError::Io { id, source })?;

        Ok(Self {
            id,
            inbox: Some(tx),
            events,
        })
    }
}

fn run_isolated(work: &UnitWork) -> UnitReport {
    match panic::catch_unwind(AssertUnwindSafe(|| work.run())) {
        Ok(report) => report,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unit panicked".to_string());
            UnitReport::Failure(UnitFault::new(message).with_location(work.operator.name()))
        }
    }
}

impl ExecutionUnit for ThreadUnit {
    fn id(&self) -> UnitId {
        self.id
    }

    fn post(&mut self, work: UnitWork) {
        let undelivered = match &self.inbox {
            Some(inbox) => inbox.send(work).err().map(|e| e.0),
            None => Some(work),
        };
        if let Some(work) = undelivered {
            warn!(unit_id = self.id, task_id = work.task_id, "unit is not accepting work");
            let fault = UnitFault::new("unit is no longer running").with_location("unit");
            let _ = self
                .events
                .send(UnitEvent::for_work(self.id, &work, UnitReport::Failure(fault)));
        }
    }

    fn terminate(&mut self) {
        // Closing the inbox ends the thread's receive loop.
        self.inbox.take();
    }
}

/// Spawns [`ThreadUnit`]s reporting to one control loop.
pub struct ThreadUnitFactory {
    events: UnitEventSender,
}

impl ThreadUnitFactory {
    pub fn new(events: UnitEventSender) -> Self {
        Self { events }
    }
}

impl UnitFactory for ThreadUnitFactory {
    type Unit = ThreadUnit;

    fn spawn(&mut self, id: UnitId) -> Result<ThreadUnit, UnitSpawnError> {
        ThreadUnit::spawn(id, self.events.clone())
    }
}
