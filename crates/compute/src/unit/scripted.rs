//! Scripted execution units for scheduler tests.
//!
//! Units never run anything. They record what was posted to them; tests
//! then build [`UnitEvent`]s by hand and feed them to the scheduler in
//! whatever order they like.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use wheelhouse_core::UnitFault;

use super::{ExecutionUnit, UnitEvent, UnitFactory, UnitOutput, UnitReport, UnitSpawnError, UnitWork};
use crate::scheduler::types::{TaskId, UnitId};

#[derive(Debug, Default)]
pub struct Script {
    /// `(unit_id, work)` in post order.
    pub posted: Vec<(UnitId, UnitWork)>,
    pub spawned: Vec<UnitId>,
    pub terminated: Vec<UnitId>,
    /// Refuse every spawn while set.
    pub fail_spawn: bool,
}

pub type SharedScript = Arc<Mutex<Script>>;

pub struct ScriptedUnit {
    id: UnitId,
    script: SharedScript,
}

impl ExecutionUnit for ScriptedUnit {
    fn id(&self) -> UnitId {
        self.id
    }

    fn post(&mut self, work: UnitWork) {
        self.script.lock().unwrap().posted.push((self.id, work));
    }

    fn terminate(&mut self) {
        self.script.lock().unwrap().terminated.push(self.id);
    }
}

#[derive(Default)]
pub struct ScriptedFactory {
    pub script: SharedScript,
}

impl ScriptedFactory {
    pub fn new() -> (Self, SharedScript) {
        let factory = Self::default();
        let script = Arc::clone(&factory.script);
        (factory, script)
    }
}

impl UnitFactory for ScriptedFactory {
    type Unit = ScriptedUnit;

    fn spawn(&mut self, id: UnitId) -> Result<ScriptedUnit, UnitSpawnError> {
        let mut script = self.script.lock().unwrap();
        if script.fail_spawn {
            return Err(UnitSpawnError::Rejected {
                id,
                reason: "scripted refusal".into(),
            });
        }
        script.spawned.push(id);
        Ok(ScriptedUnit {
            id,
            script: Arc::clone(&self.script),
        })
    }
}

/// Find the posted work for `(task_id, range_index)`.
pub fn posted(script: &SharedScript, task_id: TaskId, range_index: usize) -> (UnitId, UnitWork) {
    script
        .lock()
        .unwrap()
        .posted
        .iter()
        .find(|(_, w)| w.task_id == task_id && w.range_index == range_index)
        .cloned()
        .unwrap_or_else(|| panic!("task {} range {} was never posted", task_id, range_index))
}

/// Success report for a posted range, echoing its slice as output.
pub fn echo(script: &SharedScript, task_id: TaskId, range_index: usize) -> UnitEvent {
    let (unit_id, work) = posted(script, task_id, range_index);
    let data: Vec<Value> = work.slice.clone();
    UnitEvent::for_work(
        unit_id,
        &work,
        UnitReport::Success(UnitOutput { data, data_type: work.data_type }),
    )
}

/// Success report with explicit output data.
pub fn succeed(script: &SharedScript, task_id: TaskId, range_index: usize, data: Vec<Value>) -> UnitEvent {
    let (unit_id, work) = posted(script, task_id, range_index);
    UnitEvent::for_work(
        unit_id,
        &work,
        UnitReport::Success(UnitOutput { data, data_type: work.data_type }),
    )
}

pub fn fail(script: &SharedScript, task_id: TaskId, range_index: usize, message: &str) -> UnitEvent {
    let (unit_id, work) = posted(script, task_id, range_index);
    UnitEvent::for_work(
        unit_id,
        &work,
        UnitReport::Failure(UnitFault::new(message).with_location("scripted").with_line(1)),
    )
}
