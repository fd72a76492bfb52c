use tokio::runtime::Handle;

use super::{ExecutionUnit, UnitEvent, UnitEventSender, UnitFactory, UnitSpawnError, UnitWork};
use crate::scheduler::types::UnitId;

/// Unit without a dedicated thread, used when no multi-unit primitive is
/// available (`legacy = true`).
///
/// Work runs on tokio's blocking pool when a runtime is present, otherwise
/// on the caller's thread. Either way the result arrives as an event.
pub struct InlineUnit {
    id: UnitId,
    events: UnitEventSender,
}

impl ExecutionUnit for InlineUnit {
    fn id(&self) -> UnitId {
        self.id
    }

    fn post(&mut self, work: UnitWork) {
        let id = self.id;
        let events = self.events.clone();
        let job = move || {
            let report = work.run();
            let _ = events.send(UnitEvent::for_work(id, &work, report));
        };
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => job(),
        }
    }

    fn terminate(&mut self) {}
}

pub struct InlineUnitFactory {
    events: UnitEventSender,
}

impl InlineUnitFactory {
    pub fn new(events: UnitEventSender) -> Self {
        Self { events }
    }
}

impl UnitFactory for InlineUnitFactory {
    type Unit = InlineUnit;

    fn spawn(&mut self, id: UnitId) -> Result<InlineUnit, UnitSpawnError> {
        Ok(InlineUnit {
            id,
            events: self.events.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use wheelhouse_core::{Operator, Reducer};

    use super::*;
    use crate::partition::IndexRange;
    use crate::unit::{UnitOutput, UnitReport};

    #[test]
    fn runs_synchronously_without_runtime() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut unit = InlineUnitFactory::new(tx).spawn(0).unwrap();
        unit.post(UnitWork {
            task_id: 4,
            range_index: 0,
            range: IndexRange { start: 0, end: 1 },
            offset: 0,
            operator: Arc::new(Operator::Reduce { reducer: Reducer::Max }),
            slice: vec![json!(2), json!(8)],
            params: Arc::new(Value::Null),
            data_type: None,
        });
        let event = rx.try_recv().unwrap();
        assert_eq!(
            event.report,
            UnitReport::Success(UnitOutput { data: vec![json!(8)], data_type: None })
        );
    }
}
