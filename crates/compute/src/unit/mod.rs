//! Worker Execution Unit boundary.
//!
//! The scheduler never runs operators itself. It hands [`UnitWork`] to an
//! [`ExecutionUnit`] and later receives exactly one [`UnitEvent`] per posted
//! work item through the channel the unit was built with.

mod inline;
#[cfg(test)]
pub(crate) mod scripted;
mod thread;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use wheelhouse_core::{DataType, Operator, UnitFault};

use crate::partition::IndexRange;
use crate::scheduler::types::{TaskId, UnitId};

pub use inline::{InlineUnit, InlineUnitFactory};
pub use thread::{ThreadUnit, ThreadUnitFactory};

/// Sending half of the channel units report through.
pub type UnitEventSender = mpsc::UnboundedSender<UnitEvent>;

/// Receiving half, drained by the control loop.
pub type UnitEventReceiver = mpsc::UnboundedReceiver<UnitEvent>;

/// Payload for one range of one task.
#[derive(Debug, Clone)]
pub struct UnitWork {
    pub task_id: TaskId,
    pub range_index: usize,
    pub range: IndexRange,
    /// Input index of `slice[0]`.
    pub offset: usize,
    pub operator: Arc<Operator>,
    pub slice: Vec<Value>,
    pub params: Arc<Value>,
    pub data_type: Option<DataType>,
}

impl UnitWork {
    /// Evaluate the payload. Shared by every unit implementation.
    pub fn run(&self) -> UnitReport {
        match self.operator.execute(&self.slice, self.offset, &self.params) {
            Ok(data) => UnitReport::Success(UnitOutput {
                data,
                data_type: self.data_type,
            }),
            Err(fault) => UnitReport::Failure(fault),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitOutput {
    pub data: Vec<Value>,
    pub data_type: Option<DataType>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitReport {
    Success(UnitOutput),
    Failure(UnitFault),
}

/// A unit's single answer to one posted [`UnitWork`].
#[derive(Debug, Clone, PartialEq)]
pub struct UnitEvent {
    pub unit_id: UnitId,
    pub task_id: TaskId,
    pub range_index: usize,
    pub report: UnitReport,
}

impl UnitEvent {
    pub fn for_work(unit_id: UnitId, work: &UnitWork, report: UnitReport) -> Self {
        Self {
            unit_id,
            task_id: work.task_id,
            range_index: work.range_index,
            report,
        }
    }
}

#[derive(Debug, Error)]
pub enum UnitSpawnError {
    #[error("failed to start unit #{id}: {source}")]
    Io {
        id: UnitId,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start unit #{id}: {reason}")]
    Rejected { id: UnitId, reason: String },
}

/// An isolated runner that executes posted work and reports asynchronously.
pub trait ExecutionUnit: Send {
    fn id(&self) -> UnitId;

    /// Hand one payload to the unit. Must not block; the outcome (including a
    /// dead unit) is reported as a [`UnitEvent`].
    fn post(&mut self, work: UnitWork);

    /// Tear the unit down. Work already posted may still report.
    fn terminate(&mut self);
}

/// Creates execution units on demand.
pub trait UnitFactory: Send {
    type Unit: ExecutionUnit;

    fn spawn(&mut self, id: UnitId) -> Result<Self::Unit, UnitSpawnError>;
}
