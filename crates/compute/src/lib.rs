pub mod aggregate;
pub mod cache;
pub mod error_log;
pub mod helpers;
pub mod partition;
pub mod pool;
pub mod runtime;
pub mod scheduler;
pub mod unit;

pub use aggregate::TaskOutput;
pub use error_log::{ErrorLog, ErrorRecord};
pub use partition::{partition, IndexRange, MAX_RANGES};
pub use runtime::{ControlEvent, Runtime};
pub use scheduler::{
    PoolSnapshot, Scheduler, SchedulerMetrics, TaskError, TaskHandle, TaskId, TaskRequest,
    TaskResult, UnitId,
};
pub use unit::{ExecutionUnit, UnitEvent, UnitFactory, UnitOutput, UnitReport, UnitSpawnError, UnitWork};
