//! Task registry and dispatcher.
//!
//! A [`Scheduler`] partitions each submitted task into ranges, offers them
//! to the pool, tracks per-range completion, and settles the task's
//! [`TaskHandle`] once every range has reported or one has failed.

pub mod metrics;
pub mod runner;
pub mod task;
pub mod types;

pub use metrics::SchedulerMetrics;
pub use runner::Scheduler;
pub use task::{TaskError, TaskHandle, TaskResult};
pub use types::{PoolSnapshot, TaskId, TaskRequest, UnitId};
