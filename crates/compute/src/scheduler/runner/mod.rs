//! Task registry and dispatcher.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, and accessor methods
//! - `scheduling`: submission, memoization lookup, and range dispatch
//! - `execution`: unit reports, settling, and pending queue service

mod core;
mod execution;
mod scheduling;

pub use self::core::Scheduler;
