//! Append-only audit trail of unit failures.

use chrono::{DateTime, Utc};
use serde::Serialize;
use wheelhouse_core::UnitFault;

use crate::scheduler::types::{TaskId, UnitId};

/// One recorded unit failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub unit_id: UnitId,
    pub task_id: TaskId,
    pub range_index: usize,
    pub message: String,
}

impl ErrorRecord {
    pub fn from_fault(unit_id: UnitId, task_id: TaskId, range_index: usize, fault: &UnitFault) -> Self {
        let line = fault
            .line
            .map(|l| l.to_string())
            .unwrap_or_else(|| "?".to_string());
        let location = fault.location.as_deref().unwrap_or("unknown");
        Self {
            timestamp: Utc::now(),
            unit_id,
            task_id,
            range_index,
            message: format!(
                "Error unit #{}: Line {} in {}: {}",
                unit_id, line, location, fault.message
            ),
        }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (task {}, range {})", self.message, self.task_id, self.range_index)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ErrorLog {
    records: Vec<ErrorRecord>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: ErrorRecord) {
        self.records.push(entry);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&ErrorRecord> {
        self.records.last()
    }

    pub fn to_vec(&self) -> Vec<ErrorRecord> {
        self.records.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_format() {
        let fault = UnitFault::new("boom").with_location("map").with_line(3);
        let record = ErrorRecord::from_fault(2, 7, 1, &fault);
        assert_eq!(record.message, "Error unit #2: Line 3 in map: boom");
        assert_eq!(record.task_id, 7);
    }

    #[test]
    fn unknown_location() {
        let record = ErrorRecord::from_fault(0, 0, 0, &UnitFault::new("x"));
        assert_eq!(record.message, "Error unit #0: Line ? in unknown: x");
    }

    #[test]
    fn appends_in_order() {
        let mut log = ErrorLog::new();
        assert!(log.is_empty());
        log.record(ErrorRecord::from_fault(1, 1, 0, &UnitFault::new("first")));
        log.record(ErrorRecord::from_fault(2, 1, 1, &UnitFault::new("second")));
        let units: Vec<_> = log.iter().map(|r| r.unit_id).collect();
        assert_eq!(units, vec![1, 2]);
        assert_eq!(log.last().map(|r| r.range_index), Some(1));
    }
}
