//! Memoization cache for settled task results.
//!
//! Unbounded and never evicted: entries live as long as the scheduler.

use std::collections::HashMap;

use serde_json::Value;
use wheelhouse_core::{DataType, Operator};

use crate::aggregate::TaskOutput;

/// `(operator, input, data type)` signature of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operator: String,
    input: String,
    data_type: Option<DataType>,
}

impl CacheKey {
    /// Build a key. The input component covers both the array input and the
    /// auxiliary params, compared by value.
    pub fn new(
        operator: &Operator,
        input: Option<&[Value]>,
        params: &Value,
        data_type: Option<DataType>,
    ) -> Self {
        let input = serde_json::to_string(&(input, params)).unwrap_or_default();
        Self {
            operator: operator.signature(),
            input,
            data_type,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoCache {
    entries: HashMap<CacheKey, TaskOutput>,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settled output for `key`. A typed output carries its data type.
    pub fn lookup(&self, key: &CacheKey) -> Option<&TaskOutput> {
        self.entries.get(key)
    }

    pub fn store(&mut self, key: CacheKey, output: TaskOutput) {
        self.entries.insert(key, output);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
