//! Merge per-range outputs into a task result and apply the sort order.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;
use wheelhouse_core::value::to_number;
use wheelhouse_core::{DataType, SortOrder, TypedArray};

/// Above this many ranges, per-range outputs are returned unmerged.
pub const AGGREGATE_RANGE_LIMIT: usize = 20;

/// Settled value of a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskOutput {
    /// Per-range outputs concatenated in range order.
    Flat(Vec<Value>),
    /// Concatenated outputs materialized as a numeric buffer.
    Typed(TypedArray),
    /// One output per range, in range order. Each range is `Typed` when the
    /// task names a data type, `Flat` otherwise.
    PerRange(Vec<TaskOutput>),
}

impl TaskOutput {
    /// All elements in order, flattening per-range outputs.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            TaskOutput::Flat(v) => v,
            TaskOutput::Typed(arr) => arr.to_values(),
            TaskOutput::PerRange(ranges) => ranges.into_iter().flat_map(TaskOutput::into_values).collect(),
        }
    }

    pub fn as_flat(&self) -> Option<&[Value]> {
        match self {
            TaskOutput::Flat(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_typed(&self) -> Option<&TypedArray> {
        match self {
            TaskOutput::Typed(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_per_range(&self) -> Option<&[TaskOutput]> {
        match self {
            TaskOutput::PerRange(r) => Some(r),
            _ => None,
        }
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.as_typed().map(TypedArray::data_type)
    }
}

/// Merge `outputs` (indexed by range) into one result.
///
/// Unmerged ranges are still materialized as `data_type` one by one.
pub fn aggregate(outputs: Vec<Vec<Value>>, aggregate: bool, data_type: Option<DataType>) -> TaskOutput {
    if !aggregate || outputs.len() > AGGREGATE_RANGE_LIMIT {
        return TaskOutput::PerRange(
            outputs
                .into_iter()
                .map(|range| materialize(range, data_type))
                .collect(),
        );
    }
    materialize(outputs.into_iter().flatten().collect(), data_type)
}

fn materialize(values: Vec<Value>, data_type: Option<DataType>) -> TaskOutput {
    match data_type {
        Some(dt) => TaskOutput::Typed(TypedArray::from_values(dt, &values)),
        None => TaskOutput::Flat(values),
    }
}

/// Apply `order` to an aggregated output. Per-range outputs are left as is.
pub fn sort(output: TaskOutput, order: Option<SortOrder>) -> TaskOutput {
    let Some(order) = order else {
        return output;
    };
    match output {
        TaskOutput::Flat(mut values) => {
            sort_values(&mut values, order);
            TaskOutput::Flat(values)
        }
        TaskOutput::Typed(mut arr) => {
            match order {
                // Typed buffers have no string form; their default sort is numeric.
                SortOrder::Asc | SortOrder::AscAlpha => arr.sort_numeric(false),
                SortOrder::Desc => arr.sort_numeric(true),
                SortOrder::DescAlpha => arr.reverse(),
            }
            TaskOutput::Typed(arr)
        }
        per_range @ TaskOutput::PerRange(_) => per_range,
    }
}

/// Sort a sequence in place.
///
/// `Asc`/`Desc` compare numerically, `AscAlpha` compares string forms, and
/// `DescAlpha` reverses whatever order the sequence is already in.
pub fn sort_values(values: &mut [Value], order: SortOrder) {
    match order {
        SortOrder::Asc => values.sort_by(|a, b| numeric_cmp(a, b)),
        SortOrder::Desc => values.sort_by(|a, b| numeric_cmp(b, a)),
        SortOrder::AscAlpha => values.sort_by_cached_key(alpha_key),
        SortOrder::DescAlpha => values.reverse(),
    }
}

fn numeric_cmp(a: &Value, b: &Value) -> Ordering {
    to_number(a)
        .partial_cmp(&to_number(b))
        .unwrap_or(Ordering::Equal)
}

/// String form of a value for lexicographic ordering.
fn alpha_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) => f.to_string(),
            _ => n.to_string(),
        },
        Value::Array(items) => items.iter().map(alpha_key).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}
