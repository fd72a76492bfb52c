//! Thin wrappers over [`Runtime::submit`] for common one-shot jobs.

use serde_json::Value;
use wheelhouse_core::{DataType, Expr, Operator};

use crate::aggregate::TaskOutput;
use crate::runtime::Runtime;
use crate::scheduler::task::TaskError;
use crate::scheduler::types::TaskRequest;

impl Runtime {
    /// Evaluate `expr` for every element of `input` across `threads` units.
    /// The result keeps input order.
    pub async fn map(
        &self,
        input: Vec<Value>,
        expr: Expr,
        threads: usize,
        data_type: Option<DataType>,
    ) -> Result<TaskOutput, TaskError> {
        let mut request = TaskRequest::new(Operator::Map { expr })
            .input(input)
            .threads(threads);
        request.data_type = data_type;
        self.submit(request)?.await
    }

    /// Parse `text` as JSON on a unit.
    pub async fn parse_json(&self, text: &str) -> Result<Value, TaskError> {
        let request = TaskRequest::new(Operator::ParseJson).params(Value::String(text.to_string()));
        let output = self.submit(request)?.await?;
        Ok(output.into_values().into_iter().next().unwrap_or(Value::Null))
    }

    /// Serialize `value` to a JSON string on a unit.
    pub async fn stringify_json(&self, value: &Value) -> Result<String, TaskError> {
        let request = TaskRequest::new(Operator::StringifyJson).params(value.clone());
        let output = self.submit(request)?.await?;
        match output.into_values().into_iter().next() {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Ok(other.to_string()),
            None => Ok(String::new()),
        }
    }
}
