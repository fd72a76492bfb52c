//! Closed, serializable description of the work a unit performs on its range.
//!
//! An [`Operator`] is what crosses the isolation boundary instead of
//! executable code: units receive it together with their slice of the input
//! and evaluate it with [`Operator::execute`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Fault raised while evaluating an operator inside a unit.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct UnitFault {
    pub message: String,
    /// Line in `location` where the fault occurred, when known.
    pub line: Option<u32>,
    /// Where the fault originated (operator name, panic location, ...).
    pub location: Option<String>,
}

impl UnitFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

// ── Expressions ───────────────────────────────────────────────

/// Numeric expression over the current element `x` and its input index `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    X,
    I,
    Const(f64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Rem(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Abs(Box<Expr>),
    Sqrt(Box<Expr>),
    Floor(Box<Expr>),
    Ceil(Box<Expr>),
    Round(Box<Expr>),
}

impl Expr {
    pub fn constant(c: f64) -> Self {
        Expr::Const(c)
    }

    pub fn add(a: Expr, b: Expr) -> Self {
        Expr::Add(Box::new(a), Box::new(b))
    }

    pub fn sub(a: Expr, b: Expr) -> Self {
        Expr::Sub(Box::new(a), Box::new(b))
    }

    pub fn mul(a: Expr, b: Expr) -> Self {
        Expr::Mul(Box::new(a), Box::new(b))
    }

    pub fn div(a: Expr, b: Expr) -> Self {
        Expr::Div(Box::new(a), Box::new(b))
    }

    pub fn eval(&self, x: f64, i: f64) -> f64 {
        match self {
            Expr::X => x,
            Expr::I => i,
            Expr::Const(c) => *c,
            Expr::Add(a, b) => a.eval(x, i) + b.eval(x, i),
            Expr::Sub(a, b) => a.eval(x, i) - b.eval(x, i),
            Expr::Mul(a, b) => a.eval(x, i) * b.eval(x, i),
            Expr::Div(a, b) => a.eval(x, i) / b.eval(x, i),
            Expr::Rem(a, b) => a.eval(x, i) % b.eval(x, i),
            Expr::Pow(a, b) => a.eval(x, i).powf(b.eval(x, i)),
            Expr::Min(a, b) => a.eval(x, i).min(b.eval(x, i)),
            Expr::Max(a, b) => a.eval(x, i).max(b.eval(x, i)),
            Expr::Neg(a) => -a.eval(x, i),
            Expr::Abs(a) => a.eval(x, i).abs(),
            Expr::Sqrt(a) => a.eval(x, i).sqrt(),
            Expr::Floor(a) => a.eval(x, i).floor(),
            Expr::Ceil(a) => a.eval(x, i).ceil(),
            Expr::Round(a) => a.eval(x, i).round(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Sum,
    Product,
    Min,
    Max,
    Count,
    Mean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparison {
    fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
        }
    }
}

// ── Operators ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operator {
    /// Copy the assigned slice unchanged.
    Identity,
    /// Evaluate `expr` for every element.
    Map { expr: Expr },
    /// Fold the slice into a single value.
    Reduce { reducer: Reducer },
    /// Keep the elements `x` for which `x <cmp> value` holds.
    Filter { cmp: Comparison, value: Expr },
    /// Ignore the slice and emit `expr(i)` for `i` in `0..count`.
    Generate { count: usize, expr: Expr },
    /// Parse the string in the task params as JSON.
    ParseJson,
    /// Serialize the task params to a JSON string.
    StringifyJson,
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Identity => "identity",
            Operator::Map { .. } => "map",
            Operator::Reduce { .. } => "reduce",
            Operator::Filter { .. } => "filter",
            Operator::Generate { .. } => "generate",
            Operator::ParseJson => "parse_json",
            Operator::StringifyJson => "stringify_json",
        }
    }

    /// Canonical text of the operator, used as its memoization signature.
    pub fn signature(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }

    /// Evaluate against `slice`, whose first element sits at input index `offset`.
    pub fn execute(
        &self,
        slice: &[Value],
        offset: usize,
        params: &Value,
    ) -> Result<Vec<Value>, UnitFault> {
        match self {
            Operator::Identity => Ok(slice.to_vec()),
            Operator::Map { expr } => slice
                .iter()
                .enumerate()
                .map(|(k, v)| {
                    let x = self.numeric(v, offset + k)?;
                    Ok(number_value(expr.eval(x, (offset + k) as f64)))
                })
                .collect(),
            Operator::Filter { cmp, value } => {
                let mut kept = Vec::new();
                for (k, v) in slice.iter().enumerate() {
                    let x = self.numeric(v, offset + k)?;
                    if cmp.holds(x, value.eval(x, (offset + k) as f64)) {
                        kept.push(v.clone());
                    }
                }
                Ok(kept)
            }
            Operator::Reduce { reducer } => self.reduce(*reducer, slice, offset),
            Operator::Generate { count, expr } => Ok((0..*count)
                .map(|i| number_value(expr.eval(i as f64, i as f64)))
                .collect()),
            Operator::ParseJson => {
                let text = params.as_str().ok_or_else(|| {
                    UnitFault::new("parse_json expects a string parameter").with_location(self.name())
                })?;
                serde_json::from_str(text).map(|v| vec![v]).map_err(|e| {
                    UnitFault::new(e.to_string())
                        .with_location(self.name())
                        .with_line(e.line() as u32)
                })
            }
            Operator::StringifyJson => serde_json::to_string(params)
                .map(|s| vec![Value::String(s)])
                .map_err(|e| UnitFault::new(e.to_string()).with_location(self.name())),
        }
    }

    fn numeric(&self, value: &Value, index: usize) -> Result<f64, UnitFault> {
        value.as_f64().ok_or_else(|| {
            UnitFault::new(format!("element {} is not a number: {}", index, value))
                .with_location(self.name())
        })
    }

    fn reduce(&self, reducer: Reducer, slice: &[Value], offset: usize) -> Result<Vec<Value>, UnitFault> {
        if reducer == Reducer::Count {
            return Ok(vec![Value::from(slice.len() as u64)]);
        }
        let nums = slice
            .iter()
            .enumerate()
            .map(|(k, v)| self.numeric(v, offset + k))
            .collect::<Result<Vec<f64>, _>>()?;

        let folded = match reducer {
            Reducer::Sum => Some(nums.iter().sum()),
            Reducer::Product => Some(nums.iter().product()),
            Reducer::Min => nums.iter().copied().reduce(f64::min),
            Reducer::Max => nums.iter().copied().reduce(f64::max),
            Reducer::Mean if nums.is_empty() => None,
            Reducer::Mean => Some(nums.iter().sum::<f64>() / nums.len() as f64),
            Reducer::Count => Some(nums.len() as f64),
        };
        Ok(folded.map(number_value).into_iter().collect())
    }
}

/// JSON number for `x`; integral values stay integral, non-finite become `null`.
pub fn number_value(x: f64) -> Value {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 9.0e15 {
        Value::from(x as i64)
    } else {
        serde_json::Number::from_f64(x)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
