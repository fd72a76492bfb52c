use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WheelhouseError;
use crate::operator::number_value;

// ── Data types ────────────────────────────────────────────────

/// Fixed-width numeric element kinds a unit output can be materialized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl DataType {
    pub const ALL: [DataType; 9] = [
        DataType::Int8,
        DataType::Uint8,
        DataType::Uint8Clamped,
        DataType::Int16,
        DataType::Uint16,
        DataType::Int32,
        DataType::Uint32,
        DataType::Float32,
        DataType::Float64,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            DataType::Int8 => "int8",
            DataType::Uint8 => "uint8",
            DataType::Uint8Clamped => "uint8clamped",
            DataType::Int16 => "int16",
            DataType::Uint16 => "uint16",
            DataType::Int32 => "int32",
            DataType::Uint32 => "uint32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// Parse an optional tag. `na` and the empty string mean "no data type".
    pub fn parse_tag(tag: &str) -> Result<Option<DataType>, WheelhouseError> {
        let t = tag.trim();
        if t.is_empty() || t.eq_ignore_ascii_case("na") {
            return Ok(None);
        }
        t.parse().map(Some)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DataType {
    type Err = WheelhouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        DataType::ALL
            .iter()
            .copied()
            .find(|dt| dt.tag() == lower)
            .ok_or_else(|| WheelhouseError::UnknownTag {
                kind: "data type",
                value: s.to_string(),
            })
    }
}

// ── Numeric conversion ────────────────────────────────────────

/// Numeric reading of a value, as a typed-array store would see it.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Null => 0.0,
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                0.0
            } else {
                t.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Truncate toward zero and wrap modulo 2^bits. Non-finite input maps to 0.
fn wrap_unsigned(n: f64, bits: i32) -> u64 {
    if !n.is_finite() {
        return 0;
    }
    let modulus = 2f64.powi(bits);
    n.trunc().rem_euclid(modulus) as u64
}

fn wrap_signed(n: f64, bits: i32) -> i64 {
    let unsigned = wrap_unsigned(n, bits) as i64;
    let half = 1i64 << (bits - 1);
    if unsigned >= half {
        unsigned - (half << 1)
    } else {
        unsigned
    }
}

/// Clamp to [0, 255] rounding half to even.
fn clamp_u8(n: f64) -> u8 {
    if n.is_nan() || n <= 0.0 {
        return 0;
    }
    if n >= 255.0 {
        return 255;
    }
    let floor = n.floor();
    let diff = n - floor;
    let rounded = if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if floor % 2.0 == 0.0 {
        floor
    } else {
        floor + 1.0
    };
    rounded as u8
}

// ── Typed arrays ──────────────────────────────────────────────

/// A fixed-width numeric buffer of a single [`DataType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "data_type", content = "data", rename_all = "lowercase")]
pub enum TypedArray {
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
    Uint8Clamped(Vec<u8>),
    Int16(Vec<i16>),
    Uint16(Vec<u16>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! each_buffer {
    ($arr:expr, $buf:ident => $body:expr) => {
        match $arr {
            TypedArray::Int8($buf) => $body,
            TypedArray::Uint8($buf) => $body,
            TypedArray::Uint8Clamped($buf) => $body,
            TypedArray::Int16($buf) => $body,
            TypedArray::Uint16($buf) => $body,
            TypedArray::Int32($buf) => $body,
            TypedArray::Uint32($buf) => $body,
            TypedArray::Float32($buf) => $body,
            TypedArray::Float64($buf) => $body,
        }
    };
}

impl TypedArray {
    /// Materialize `values` as a buffer of `data_type`.
    pub fn from_values(data_type: DataType, values: &[Value]) -> Self {
        let nums = values.iter().map(to_number);
        match data_type {
            DataType::Int8 => TypedArray::Int8(nums.map(|n| wrap_signed(n, 8) as i8).collect()),
            DataType::Uint8 => TypedArray::Uint8(nums.map(|n| wrap_unsigned(n, 8) as u8).collect()),
            DataType::Uint8Clamped => TypedArray::Uint8Clamped(nums.map(clamp_u8).collect()),
            DataType::Int16 => TypedArray::Int16(nums.map(|n| wrap_signed(n, 16) as i16).collect()),
            DataType::Uint16 => {
                TypedArray::Uint16(nums.map(|n| wrap_unsigned(n, 16) as u16).collect())
            }
            DataType::Int32 => TypedArray::Int32(nums.map(|n| wrap_signed(n, 32) as i32).collect()),
            DataType::Uint32 => {
                TypedArray::Uint32(nums.map(|n| wrap_unsigned(n, 32) as u32).collect())
            }
            DataType::Float32 => TypedArray::Float32(nums.map(|n| n as f32).collect()),
            DataType::Float64 => TypedArray::Float64(nums.collect()),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            TypedArray::Int8(_) => DataType::Int8,
            TypedArray::Uint8(_) => DataType::Uint8,
            TypedArray::Uint8Clamped(_) => DataType::Uint8Clamped,
            TypedArray::Int16(_) => DataType::Int16,
            TypedArray::Uint16(_) => DataType::Uint16,
            TypedArray::Int32(_) => DataType::Int32,
            TypedArray::Uint32(_) => DataType::Uint32,
            TypedArray::Float32(_) => DataType::Float32,
            TypedArray::Float64(_) => DataType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        each_buffer!(self, buf => buf.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        each_buffer!(self, buf => buf.iter().map(|&x| x as f64).collect())
    }

    /// Elements as JSON values (non-finite floats become `null`).
    pub fn to_values(&self) -> Vec<Value> {
        self.to_f64_vec().into_iter().map(number_value).collect()
    }

    /// Numeric sort, ascending or descending. NaN elements compare equal.
    pub fn sort_numeric(&mut self, descending: bool) {
        each_buffer!(self, buf => buf.sort_by(|a, b| {
            let ord = a.partial_cmp(b).unwrap_or(Ordering::Equal);
            if descending { ord.reverse() } else { ord }
        }))
    }

    pub fn reverse(&mut self) {
        each_buffer!(self, buf => buf.reverse())
    }
}

// ── Sort orders ───────────────────────────────────────────────

/// Post-aggregation ordering.
///
/// `DescAlpha` reverses the current order of the sequence; it is not a
/// lexicographic descending sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    Asc,
    Desc,
    AscAlpha,
    DescAlpha,
}

impl SortOrder {
    pub fn tag(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
            SortOrder::AscAlpha => "ascAlpha",
            SortOrder::DescAlpha => "descAlpha",
        }
    }

    /// Parse an optional tag; `none` and the empty string mean "leave as is".
    pub fn parse_tag(tag: &str) -> Result<Option<SortOrder>, WheelhouseError> {
        let t = tag.trim();
        if t.is_empty() || t.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        t.parse().map(Some)
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for SortOrder {
    type Err = WheelhouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        [SortOrder::Asc, SortOrder::Desc, SortOrder::AscAlpha, SortOrder::DescAlpha]
            .into_iter()
            .find(|o| o.tag().eq_ignore_ascii_case(t))
            .ok_or_else(|| WheelhouseError::UnknownTag {
                kind: "sort order",
                value: s.to_string(),
            })
    }
}
