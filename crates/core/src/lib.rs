pub mod config;
pub mod error;
pub mod operator;
pub mod value;

pub use config::PoolConfig;
pub use error::*;
pub use operator::{Comparison, Expr, Operator, Reducer, UnitFault};
pub use value::{DataType, SortOrder, TypedArray};
