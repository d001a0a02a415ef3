//! Value model and decimal/dimension arithmetic for the linecalc language.
//!
//! This crate has no notion of syntax or evaluation; it only defines the
//! runtime shape of values (`Value`), the arbitrary-precision numeric type
//! (`Decimal`, re-exported from `rust_decimal`), and the dimension/unit
//! algebra that backs `Value::Quantity`.

pub mod ast;
pub mod dimension;
pub mod error;
pub mod precision;
pub mod tz_names;
pub mod units;
pub mod value;

pub use dimension::{Dimension, DimensionMap};
pub use error::CoreError;
pub use precision::PrecisionConfig;
pub use rust_decimal::Decimal;
pub use value::{Callable, Environment, FunctionDef, NumberFormat, Value};
