use thiserror::Error;

/// Domain errors raised by decimal arithmetic and dimension algebra.
///
/// These correspond to the "domain" category of the error taxonomy;
/// lexing, parsing and evaluator-level errors live in their own crates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("incompatible dimensions: {left} and {right}")]
    IncompatibleDimensions { left: String, right: String },
    #[error("unknown unit '{0}'")]
    InvalidUnit(String),
    #[error("cannot convert {value} to {target}: not an integer")]
    NonIntegerConversion { value: String, target: String },
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}
