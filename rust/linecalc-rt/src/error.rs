//! Evaluator-level errors: name resolution, type/shape, domain,
//! plus the lex/parse errors forwarded unchanged from `linecalc-lang`.

use linecalc_core::CoreError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("lex error: {0}")]
    Lex(String),
    #[error("parse error: {0}")]
    Parse(String),

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("undefined function '{0}'")]
    UndefinedFunction(String),
    #[error("'{0}' is a reserved name and cannot be assigned")]
    ReservedName(String),

    #[error("expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },
    #[error("cannot index into {0}")]
    NotIndexable(String),
    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("object has no field '{0}'")]
    NoSuchField(String),
    #[error("value is not callable: {0}")]
    NotCallable(String),
    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("{0}")]
    Domain(#[from] CoreError),
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("currency rate unavailable for {from} -> {to}")]
    NoCurrencyRate { from: String, to: String },

    #[error("recursion limit exceeded ({0} frames)")]
    RecursionLimit(usize),
    #[error("aggregate window is empty")]
    EmptyAggregateWindow,
    #[error("expected an integer, got a non-integer value")]
    NonIntegerConversion,
    #[error("a piped value cannot be applied directly to a lambda expression; call it first")]
    PipeLambdaDirect,

    #[error("{0}")]
    Other(String),
}

impl From<linecalc_lang::LexError> for EvalError {
    fn from(e: linecalc_lang::LexError) -> Self {
        EvalError::Lex(e.to_string())
    }
}

impl From<linecalc_lang::ParseError> for EvalError {
    fn from(e: linecalc_lang::ParseError) -> Self {
        EvalError::Parse(e.to_string())
    }
}
