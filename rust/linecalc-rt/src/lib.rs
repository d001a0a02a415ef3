//! Evaluator, built-ins, date/timezone handling, and the notebook engine.
//!
//! `linecalc-lang` turns source text into an AST; this crate gives that AST
//! meaning, owns the runtime value semantics that aren't purely structural
//! (dates, currency, mutation), and threads per-notebook state across lines.

pub mod builtins;
pub mod date;
pub mod error;
pub mod eval;
pub mod notebook;

pub use date::{SystemTimeSource, TimeSource};
pub use error::EvalError;
pub use eval::{call_value, display, evaluate, CurrencyRate, EvaluationContext, LineOutcome};
pub use notebook::{LineState, NotebookEngine};
