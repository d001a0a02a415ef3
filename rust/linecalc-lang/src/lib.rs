//! Lexer and parser for the linecalc expression language.
//!
//! This crate owns tokenization and grammar only; the AST it produces
//! (`linecalc_core::ast`) and the values it ultimately evaluates to live one
//! layer down, in `linecalc-core`, so that crate can be shared without this
//! one's syntax concerns.

pub mod lexer;
pub mod parser;
pub mod tokens;

pub use lexer::LexError;
pub use parser::ParseError;

use linecalc_core::ast::Line;

/// Parse a single notebook line into its AST form. Lines are always
/// single-statement, so this is the one entry point callers need.
pub fn parse_line(source: &str) -> Result<Line, ParseError> {
    parser::Parser::parse_line(source)
}
