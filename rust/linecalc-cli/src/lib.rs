//! Shared library half of the `linecalc` binary: config loading, the REPL,
//! and the demonstration currency table.

pub mod config;
pub mod currency;
pub mod repl;
