//! `linecalc`: REPL, file runner, and one-shot expression evaluator.

use clap::{Parser, Subcommand};
use linecalc_cli::{config::Config, currency, repl};
use linecalc_rt::{EvaluationContext, NotebookEngine};
use std::path::PathBuf;

fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}

#[derive(Parser)]
#[command(
    name = "linecalc",
    version,
    about = "A line-oriented calculator language with units, dates, and notebook recomputation"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Evaluate an expression directly; repeatable, one result printed per line.
    #[arg(short = 'e', long = "eval")]
    eval: Vec<String>,

    /// Evaluate every line of a file and print only its last non-empty result.
    #[arg(short = 'o', long = "output-file")]
    output_file: Option<PathBuf>,

    /// Surface evaluation errors inline instead of downgrading them to comments.
    #[arg(long)]
    debug: bool,

    /// Override the configured precision (0-20 significant digits).
    #[arg(long)]
    precision: Option<u32>,

    /// Path to a linecalc.toml config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Value exposed to the `arg()` built-in.
    #[arg(long = "arg")]
    cli_arg: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive REPL (the default when no other mode is given).
    Repl,
    /// Evaluate every line of a file and print each non-comment result.
    Run {
        /// Path to a source file, one notebook line per line of text.
        file: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => fail(&e.to_string()),
    };
    let precision = cli.precision.unwrap_or(config.precision);
    let system_timezone = config.resolved_timezone();

    if !cli.eval.is_empty() {
        run_eval_mode(&cli.eval, precision, &system_timezone, cli.debug, cli.cli_arg.clone());
        return;
    }
    if let Some(output_file) = cli.output_file.clone() {
        run_output_file_mode(&output_file, precision, &system_timezone, cli.debug, cli.cli_arg.clone());
        return;
    }

    match cli.command {
        Some(Commands::Run { file }) => run_file_mode(&file, precision, &system_timezone, cli.debug, cli.cli_arg),
        Some(Commands::Repl) | None => repl::run_repl(precision, system_timezone, cli.debug),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{} {message}", red("Error:"));
    std::process::exit(1);
}

fn configure(ctx: &mut EvaluationContext, precision: u32, debug: bool, cli_arg: Option<String>) {
    ctx.precision = linecalc_core::PrecisionConfig::new(precision);
    ctx.debug_mode = debug;
    ctx.currency_rate = Some(currency::static_rate_table());
    ctx.cli_arg = cli_arg;
}

/// `-e expr` (repeatable): each expression is its own notebook line, sharing
/// one environment; one result printed per line.
fn run_eval_mode(exprs: &[String], precision: u32, system_timezone: &str, debug: bool, cli_arg: Option<String>) {
    let mut engine = NotebookEngine::new(system_timezone.to_string());
    configure(engine.context_mut(), precision, debug, cli_arg);

    let mut had_error = false;
    for (i, expr) in exprs.iter().enumerate() {
        engine.insert_line(i, expr.clone());
        match &engine.get_lines()[i].result {
            Ok(Some(v)) => println!("{}", linecalc_rt::display(v)),
            Ok(None) => {}
            Err(e) => {
                eprintln!("{} {e}", red("Error:"));
                had_error = true;
            }
        }
    }
    if had_error {
        std::process::exit(1);
    }
}

/// `linecalc run <file>`: print every non-comment line's result.
fn run_file_mode(path: &PathBuf, precision: u32, system_timezone: &str, debug: bool, cli_arg: Option<String>) {
    let source = std::fs::read_to_string(path).unwrap_or_else(|e| fail(&format!("cannot read '{}': {e}", path.display())));
    let mut engine = NotebookEngine::new(system_timezone.to_string());
    configure(engine.context_mut(), precision, debug, cli_arg);

    let mut had_error = false;
    for (i, line) in source.lines().enumerate() {
        engine.insert_line(i, line.to_string());
        match &engine.get_lines()[i].result {
            Ok(Some(v)) => println!("{}", linecalc_rt::display(v)),
            Ok(None) => {}
            Err(e) => {
                eprintln!("{} line {}: {e}", red("Error:"), i + 1);
                had_error = true;
            }
        }
    }
    if had_error {
        std::process::exit(1);
    }
}

/// `-o <file>`: evaluate every line, print only the last non-empty result.
fn run_output_file_mode(path: &PathBuf, precision: u32, system_timezone: &str, debug: bool, cli_arg: Option<String>) {
    let source = std::fs::read_to_string(path).unwrap_or_else(|e| fail(&format!("cannot read '{}': {e}", path.display())));
    let mut engine = NotebookEngine::new(system_timezone.to_string());
    configure(engine.context_mut(), precision, debug, cli_arg);

    let mut last = None;
    for (i, line) in source.lines().enumerate() {
        engine.insert_line(i, line.to_string());
        match &engine.get_lines()[i].result {
            Ok(Some(v)) => last = Some(linecalc_rt::display(v)),
            Ok(None) => {}
            Err(e) => fail(&e.to_string()),
        }
    }
    if let Some(v) = last {
        println!("{v}");
    }
}
