//! Interactive REPL: one persistent `NotebookEngine`, one line in, one
//! result out.

use linecalc_rt::{EvalError, NotebookEngine};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn gray(s: &str) -> String {
    format!("\x1b[90m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn history_path() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    let mut path = PathBuf::from(home);
    path.push(".linecalc");
    path.push("repl_history");
    Some(path)
}

fn new_engine(precision: u32, system_timezone: &str, debug: bool) -> NotebookEngine {
    let mut engine = NotebookEngine::new(system_timezone.to_string());
    let ctx = engine.context_mut();
    ctx.precision = linecalc_core::PrecisionConfig::new(precision);
    ctx.debug_mode = debug;
    ctx.currency_rate = Some(crate::currency::static_rate_table());
    engine
}

pub fn run_repl(precision: u32, system_timezone: String, debug: bool) {
    println!("{}", bold("linecalc"));
    println!("{}", gray("Type :help for commands, :quit to exit."));

    let mut rl = DefaultEditor::new().expect("failed to create line editor");
    let history_path = history_path();
    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    let mut engine = new_engine(precision, &system_timezone, debug);

    loop {
        match rl.readline(&format!("{} ", green("linecalc>"))) {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match trimmed {
                    ":quit" | ":q" => break,
                    ":help" | ":h" => {
                        print_help();
                        continue;
                    }
                    ":reset" | ":r" => {
                        engine = new_engine(precision, &system_timezone, debug);
                        println!("{}", gray("session reset."));
                        continue;
                    }
                    _ => {}
                }
                let index = engine.get_lines().len();
                engine.insert_line(index, line.clone());
                print_line_result(&engine, index, debug);
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", gray("(Ctrl-C to exit)"));
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{} {err:?}", red("Error:"));
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(path);
    }
    println!("{}", cyan("Goodbye!"));
}

fn print_line_result(engine: &NotebookEngine, index: usize, debug: bool) {
    let Some(line) = engine.get_lines().get(index) else {
        return;
    };
    match &line.result {
        Ok(Some(v)) => println!("{}", linecalc_rt::display(v)),
        Ok(None) => {}
        Err(e) => print_error(e, debug),
    }
}

/// Error recovery as "downgrade to comment": in normal mode a failing line
/// just looks like a quiet placeholder; `--debug` shows why.
fn print_error(e: &EvalError, debug: bool) {
    if debug {
        eprintln!("{} {e}", red("Error:"));
    } else {
        println!("{}", gray(&format!("# {e}")));
    }
}

fn print_help() {
    println!("{}", bold("Commands"));
    println!("  :help, :h     show this message");
    println!("  :reset, :r    discard the session and start over");
    println!("  :quit, :q     exit");
    println!();
    println!("{}", bold("Language"));
    println!("  x = 10                assignment");
    println!("  add(a, b) = a + b     function definition");
    println!("  100 cm in meters      unit conversion");
    println!("  01.01.2025 - today    date arithmetic");
    println!("  10 | add5             pipe into a partially applied function");
}
