//! Notebook-level integration scenarios exercised through the public
//! `NotebookEngine` API, the way a collaborator's REPL session would drive it.

use linecalc_core::{Decimal, Value};
use linecalc_rt::NotebookEngine;
use rust_decimal_macros::dec;

fn run(lines: &[&str]) -> NotebookEngine {
    let mut engine = NotebookEngine::new("UTC");
    for (i, line) in lines.iter().enumerate() {
        engine.insert_line(i, line.to_string());
    }
    engine
}

fn number_at(engine: &NotebookEngine, index: usize) -> Decimal {
    match engine.get_lines()[index].result.as_ref().unwrap().as_ref().unwrap() {
        Value::Number { value, .. } => *value,
        other => panic!("expected Number at line {index}, got {other:?}"),
    }
}

fn quantity_at(engine: &NotebookEngine, index: usize) -> (Decimal, String) {
    match engine.get_lines()[index].result.as_ref().unwrap().as_ref().unwrap() {
        Value::Quantity { value, dimensions } => {
            (*value, dimensions.simple_unit().unwrap_or_default().to_string())
        }
        other => panic!("expected Quantity at line {index}, got {other:?}"),
    }
}

#[test]
fn reassignment_does_not_retroactively_change_dependents() {
    let engine = run(&["x=10", "y=x*2", "x=5", "y"]);
    assert_eq!(number_at(&engine, 0), dec!(10));
    assert_eq!(number_at(&engine, 1), dec!(20));
    assert_eq!(number_at(&engine, 2), dec!(5));
    assert_eq!(number_at(&engine, 3), dec!(20));
}

#[test]
fn unit_conversion_cm_to_meters() {
    let engine = run(&["100 cm in meters"]);
    let (value, unit) = quantity_at(&engine, 0);
    assert_eq!(value, dec!(1));
    assert_eq!(unit, "meters");
}

#[test]
fn date_difference_in_days() {
    let engine = run(&["d1=01.01.2025", "d2=25.12.2024", "d1-d2 in days"]);
    let (value, unit) = quantity_at(&engine, 2);
    assert_eq!(value, dec!(7));
    assert_eq!(unit, "days");
}

#[test]
fn aggregate_window_excludes_line_replaced_with_non_numeric_markup() {
    let with_number = run(&["10", "20", "30", "agg | sum"]);
    assert_eq!(number_at(&with_number, 3), dec!(60));

    let with_markup = run(&["10", "20", "**bold**", "agg | sum"]);
    assert_eq!(number_at(&with_markup, 3), dec!(30));
}

#[test]
fn compound_duration_literal_and_conversion() {
    let engine = run(&["1h30min", "1h30min to minutes"]);
    let (value, unit) = quantity_at(&engine, 0);
    assert_eq!(value, dec!(1.5));
    assert_eq!(unit, "h");
    let (value, unit) = quantity_at(&engine, 1);
    assert_eq!(value, dec!(90));
    assert_eq!(unit, "minutes");
}

#[test]
fn pipe_into_partially_applied_function() {
    let engine = run(&["add(a,b)=a+b", "add5=add(5)", "5 | add5"]);
    assert_eq!(number_at(&engine, 2), dec!(10));
}

#[test]
fn decimal_addition_is_commutative_and_exact() {
    let engine = run(&["0.1 + 0.2", "0.2 + 0.1"]);
    assert_eq!(number_at(&engine, 0), dec!(0.3));
    assert_eq!(number_at(&engine, 1), dec!(0.3));
}

#[test]
fn temperature_round_trip_is_exact() {
    let engine = run(&["0 celsius in fahrenheit", "32 fahrenheit in celsius"]);
    let (value, _) = quantity_at(&engine, 0);
    assert_eq!(value, dec!(32));
    let (value, _) = quantity_at(&engine, 1);
    assert_eq!(value, dec!(0));
}

#[test]
fn mutation_isolation_across_recomputation() {
    let mut engine = run(&["a=[]", "push!(a,1)", "a"]);
    assert_eq!(engine.get_lines()[2].result.as_ref().unwrap().as_ref().unwrap().type_name(), "array");

    engine.update_line(0, "a=[]".to_string());
    engine.update_line(0, "a=[]".to_string());
    match engine.get_lines()[2].result.as_ref().unwrap().as_ref().unwrap() {
        Value::Array(arr) => assert_eq!(arr.borrow().len(), 1),
        other => panic!("expected Array, got {other:?}"),
    }
}
