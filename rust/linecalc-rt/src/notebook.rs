//! The notebook engine: an ordered sequence of lines sharing
//! one cumulative environment, with incremental recomputation restricted to
//! the first changed line and everything after it.

use crate::date::TimeSource;
use crate::error::EvalError;
use crate::eval::{self, EvaluationContext, LineOutcome};
use linecalc_core::ast::Line;
use linecalc_core::{Environment, Value};
use std::rc::Rc;

/// One notebook line: its source text, last parse/eval outcome, and the
/// environment snapshot needed to resume recomputation from the line after
/// it without replaying everything from the top.
#[derive(Clone)]
pub struct LineState {
    pub source: String,
    pub parsed: Result<Line, EvalError>,
    pub result: Result<Option<Value>, EvalError>,
    pub assigned: Option<(String, Value)>,
    env_after: Environment,
    prev_after: Option<Value>,
    window_after: Vec<Value>,
}

impl LineState {
    fn blank(source: String) -> Self {
        Self {
            source,
            parsed: Ok(Line::Empty),
            result: Ok(None),
            assigned: None,
            env_after: Environment::new(),
            prev_after: None,
            window_after: Vec::new(),
        }
    }
}

pub struct NotebookEngine {
    lines: Vec<LineState>,
    ctx: EvaluationContext,
}

impl NotebookEngine {
    pub fn new(system_timezone: impl Into<String>) -> Self {
        Self {
            lines: Vec::new(),
            ctx: EvaluationContext::new(system_timezone),
        }
    }

    pub fn with_time_source(system_timezone: impl Into<String>, time_source: Rc<dyn TimeSource>) -> Self {
        Self {
            lines: Vec::new(),
            ctx: EvaluationContext::with_time_source(system_timezone, time_source),
        }
    }

    pub fn context_mut(&mut self) -> &mut EvaluationContext {
        &mut self.ctx
    }

    pub fn get_lines(&self) -> &[LineState] {
        &self.lines
    }

    pub fn get_variables(&self) -> &Environment {
        &self.ctx.env
    }

    pub fn insert_line(&mut self, index: usize, source: String) {
        let idx = index.min(self.lines.len());
        self.lines.insert(idx, LineState::blank(source));
        self.recompute_from(idx);
    }

    pub fn delete_line(&mut self, index: usize) {
        if index < self.lines.len() {
            self.lines.remove(index);
            self.recompute_from(index);
        }
    }

    pub fn update_line(&mut self, index: usize, source: String) {
        if let Some(line) = self.lines.get_mut(index) {
            line.source = source;
            self.recompute_from(index);
        }
    }

    /// Replace a contiguous run of lines starting at `index` (appending past
    /// the current end if needed), then recompute from the first of them.
    pub fn update_lines(&mut self, index: usize, sources: Vec<String>) {
        if sources.is_empty() {
            return;
        }
        for (offset, src) in sources.into_iter().enumerate() {
            let i = index + offset;
            if i < self.lines.len() {
                self.lines[i].source = src;
            } else {
                self.lines.push(LineState::blank(src));
            }
        }
        self.recompute_from(index);
    }

    /// Re-evaluate lines `[from, end)`, resuming from the environment/window
    /// snapshot trailing line `from - 1` rather than replaying the whole
    /// notebook.
    fn recompute_from(&mut self, from: usize) {
        let (env, mut prev, mut window) = if from == 0 {
            (Environment::new(), None, Vec::new())
        } else {
            let prior = &self.lines[from - 1];
            (prior.env_after.clone(), prior.prev_after.clone(), prior.window_after.clone())
        };
        self.ctx.env = env;

        for i in from..self.lines.len() {
            let source = self.lines[i].source.clone();
            let parsed = linecalc_lang::parse_line(&source).map_err(EvalError::from);

            let (result, assigned) = match &parsed {
                Ok(line) => {
                    // Comments delimit the aggregate window:
                    // `total`/`average`/`agg` only see results since the last
                    // comment line.
                    if matches!(line, Line::Comment) {
                        window.clear();
                    }
                    match eval::evaluate(line, &mut self.ctx, prev.as_ref(), &window) {
                        Ok(LineOutcome { value, assigned }) => {
                            if let Some(v) = &value {
                                window.push(v.clone());
                                prev = Some(v.clone());
                            }
                            (Ok(value), assigned)
                        }
                        Err(e) => (Err(e), None),
                    }
                }
                Err(e) => (Err(e.clone()), None),
            };

            let line = &mut self.lines[i];
            line.parsed = parsed;
            line.result = result;
            line.assigned = assigned;
            line.env_after = self.ctx.env.clone();
            line.prev_after = prev.clone();
            line.window_after = window.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linecalc_core::Decimal;
    use rust_decimal_macros::dec;

    fn as_number(v: &Value) -> Decimal {
        match v {
            Value::Number { value, .. } => *value,
            other => panic!("expected Number, got {other:?}"),
        }
    }

    #[test]
    fn test_update_line_only_recomputes_from_that_point() {
        let mut nb = NotebookEngine::new("UTC");
        nb.insert_line(0, "a = 1".to_string());
        nb.insert_line(1, "b = a + 1".to_string());
        nb.insert_line(2, "c = b + 1".to_string());
        assert_eq!(as_number(nb.get_lines()[2].result.as_ref().unwrap().as_ref().unwrap()), dec!(3));

        nb.update_line(0, "a = 10".to_string());
        assert_eq!(as_number(nb.get_lines()[1].result.as_ref().unwrap().as_ref().unwrap()), dec!(11));
        assert_eq!(as_number(nb.get_lines()[2].result.as_ref().unwrap().as_ref().unwrap()), dec!(12));
    }

    #[test]
    fn test_comment_resets_aggregate_window() {
        let mut nb = NotebookEngine::new("UTC");
        nb.insert_line(0, "1".to_string());
        nb.insert_line(1, "2".to_string());
        nb.insert_line(2, "# reset".to_string());
        nb.insert_line(3, "3".to_string());
        nb.insert_line(4, "total".to_string());
        let total = nb.get_lines()[4].result.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(as_number(total), dec!(3));
    }

    #[test]
    fn test_delete_line_recomputes_remaining() {
        let mut nb = NotebookEngine::new("UTC");
        nb.insert_line(0, "a = 1".to_string());
        nb.insert_line(1, "b = 2".to_string());
        nb.insert_line(2, "c = a + b".to_string());
        assert_eq!(as_number(nb.get_lines()[2].result.as_ref().unwrap().as_ref().unwrap()), dec!(3));

        nb.delete_line(1);
        let err = nb.get_lines()[1].result.as_ref().unwrap_err();
        assert!(matches!(err, EvalError::UndefinedVariable(name) if name == "b"));
    }

    #[test]
    fn test_variables_persist_across_lines() {
        let mut nb = NotebookEngine::new("UTC");
        nb.insert_line(0, "x = 5".to_string());
        nb.insert_line(1, "y = x * 2".to_string());
        assert_eq!(as_number(nb.get_variables().get("y").unwrap()), dec!(10));
    }

    #[test]
    fn test_parse_error_does_not_poison_later_lines() {
        let mut nb = NotebookEngine::new("UTC");
        nb.insert_line(0, "a = 1".to_string());
        nb.insert_line(1, "@@@ not valid".to_string());
        nb.insert_line(2, "b = a + 1".to_string());
        assert!(nb.get_lines()[1].result.is_err());
        assert_eq!(as_number(nb.get_lines()[2].result.as_ref().unwrap().as_ref().unwrap()), dec!(2));
    }
}
