//! The evaluator: variable/function lookup, arithmetic
//! coercion, unit conversion, control flow, user functions with recursion and
//! partial application, and aggregates over the previous-results window.

use crate::builtins::{self, builtin_arity};
use crate::date;
use crate::error::EvalError;
use linecalc_core::ast::{BinOp, ConvertTarget, Expr, Line, ObjectKey, StringSegment, UnOp};
use linecalc_core::{Callable, Decimal, Dimension, DimensionMap, FunctionDef, PrecisionConfig, Value};
use std::rc::Rc;

/// Recursion cap for user function calls — the only safety
/// valve against runaway recursion in this single-threaded evaluator.
const RECURSION_LIMIT: usize = 1024;

/// A currency conversion source, injected by the caller:
/// this crate never reaches out to a live feed itself.
pub type CurrencyRate = Rc<dyn Fn(&str, &str) -> Option<Decimal>>;

fn hundred() -> Decimal {
    Decimal::from(100)
}

pub struct EvaluationContext {
    pub env: linecalc_core::Environment,
    pub precision: PrecisionConfig,
    pub system_timezone: String,
    pub debug_mode: bool,
    pub currency_rate: Option<CurrencyRate>,
    pub time_source: Rc<dyn date::TimeSource>,
    /// Piped stdin content, preferred by `arg()` over `cli_arg` when both are set.
    pub stdin: Option<String>,
    /// A `--arg`-style CLI value, used by `arg()` when no stdin was captured.
    pub cli_arg: Option<String>,
    call_depth: usize,
}

impl EvaluationContext {
    pub fn new(system_timezone: impl Into<String>) -> Self {
        Self::with_time_source(system_timezone, Rc::new(date::SystemTimeSource))
    }

    pub fn with_time_source(system_timezone: impl Into<String>, time_source: Rc<dyn date::TimeSource>) -> Self {
        Self {
            env: linecalc_core::Environment::new(),
            precision: PrecisionConfig::default(),
            system_timezone: system_timezone.into(),
            debug_mode: false,
            currency_rate: None,
            time_source,
            stdin: None,
            cli_arg: None,
            call_depth: 0,
        }
    }
}

/// Result of evaluating one notebook line: its displayed value (absent for
/// comments/blank lines) and, if it was an assignment or function
/// definition, the name/value now bound in the environment.
#[derive(Debug, Clone)]
pub struct LineOutcome {
    pub value: Option<Value>,
    pub assigned: Option<(String, Value)>,
}

/// Evaluate one parsed line. `history` is the previous-results window the
/// notebook engine maintains for aggregate functions (`total`, `average`,
/// `agg`, ...); `prev` is the immediately preceding line's value.
pub fn evaluate(
    line: &Line,
    ctx: &mut EvaluationContext,
    prev: Option<&Value>,
    history: &[Value],
) -> Result<LineOutcome, EvalError> {
    match line {
        Line::Empty | Line::Comment => Ok(LineOutcome {
            value: None,
            assigned: None,
        }),
        Line::Assignment { name, value, .. } => {
            if matches!(name.to_ascii_lowercase().as_str(), "pi" | "e" | "tau") {
                return Err(EvalError::ReservedName(name.clone()));
            }
            let v = eval_expr(value, ctx, prev, history)?;
            // Deep-clone barrier: the environment keeps its
            // own copy of mutable substructure, so a later `!` mutation on
            // this variable can't be observed through an earlier line's
            // cached display value, or vice versa.
            let stored = v.deep_clone();
            ctx.env.insert(name.clone(), stored.clone());
            if ctx.debug_mode {
                log::debug!("{name} = {}", stored.type_name());
            }
            Ok(LineOutcome {
                value: Some(v),
                assigned: Some((name.clone(), stored)),
            })
        }
        Line::FuncDef {
            name, params, body, ..
        } => {
            if matches!(name.to_ascii_lowercase().as_str(), "pi" | "e" | "tau") {
                return Err(EvalError::ReservedName(name.clone()));
            }
            let captured_env = deep_clone_env(&ctx.env);
            let def = Rc::new(FunctionDef {
                name: Some(name.clone()),
                params: params.clone(),
                body: body.clone(),
                captured_env,
            });
            let v = Value::Function(def);
            ctx.env.insert(name.clone(), v.clone());
            Ok(LineOutcome {
                value: Some(v.clone()),
                assigned: Some((name.clone(), v)),
            })
        }
        Line::Expr(expr) => {
            let v = eval_expr(expr, ctx, prev, history)?;
            Ok(LineOutcome {
                value: Some(v),
                assigned: None,
            })
        }
    }
}

fn deep_clone_env(env: &linecalc_core::Environment) -> linecalc_core::Environment {
    env.iter().map(|(k, v)| (k.clone(), v.deep_clone())).collect()
}

fn eval_expr(
    expr: &Expr,
    ctx: &mut EvaluationContext,
    prev: Option<&Value>,
    history: &[Value],
) -> Result<Value, EvalError> {
    match expr {
        Expr::Number { value, radix, .. } => Ok(Value::Number {
            value: *value,
            format: *radix,
        }),
        Expr::Quantity { value, unit, .. } => {
            let dims = DimensionMap::parse(unit)?;
            Ok(Value::Quantity {
                value: *value,
                dimensions: dims,
            })
        }
        Expr::Percentage { value, .. } => Ok(Value::Percentage { value: *value }),
        Expr::Str(s, _) => Ok(Value::String(s.clone())),
        Expr::StringTemplate(segments, _) => {
            let mut out = String::new();
            for seg in segments {
                match seg {
                    StringSegment::Literal(s) => out.push_str(s),
                    StringSegment::Interpolation(e) => {
                        let v = eval_expr(e, ctx, prev, history)?;
                        out.push_str(&display(&v));
                    }
                }
            }
            Ok(Value::String(out))
        }
        Expr::Bool(b, _) => Ok(Value::Boolean(*b)),
        Expr::Null(_) => Ok(Value::Null),
        Expr::DateLit(lit, _) => {
            date::resolve_date_literal(lit, &ctx.system_timezone, ctx.time_source.as_ref())
        }
        Expr::Array(items, _) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(item, ctx, prev, history)?);
            }
            Ok(Value::array(out))
        }
        Expr::Object(fields, _) => {
            let mut out = Vec::with_capacity(fields.len());
            for (key, value_expr) in fields {
                let key = match key {
                    ObjectKey::Static(s) => s.clone(),
                    ObjectKey::Computed(e) => display(&eval_expr(e, ctx, prev, history)?),
                };
                out.push((key, eval_expr(value_expr, ctx, prev, history)?));
            }
            Ok(Value::object(out))
        }
        Expr::Ident(name, _) => eval_ident(name, ctx, prev, history),
        Expr::Unary(op, operand, _) => {
            let v = eval_expr(operand, ctx, prev, history)?;
            eval_unary(*op, v)
        }
        Expr::Binary(op, lhs, rhs, _span) => eval_binary(*op, lhs, rhs, ctx, prev, history),
        Expr::Ternary(cond, then_branch, else_branch, _) => {
            if eval_expr(cond, ctx, prev, history)?.is_truthy() {
                eval_expr(then_branch, ctx, prev, history)
            } else {
                eval_expr(else_branch, ctx, prev, history)
            }
        }
        Expr::Pipe(lhs, rhs, _) => eval_pipe(lhs, rhs, ctx, prev, history),
        Expr::Call(callee, args, _span) => eval_call(callee, args, ctx, prev, history),
        Expr::Index(base, index, _) => {
            let base_v = eval_expr(base, ctx, prev, history)?;
            let index_v = eval_expr(index, ctx, prev, history)?;
            eval_index(base_v, index_v)
        }
        Expr::Member(base, name, _) => {
            let base_v = eval_expr(base, ctx, prev, history)?;
            eval_member(base_v, name)
        }
        Expr::Convert(inner, target, _) => {
            if let (Expr::Ident(name, _), ConvertTarget::UnitOrZone(unit_text)) =
                (inner.as_ref(), target)
            {
                let lname = name.to_ascii_lowercase();
                if !ctx.env.contains_key(name)
                    && matches!(lname.as_str(), "total" | "sum" | "average" | "avg")
                {
                    return match lname.as_str() {
                        "total" | "sum" => aggregate_sum(history, Some(unit_text.as_str())),
                        _ => aggregate_average(history, Some(unit_text.as_str())),
                    };
                }
            }
            let v = eval_expr(inner, ctx, prev, history)?;
            eval_convert(v, target, ctx)
        }
        Expr::IsCheck(inner, tag, _) => {
            let v = eval_expr(inner, ctx, prev, history)?;
            Ok(Value::Boolean(is_tag(&v, tag)))
        }
        Expr::Percent(inner, _) => {
            let v = eval_expr(inner, ctx, prev, history)?;
            let n = as_decimal(&v)?;
            Ok(Value::Percentage { value: n })
        }
        Expr::Lambda(params, body, _) => {
            let captured_env = deep_clone_env(&ctx.env);
            Ok(Value::Function(Rc::new(FunctionDef {
                name: None,
                params: params.clone(),
                body: (**body).clone(),
                captured_env,
            })))
        }
    }
}

// ---- identifiers, constants, relative dates, aggregates ----

fn eval_ident(
    name: &str,
    ctx: &mut EvaluationContext,
    prev: Option<&Value>,
    history: &[Value],
) -> Result<Value, EvalError> {
    if let Some(v) = ctx.env.get(name) {
        return Ok(v.clone());
    }
    match name.to_ascii_lowercase().as_str() {
        "pi" => return Ok(Value::number(ctx.precision.via_f64(Decimal::ZERO, |_| std::f64::consts::PI))),
        "e" => return Ok(Value::number(ctx.precision.via_f64(Decimal::ZERO, |_| std::f64::consts::E))),
        "tau" => {
            return Ok(Value::number(
                ctx.precision.via_f64(Decimal::ZERO, |_| std::f64::consts::TAU),
            ))
        }
        "prev" => {
            return prev
                .cloned()
                .ok_or_else(|| EvalError::Other("no previous line result".to_string()))
        }
        "total" | "sum" => return aggregate_sum(history, None),
        "average" | "avg" => return aggregate_average(history, None),
        "agg" => {
            return Ok(Value::array(
                history.iter().filter(|v| is_numeric(v)).cloned().collect(),
            ))
        }
        _ => {}
    }
    if let Some(v) = date::resolve_relative_word(name, &ctx.system_timezone, ctx.time_source.as_ref()) {
        return v;
    }
    Err(EvalError::UndefinedVariable(name.to_string()))
}

/// Unit-category tags recognised by the `is` operator, plus the closed set
/// of `Value::type_name()` tags and the `datetime` special case (a `Date`
/// with a time component).
fn is_tag(v: &Value, tag: &str) -> bool {
    let tag = tag.to_ascii_lowercase();
    match tag.as_str() {
        "datetime" => matches!(v, Value::Date { has_time_component: true, .. }),
        "length" | "weight" | "volume" | "temperature" | "data" | "time" | "currency" => match v {
            Value::Quantity { dimensions, .. } => dimensions.category_tag() == Some(tag.as_str()),
            _ => false,
        },
        _ => v.type_name().eq_ignore_ascii_case(&tag),
    }
}

/// `total`/`sum` over the previous-results window. Strings concatenate
/// (non-strings skipped); otherwise numeric/quantity values are added. With
/// `target_unit`, compatible quantities convert to it and incompatible ones
/// are skipped silently; without it, a shared unit is kept, multiple
/// compatible units convert to the first one seen, and incompatible units
/// fall back to a raw, unitless sum.
fn aggregate_sum(history: &[Value], target_unit: Option<&str>) -> Result<Value, EvalError> {
    if history.iter().any(|v| matches!(v, Value::String(_))) {
        let concatenated: String = history
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        return Ok(Value::String(concatenated));
    }
    sum_numeric(history, target_unit)
}

fn numeric_contributors(history: &[Value]) -> Vec<&Value> {
    history.iter().filter(|v| is_numeric(v)).collect()
}

fn sum_numeric(history: &[Value], target_unit: Option<&str>) -> Result<Value, EvalError> {
    let numeric = numeric_contributors(history);
    if numeric.is_empty() {
        return Ok(Value::number(Decimal::ZERO));
    }
    if let Some(unit_text) = target_unit {
        let target_dims = DimensionMap::parse(unit_text)?;
        let mut total = Decimal::ZERO;
        for v in &numeric {
            match v {
                Value::Quantity { value, dimensions } => {
                    if let Ok(factor) = dimensions.factor_to(&target_dims) {
                        total += *value * factor;
                    }
                }
                _ => total += as_decimal(v)?,
            }
        }
        return Ok(Value::Quantity {
            value: total,
            dimensions: target_dims,
        });
    }

    let mut shared: Option<DimensionMap> = None;
    let mut incompatible = false;
    for v in &numeric {
        if let Value::Quantity { dimensions, .. } = v {
            match &shared {
                None => shared = Some(dimensions.clone()),
                Some(existing) if !existing.same_shape(dimensions) => incompatible = true,
                _ => {}
            }
        }
    }
    if incompatible || shared.is_none() {
        let mut total = Decimal::ZERO;
        for v in &numeric {
            total += as_decimal(v)?;
        }
        return Ok(Value::number(total));
    }
    let dims = shared.unwrap();
    let mut total = Decimal::ZERO;
    for v in &numeric {
        match v {
            Value::Quantity { value, dimensions } => total += *value * dimensions.factor_to(&dims)?,
            _ => total += as_decimal(v)?,
        }
    }
    Ok(Value::Quantity { value: total, dimensions: dims })
}

fn aggregate_average(history: &[Value], target_unit: Option<&str>) -> Result<Value, EvalError> {
    let numeric = numeric_contributors(history);
    if numeric.is_empty() {
        return Err(EvalError::EmptyAggregateWindow);
    }
    let count = Decimal::from(numeric.len());
    match sum_numeric(history, target_unit)? {
        Value::Quantity { value, dimensions } => Ok(Value::Quantity {
            value: value / count,
            dimensions,
        }),
        Value::Number { value, format } => Ok(Value::Number {
            value: value / count,
            format,
        }),
        other => Ok(other),
    }
}

fn as_decimal(v: &Value) -> Result<Decimal, EvalError> {
    match v {
        Value::Number { value, .. } => Ok(*value),
        Value::Percentage { value } => Ok(*value),
        Value::Quantity { value, .. } => Ok(*value),
        other => Err(EvalError::TypeMismatch {
            expected: "number".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

// ---- unary / binary ----

fn eval_unary(op: UnOp, v: Value) -> Result<Value, EvalError> {
    match op {
        UnOp::Not => Ok(Value::Boolean(!v.is_truthy())),
        UnOp::Plus => Ok(v),
        UnOp::Neg => match v {
            Value::Number { value, format } => Ok(Value::Number {
                value: -value,
                format,
            }),
            Value::Percentage { value } => Ok(Value::Percentage { value: -value }),
            Value::Quantity { value, dimensions } => Ok(Value::Quantity {
                value: -value,
                dimensions,
            }),
            other => Err(EvalError::TypeMismatch {
                expected: "number, percentage or quantity".to_string(),
                got: other.type_name().to_string(),
            }),
        },
    }
}

fn eval_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut EvaluationContext,
    prev: Option<&Value>,
    history: &[Value],
) -> Result<Value, EvalError> {
    // Short-circuit forms evaluate their right side lazily.
    match op {
        BinOp::And => {
            let l = eval_expr(lhs, ctx, prev, history)?;
            return if !l.is_truthy() {
                Ok(l)
            } else {
                eval_expr(rhs, ctx, prev, history)
            };
        }
        BinOp::Or => {
            let l = eval_expr(lhs, ctx, prev, history)?;
            return if l.is_truthy() {
                Ok(l)
            } else {
                eval_expr(rhs, ctx, prev, history)
            };
        }
        BinOp::NullCoalesce => {
            let l = eval_expr(lhs, ctx, prev, history)?;
            return if matches!(l, Value::Null) {
                eval_expr(rhs, ctx, prev, history)
            } else {
                Ok(l)
            };
        }
        _ => {}
    }

    let l = eval_expr(lhs, ctx, prev, history)?;
    let r = eval_expr(rhs, ctx, prev, history)?;

    match op {
        BinOp::Eq => return Ok(Value::Boolean(l.structural_eq(&r))),
        BinOp::NotEq => return Ok(Value::Boolean(!l.structural_eq(&r))),
        BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => return compare(op, &l, &r),
        _ => {}
    }

    match op {
        BinOp::Add => add(l, r, ctx),
        BinOp::Sub => sub(l, r, ctx),
        BinOp::Mul => mul(l, r),
        BinOp::Div => div(l, r, ctx),
        BinOp::Mod => modulo(l, r),
        BinOp::Pow => Ok(Value::number(builtins::decimal_pow(as_decimal(&l)?, as_decimal(&r)?))),
        BinOp::BitAnd => int_op(&l, &r, |a, b| a & b),
        BinOp::Shl => int_op(&l, &r, |a, b| a << b),
        BinOp::Shr => int_op(&l, &r, |a, b| a >> b),
        BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq
        | BinOp::And | BinOp::Or | BinOp::NullCoalesce => {
            unreachable!("handled above")
        }
    }
}

fn compare(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    use std::cmp::Ordering;
    let ordering = match (l, r) {
        (Value::Date { instant: a, .. }, Value::Date { instant: b, .. }) => a.cmp(b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (
            Value::Quantity { value: a, dimensions: da },
            Value::Quantity { value: b, dimensions: db },
        ) => {
            let factor = da.factor_to(db)?;
            (*a * factor).cmp(b)
        }
        _ => {
            let a = as_decimal(l)?;
            let b = as_decimal(r)?;
            a.cmp(&b)
        }
    };
    let result = match op {
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::LtEq => ordering != Ordering::Greater,
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::GtEq => ordering != Ordering::Less,
        _ => unreachable!(),
    };
    Ok(Value::Boolean(result))
}

fn int_op(l: &Value, r: &Value, f: impl FnOnce(i64, i64) -> i64) -> Result<Value, EvalError> {
    let a = to_i64(l)?;
    let b = to_i64(r)?;
    Ok(Value::number(Decimal::from(f(a, b))))
}

fn to_i64(v: &Value) -> Result<i64, EvalError> {
    let d = as_decimal(v)?;
    if !d.fract().is_zero() {
        return Err(EvalError::NonIntegerConversion);
    }
    d.to_string().parse().map_err(|_| EvalError::NonIntegerConversion)
}

fn modulo(l: Value, r: Value) -> Result<Value, EvalError> {
    let a = as_decimal(&l)?;
    let b = as_decimal(&r)?;
    if b.is_zero() {
        return Err(EvalError::Domain(linecalc_core::CoreError::DivisionByZero));
    }
    Ok(Value::number(a % b))
}

fn add(l: Value, r: Value, ctx: &EvaluationContext) -> Result<Value, EvalError> {
    match (&l, &r) {
        (Value::String(_), _) | (_, Value::String(_)) if !(is_numeric(&l) && is_numeric(&r)) => {
            Ok(Value::String(format!("{}{}", display(&l), display(&r))))
        }
        (Value::Array(a), Value::Array(b)) => {
            let mut out = a.borrow().clone();
            out.extend(b.borrow().iter().cloned());
            Ok(Value::array(out))
        }
        (Value::Date { instant, timezone, has_time_component }, Value::Quantity { value, dimensions }) => {
            let new_instant = date::add_duration_to_date(*instant, *value, dimensions, false)?;
            Ok(Value::Date {
                instant: new_instant,
                timezone: timezone.clone(),
                has_time_component: *has_time_component,
            })
        }
        (Value::Number { value: a, .. }, Value::Percentage { value: p }) => {
            Ok(Value::number(*a * (Decimal::ONE + *p / hundred())))
        }
        (Value::Quantity { value: a, dimensions }, Value::Percentage { value: p }) => Ok(Value::Quantity {
            value: *a * (Decimal::ONE + *p / hundred()),
            dimensions: dimensions.clone(),
        }),
        (Value::Percentage { value: a }, Value::Percentage { value: b }) => {
            Ok(Value::Percentage { value: *a + *b })
        }
        (Value::Quantity { .. }, Value::Quantity { .. }) => quantity_add_sub(l, r, ctx, false),
        (Value::Quantity { value, dimensions }, Value::Number { value: n, .. }) => Ok(Value::Quantity {
            value: *value + *n,
            dimensions: dimensions.clone(),
        }),
        _ => Ok(Value::number(as_decimal(&l)? + as_decimal(&r)?)),
    }
}

fn sub(l: Value, r: Value, ctx: &EvaluationContext) -> Result<Value, EvalError> {
    match (&l, &r) {
        (Value::Date { instant: a, .. }, Value::Date { instant: b, .. }) => {
            let seconds = date::difference_seconds(*a, *b);
            Ok(Value::Quantity {
                value: seconds,
                dimensions: DimensionMap::single(Dimension::Time, "s", 1),
            })
        }
        (Value::Date { instant, timezone, has_time_component }, Value::Quantity { value, dimensions }) => {
            let new_instant = date::add_duration_to_date(*instant, *value, dimensions, true)?;
            Ok(Value::Date {
                instant: new_instant,
                timezone: timezone.clone(),
                has_time_component: *has_time_component,
            })
        }
        (Value::Number { value: a, .. }, Value::Percentage { value: p }) => {
            Ok(Value::number(*a * (Decimal::ONE - *p / hundred())))
        }
        (Value::Quantity { value: a, dimensions }, Value::Percentage { value: p }) => Ok(Value::Quantity {
            value: *a * (Decimal::ONE - *p / hundred()),
            dimensions: dimensions.clone(),
        }),
        (Value::Percentage { value: a }, Value::Percentage { value: b }) => {
            Ok(Value::Percentage { value: *a - *b })
        }
        (Value::Quantity { .. }, Value::Quantity { .. }) => quantity_add_sub(l, r, ctx, true),
        (Value::Quantity { value, dimensions }, Value::Number { value: n, .. }) => Ok(Value::Quantity {
            value: *value - *n,
            dimensions: dimensions.clone(),
        }),
        _ => Ok(Value::number(as_decimal(&l)? - as_decimal(&r)?)),
    }
}

fn quantity_add_sub(l: Value, r: Value, ctx: &EvaluationContext, negate: bool) -> Result<Value, EvalError> {
    let (Value::Quantity { value: a, dimensions: da }, Value::Quantity { value: b, dimensions: db }) = (l, r)
    else {
        unreachable!()
    };
    if da.is_single_temperature() && db.is_single_temperature() {
        let unit_a = da.simple_unit().unwrap().to_string();
        let unit_b = db.simple_unit().unwrap().to_string();
        let a_k = linecalc_core::units::to_kelvin(a, &unit_a)?;
        let b_k = linecalc_core::units::to_kelvin(b, &unit_b)?;
        let sum_k = if negate { a_k - b_k } else { a_k + b_k };
        let back = linecalc_core::units::from_kelvin(sum_k, &unit_a)?;
        return Ok(Value::Quantity { value: back, dimensions: da });
    }
    if da.is_single_currency() && db.is_single_currency() {
        let unit_a = da.simple_unit().unwrap().to_string();
        let unit_b = db.simple_unit().unwrap().to_string();
        let b_converted = convert_currency(b, &unit_b, &unit_a, ctx)?;
        let value = if negate { a - b_converted } else { a + b_converted };
        return Ok(Value::Quantity { value, dimensions: da });
    }
    let factor = db.factor_to(&da)?;
    let converted = b * factor;
    let value = if negate { a - converted } else { a + converted };
    Ok(Value::Quantity { value, dimensions: da })
}

fn mul(l: Value, r: Value) -> Result<Value, EvalError> {
    match (&l, &r) {
        (Value::String(s), Value::Number { value, .. }) | (Value::Number { value, .. }, Value::String(s)) => {
            let n: usize = value.to_string().parse().unwrap_or(0);
            Ok(Value::String(s.repeat(n)))
        }
        (Value::Number { value: n, .. }, Value::Percentage { value: p })
        | (Value::Percentage { value: p }, Value::Number { value: n, .. }) => {
            Ok(Value::number(*n * *p / hundred()))
        }
        (Value::Quantity { value, dimensions }, Value::Percentage { value: p })
        | (Value::Percentage { value: p }, Value::Quantity { value, dimensions }) => Ok(Value::Quantity {
            value: *value * *p / hundred(),
            dimensions: dimensions.clone(),
        }),
        (Value::Quantity { value: a, dimensions: da }, Value::Quantity { value: b, dimensions: db }) => {
            Ok(Value::Quantity {
                value: *a * *b,
                dimensions: da.mul(db),
            })
        }
        (Value::Quantity { value, dimensions }, Value::Number { value: n, .. })
        | (Value::Number { value: n, .. }, Value::Quantity { value, dimensions }) => Ok(Value::Quantity {
            value: *value * *n,
            dimensions: dimensions.clone(),
        }),
        _ => Ok(Value::number(as_decimal(&l)? * as_decimal(&r)?)),
    }
}

fn div(l: Value, r: Value, ctx: &EvaluationContext) -> Result<Value, EvalError> {
    match (&l, &r) {
        (Value::Quantity { value: a, dimensions: da }, Value::Quantity { value: b, dimensions: db }) => {
            if b.is_zero() {
                return Err(EvalError::Domain(linecalc_core::CoreError::DivisionByZero));
            }
            if da.is_single_currency() && db.is_single_currency() {
                let unit_a = da.simple_unit().unwrap().to_string();
                let unit_b = db.simple_unit().unwrap().to_string();
                let b_converted = convert_currency(*b, &unit_b, &unit_a, ctx)?;
                return Ok(Value::number(a / b_converted));
            }
            Ok(Value::Quantity {
                value: a / b,
                dimensions: da.div(db),
            })
        }
        (Value::Quantity { value, dimensions }, Value::Number { value: n, .. }) => {
            if n.is_zero() {
                return Err(EvalError::Domain(linecalc_core::CoreError::DivisionByZero));
            }
            Ok(Value::Quantity {
                value: value / n,
                dimensions: dimensions.clone(),
            })
        }
        _ => {
            let b = as_decimal(&r)?;
            if b.is_zero() {
                return Err(EvalError::Domain(linecalc_core::CoreError::DivisionByZero));
            }
            Ok(Value::number(as_decimal(&l)? / b))
        }
    }
}

fn convert_currency(value: Decimal, from: &str, to: &str, ctx: &EvaluationContext) -> Result<Decimal, EvalError> {
    if from.eq_ignore_ascii_case(to) {
        return Ok(value);
    }
    let rate_fn = ctx
        .currency_rate
        .as_ref()
        .ok_or_else(|| EvalError::NoCurrencyRate {
            from: from.to_string(),
            to: to.to_string(),
        })?;
    let rate = rate_fn(from, to).ok_or_else(|| EvalError::NoCurrencyRate {
        from: from.to_string(),
        to: to.to_string(),
    })?;
    Ok(value * rate)
}

fn is_numeric(v: &Value) -> bool {
    matches!(v, Value::Number { .. } | Value::Percentage { .. } | Value::Quantity { .. })
}

/// Render a value the way the notebook/CLI shows it: plain text, not `Debug`.
pub fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number { value, .. } => value.to_string(),
        Value::Percentage { value } => format!("{value}%"),
        Value::Quantity { value, dimensions } => format!("{value} {dimensions}"),
        Value::Boolean(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Date { instant, timezone, has_time_component } => {
            crate::date::format_date(*instant, timezone.as_deref(), *has_time_component)
        }
        Value::Markdown(s) => s.clone(),
        _ => format!("{v:?}"),
    }
}

// ---- pipe, call, index, member, convert ----

fn eval_pipe(
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut EvaluationContext,
    prev: Option<&Value>,
    history: &[Value],
) -> Result<Value, EvalError> {
    let lhs_v = eval_expr(lhs, ctx, prev, history)?;
    match rhs {
        Expr::Call(callee, arg_exprs, _) => {
            let mut args = vec![lhs_v];
            for a in arg_exprs {
                args.push(eval_expr(a, ctx, prev, history)?);
            }
            call_named_or_value(callee, args, ctx, prev, history)
        }
        Expr::Ident(_, _) => call_named_or_value(rhs, vec![lhs_v], ctx, prev, history),
        // `x | y => y + 1` is grammatically ambiguous with a trailing
        // lambda param list; reject it instead of guessing — pipe into a
        // name or a call, not a bare lambda literal.
        Expr::Lambda(..) => Err(EvalError::PipeLambdaDirect),
        other => {
            let f = eval_expr(other, ctx, prev, history)?;
            call_value(&f, vec![lhs_v], ctx)
        }
    }
}

fn eval_call(
    callee: &Expr,
    arg_exprs: &[Expr],
    ctx: &mut EvaluationContext,
    prev: Option<&Value>,
    history: &[Value],
) -> Result<Value, EvalError> {
    if let Expr::Ident(name, _) = callee {
        if name == "agg" && !ctx.env.contains_key(name) {
            if arg_exprs.len() != 2 {
                return Err(EvalError::ArityMismatch {
                    name: "agg".to_string(),
                    expected: 2,
                    got: arg_exprs.len(),
                });
            }
            let initial = eval_expr(&arg_exprs[0], ctx, prev, history)?;
            let reducer = eval_expr(&arg_exprs[1], ctx, prev, history)?;
            let mut acc = initial;
            for v in history {
                acc = call_value(&reducer, vec![acc, v.clone()], ctx)?;
            }
            return Ok(acc);
        }
    }
    let mut args = Vec::with_capacity(arg_exprs.len());
    for a in arg_exprs {
        args.push(eval_expr(a, ctx, prev, history)?);
    }
    call_named_or_value(callee, args, ctx, prev, history)
}

fn call_named_or_value(
    callee: &Expr,
    args: Vec<Value>,
    ctx: &mut EvaluationContext,
    prev: Option<&Value>,
    history: &[Value],
) -> Result<Value, EvalError> {
    if let Expr::Ident(name, _) = callee {
        if let Some(v) = ctx.env.get(name).cloned() {
            if matches!(v, Value::Function(_) | Value::Partial { .. }) {
                return call_value(&v, args, ctx);
            }
        }
        if let Some(needed) = builtin_arity(name) {
            if args.len() < needed {
                let remaining = (args.len()..needed).map(|i| format!("_{i}")).collect();
                return Ok(Value::Partial {
                    underlying: Callable::Builtin(name.clone()),
                    applied_args: args,
                    remaining_params: remaining,
                });
            }
        }
        return builtins::call_builtin(name, args, ctx);
    }
    let callee_v = eval_expr(callee, ctx, prev, history)?;
    call_value(&callee_v, args, ctx)
}

/// Apply a `Value` (function, partial, or builtin-by-name) to arguments,
/// without needing access to the call-site AST. Used by higher-order
/// builtins (`map`, `filter`, ...) that invoke a callback repeatedly.
pub fn call_value(callee: &Value, mut args: Vec<Value>, ctx: &mut EvaluationContext) -> Result<Value, EvalError> {
    match callee {
        Value::Function(f) => call_user_function(f.clone(), args, ctx),
        Value::Partial {
            underlying,
            applied_args,
            remaining_params,
        } => {
            let mut full_args = applied_args.clone();
            full_args.append(&mut args);
            if full_args.len() < applied_args.len() + remaining_params.len() {
                let still_remaining = remaining_params[full_args.len() - applied_args.len()..].to_vec();
                return Ok(Value::Partial {
                    underlying: underlying.clone(),
                    applied_args: full_args,
                    remaining_params: still_remaining,
                });
            }
            match underlying {
                Callable::User(f) => call_user_function(f.clone(), full_args, ctx),
                Callable::Builtin(name) => builtins::call_builtin(name, full_args, ctx),
            }
        }
        other => Err(EvalError::NotCallable(other.type_name().to_string())),
    }
}

fn call_user_function(f: Rc<FunctionDef>, args: Vec<Value>, ctx: &mut EvaluationContext) -> Result<Value, EvalError> {
    if args.len() < f.params.len() {
        let remaining = f.params[args.len()..].to_vec();
        return Ok(Value::Partial {
            underlying: Callable::User(f),
            applied_args: args,
            remaining_params: remaining,
        });
    }
    if args.len() > f.params.len() {
        return Err(EvalError::ArityMismatch {
            name: f.name.clone().unwrap_or_else(|| "<lambda>".to_string()),
            expected: f.params.len(),
            got: args.len(),
        });
    }
    if ctx.call_depth >= RECURSION_LIMIT {
        return Err(EvalError::RecursionLimit(RECURSION_LIMIT));
    }
    if ctx.debug_mode {
        log::trace!(
            "call {}({} args) depth={}",
            f.name.as_deref().unwrap_or("<lambda>"),
            f.params.len(),
            ctx.call_depth
        );
    }

    let mut call_env = f.captured_env.clone();
    for (p, a) in f.params.iter().zip(args.into_iter()) {
        call_env.insert(p.clone(), a);
    }
    // Resolve the function's own name at call site rather than relying
    // solely on whatever the closure snapshot held, so recursion and later
    // redefinition both work.
    if let Some(name) = &f.name {
        call_env.entry(name.clone()).or_insert_with(|| Value::Function(f.clone()));
    }

    let saved_env = std::mem::replace(&mut ctx.env, call_env);
    ctx.call_depth += 1;
    let result = eval_expr(&f.body, ctx, None, &[]);
    ctx.call_depth -= 1;
    ctx.env = saved_env;
    result
}

// ---- indexing / member access ----

fn eval_index(base: Value, index: Value) -> Result<Value, EvalError> {
    match base {
        Value::Array(items) => {
            let i = to_i64(&index)?;
            let b = items.borrow();
            let len = b.len();
            let idx = if i < 0 { len as i64 + i } else { i };
            if idx < 0 || idx as usize >= len {
                return Err(EvalError::IndexOutOfBounds { index: i, len });
            }
            Ok(b[idx as usize].clone())
        }
        Value::Object(entries) => {
            let key = match index {
                Value::String(s) => s,
                other => display(&other),
            };
            entries
                .borrow()
                .iter()
                .find(|(k, _)| k == &key)
                .map(|(_, v)| v.clone())
                .ok_or(EvalError::NoSuchField(key))
        }
        Value::String(s) => {
            let i = to_i64(&index)?;
            let chars: Vec<char> = s.chars().collect();
            let idx = if i < 0 { chars.len() as i64 + i } else { i };
            if idx < 0 || idx as usize >= chars.len() {
                return Err(EvalError::IndexOutOfBounds {
                    index: i,
                    len: chars.len(),
                });
            }
            Ok(Value::String(chars[idx as usize].to_string()))
        }
        other => Err(EvalError::NotIndexable(other.type_name().to_string())),
    }
}

fn eval_member(base: Value, name: &str) -> Result<Value, EvalError> {
    match &base {
        Value::Object(entries) => entries
            .borrow()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| EvalError::NoSuchField(name.to_string())),
        Value::Date { instant, .. } => {
            use chrono::{Datelike, Timelike};
            let d = *instant;
            let n = match name {
                "year" => d.year() as i64,
                "month" => d.month() as i64,
                "day" => d.day() as i64,
                "hour" => d.hour() as i64,
                "minute" => d.minute() as i64,
                "second" => d.second() as i64,
                "weekday" => d.weekday().num_days_from_monday() as i64,
                other => return Err(EvalError::NoSuchField(other.to_string())),
            };
            Ok(Value::number(Decimal::from(n)))
        }
        other => Err(EvalError::NoSuchField(format!("{}.{}", other.type_name(), name))),
    }
}

// ---- conversion (to/in/as) ----

fn eval_convert(v: Value, target: &ConvertTarget, ctx: &EvaluationContext) -> Result<Value, EvalError> {
    match target {
        ConvertTarget::Binary => match v {
            Value::Number { value, .. } => Ok(Value::Number {
                value,
                format: Some(linecalc_core::NumberFormat::Binary),
            }),
            other => Err(EvalError::TypeMismatch {
                expected: "number".to_string(),
                got: other.type_name().to_string(),
            }),
        },
        ConvertTarget::Hex => match v {
            Value::Number { value, .. } => Ok(Value::Number {
                value,
                format: Some(linecalc_core::NumberFormat::Hex),
            }),
            other => Err(EvalError::TypeMismatch {
                expected: "number".to_string(),
                got: other.type_name().to_string(),
            }),
        },
        ConvertTarget::Type(t) => convert_type(v, t),
        ConvertTarget::UnitOrZone(target_text) => match &v {
            Value::Quantity { value, dimensions } => convert_unit(*value, dimensions, target_text, ctx),
            Value::Date {
                instant,
                has_time_component,
                ..
            } => Ok(Value::Date {
                instant: *instant,
                timezone: Some(target_text.clone()),
                has_time_component: *has_time_component,
            }),
            other => Err(EvalError::TypeMismatch {
                expected: "quantity or date".to_string(),
                got: other.type_name().to_string(),
            }),
        },
    }
}

fn convert_type(v: Value, target: &str) -> Result<Value, EvalError> {
    match target {
        "number" => match v {
            Value::Number { .. } => Ok(v),
            Value::Percentage { value } => Ok(Value::number(value)),
            Value::Quantity { value, .. } => Ok(Value::number(value)),
            Value::String(s) => s
                .trim()
                .parse::<Decimal>()
                .map(Value::number)
                .map_err(|_| EvalError::TypeMismatch {
                    expected: "numeric string".to_string(),
                    got: s,
                }),
            Value::Boolean(b) => Ok(Value::number(if b { Decimal::ONE } else { Decimal::ZERO })),
            other => Err(EvalError::TypeMismatch {
                expected: "convertible to number".to_string(),
                got: other.type_name().to_string(),
            }),
        },
        "string" => Ok(Value::String(display(&v))),
        "boolean" => Ok(Value::Boolean(v.is_truthy())),
        "array" => match v {
            Value::Array(_) => Ok(v),
            other => Ok(Value::array(vec![other])),
        },
        "object" => match v {
            Value::Object(_) => Ok(v),
            other => Err(EvalError::TypeMismatch {
                expected: "object".to_string(),
                got: other.type_name().to_string(),
            }),
        },
        other => Err(EvalError::Other(format!("unknown conversion target '{other}'"))),
    }
}

fn convert_unit(
    value: Decimal,
    dims: &DimensionMap,
    target_text: &str,
    ctx: &EvaluationContext,
) -> Result<Value, EvalError> {
    let target_dims = DimensionMap::parse(target_text)?;
    if dims.is_single_temperature() && target_dims.is_single_temperature() {
        let from_unit = dims.simple_unit().unwrap();
        let to_unit = target_dims.simple_unit().unwrap();
        let kelvin = linecalc_core::units::to_kelvin(value, from_unit)?;
        let converted = linecalc_core::units::from_kelvin(kelvin, to_unit)?;
        return Ok(Value::Quantity {
            value: converted,
            dimensions: target_dims,
        });
    }
    if dims.is_single_currency() && target_dims.is_single_currency() {
        let from_unit = dims.simple_unit().unwrap().to_string();
        let to_unit = target_dims.simple_unit().unwrap().to_string();
        let converted = convert_currency(value, &from_unit, &to_unit, ctx)?;
        return Ok(Value::Quantity {
            value: converted,
            dimensions: target_dims,
        });
    }
    let factor = dims.factor_to(&target_dims)?;
    Ok(Value::Quantity {
        value: value * factor,
        dimensions: target_dims,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn run(ctx: &mut EvaluationContext, src: &str) -> Result<LineOutcome, EvalError> {
        let line = linecalc_lang::parse_line(src).map_err(EvalError::from)?;
        evaluate(&line, ctx, None, &[])
    }

    fn run_value(ctx: &mut EvaluationContext, src: &str) -> Value {
        run(ctx, src).unwrap().value.unwrap()
    }

    #[test]
    fn test_decimal_fidelity_no_float_drift() {
        let mut ctx = EvaluationContext::new("UTC");
        let v = run_value(&mut ctx, "0.1 + 0.2");
        match v {
            Value::Number { value, .. } => assert_eq!(value, dec!(0.3)),
            other => panic!("expected Number, got {other:?}"),
        }
    }

    #[test]
    fn test_dimensional_roundtrip() {
        let mut ctx = EvaluationContext::new("UTC");
        run(&mut ctx, "d = 100 cm to meters").unwrap();
        let back = run_value(&mut ctx, "d to cm");
        match back {
            Value::Quantity { value, .. } => assert_eq!(value, dec!(100)),
            other => panic!("expected Quantity, got {other:?}"),
        }
    }

    #[test]
    fn test_temperature_affine_conversion_is_exact() {
        let mut ctx = EvaluationContext::new("UTC");
        let v = run_value(&mut ctx, "0 celsius to fahrenheit");
        match v {
            Value::Quantity { value, .. } => assert_eq!(value, dec!(32)),
            other => panic!("expected Quantity, got {other:?}"),
        }
    }

    #[test]
    fn test_incompatible_dimensions_rejected() {
        let mut ctx = EvaluationContext::new("UTC");
        let err = run(&mut ctx, "(100 meters) + (5 kg)").unwrap_err();
        assert!(matches!(err, EvalError::Domain(_)));
    }

    #[test]
    fn test_pipe_equivalent_to_direct_call() {
        let mut ctx = EvaluationContext::new("UTC");
        run(&mut ctx, "double(x) = x * 2").unwrap();
        let piped = run_value(&mut ctx, "10 | double");
        let direct = run_value(&mut ctx, "double(10)");
        assert!(piped.structural_eq(&direct));
    }

    #[test]
    fn test_pipe_into_bare_lambda_is_rejected() {
        let mut ctx = EvaluationContext::new("UTC");
        let err = run(&mut ctx, "10 | y => y + 1").unwrap_err();
        assert!(matches!(err, EvalError::PipeLambdaDirect));
    }

    #[test]
    fn test_partial_application_associativity() {
        let mut ctx = EvaluationContext::new("UTC");
        run(&mut ctx, "add(a, b) = a + b").unwrap();
        let full = run_value(&mut ctx, "add(1, 2)");
        run(&mut ctx, "add1 = add(1)").unwrap();
        let via_partial = run_value(&mut ctx, "add1(2)");
        assert!(full.structural_eq(&via_partial));
    }

    #[test]
    fn test_mutation_is_isolated_across_lines() {
        let mut ctx = EvaluationContext::new("UTC");
        run(&mut ctx, "a = [1, 2, 3]").unwrap();
        run(&mut ctx, "b = a").unwrap();
        run(&mut ctx, "push!(b, 4)").unwrap();
        let a = ctx.env.get("a").cloned().unwrap();
        let b = ctx.env.get("b").cloned().unwrap();
        match (a, b) {
            (Value::Array(a), Value::Array(b)) => {
                assert_eq!(a.borrow().len(), 3);
                assert_eq!(b.borrow().len(), 4);
            }
            other => panic!("expected two arrays, got {other:?}"),
        }
    }

    #[test]
    fn test_reserved_names_cannot_be_assigned() {
        let mut ctx = EvaluationContext::new("UTC");
        let err = run(&mut ctx, "pi = 4").unwrap_err();
        assert!(matches!(err, EvalError::ReservedName(_)));
    }

    #[test]
    fn test_recursion_limit_is_enforced() {
        let mut ctx = EvaluationContext::new("UTC");
        run(&mut ctx, "loop(n) = loop(n + 1)").unwrap();
        let err = run(&mut ctx, "loop(0)").unwrap_err();
        assert!(matches!(err, EvalError::RecursionLimit(_)));
    }

    #[test]
    fn test_aggregate_over_window() {
        let mut ctx = EvaluationContext::new("UTC");
        let line = linecalc_lang::parse_line("total").unwrap();
        let history = vec![Value::number(dec!(1)), Value::number(dec!(2)), Value::number(dec!(3))];
        let out = evaluate(&line, &mut ctx, None, &history).unwrap();
        match out.value.unwrap() {
            Value::Number { value, .. } => assert_eq!(value, dec!(6)),
            other => panic!("expected Number, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_aggregate_window_errors() {
        let mut ctx = EvaluationContext::new("UTC");
        let line = linecalc_lang::parse_line("average").unwrap();
        let err = evaluate(&line, &mut ctx, None, &[]).unwrap_err();
        assert!(matches!(err, EvalError::EmptyAggregateWindow));
    }

    #[test]
    fn test_prev_references_previous_line_value() {
        let mut ctx = EvaluationContext::new("UTC");
        let line = linecalc_lang::parse_line("prev * 2").unwrap();
        let prev = Value::number(dec!(5));
        let out = evaluate(&line, &mut ctx, Some(&prev), &[]).unwrap();
        match out.value.unwrap() {
            Value::Number { value, .. } => assert_eq!(value, dec!(10)),
            other => panic!("expected Number, got {other:?}"),
        }
    }

    #[test]
    fn test_non_integer_to_bitwise_op_errors() {
        let mut ctx = EvaluationContext::new("UTC");
        let err = run(&mut ctx, "2.5 & 1").unwrap_err();
        assert!(matches!(err, EvalError::NonIntegerConversion));
    }

    #[test]
    fn test_bare_agg_yields_numeric_history_array() {
        let mut ctx = EvaluationContext::new("UTC");
        let line = linecalc_lang::parse_line("agg").unwrap();
        let history = vec![Value::number(dec!(1)), Value::String("skip".to_string()), Value::number(dec!(2))];
        let out = evaluate(&line, &mut ctx, None, &history).unwrap();
        match out.value.unwrap() {
            Value::Array(a) => assert_eq!(a.borrow().len(), 2),
            other => panic!("expected Array, got {other:?}"),
        }
    }

    #[test]
    fn test_total_concatenates_strings() {
        let mut ctx = EvaluationContext::new("UTC");
        let line = linecalc_lang::parse_line("total").unwrap();
        let history = vec![Value::String("foo".to_string()), Value::String("bar".to_string())];
        let out = evaluate(&line, &mut ctx, None, &history).unwrap();
        match out.value.unwrap() {
            Value::String(s) => assert_eq!(s, "foobar"),
            other => panic!("expected String, got {other:?}"),
        }
    }

    #[test]
    fn test_total_in_unit_converts_and_skips_incompatible() {
        let mut ctx = EvaluationContext::new("UTC");
        let line = linecalc_lang::parse_line("total in m").unwrap();
        let history = vec![
            Value::Quantity { value: dec!(100), dimensions: DimensionMap::single(Dimension::Length, "cm", 1) },
            Value::Quantity { value: dec!(1), dimensions: DimensionMap::single(Dimension::Length, "m", 1) },
            Value::Quantity { value: dec!(5), dimensions: DimensionMap::single(Dimension::Mass, "kg", 1) },
        ];
        let out = evaluate(&line, &mut ctx, None, &history).unwrap();
        match out.value.unwrap() {
            Value::Quantity { value, .. } => assert_eq!(value, dec!(2)),
            other => panic!("expected Quantity, got {other:?}"),
        }
    }

    #[test]
    fn test_average_divides_by_numeric_contributor_count() {
        let mut ctx = EvaluationContext::new("UTC");
        let line = linecalc_lang::parse_line("average").unwrap();
        let history = vec![Value::number(dec!(10)), Value::String("skip".to_string()), Value::number(dec!(20))];
        let out = evaluate(&line, &mut ctx, None, &history).unwrap();
        match out.value.unwrap() {
            Value::Number { value, .. } => assert_eq!(value, dec!(15)),
            other => panic!("expected Number, got {other:?}"),
        }
    }

    #[test]
    fn test_is_operator_recognises_unit_category_tags() {
        let mut ctx = EvaluationContext::new("UTC");
        let v = run_value(&mut ctx, "5 kg is weight");
        assert!(matches!(v, Value::Boolean(true)));
        let v = run_value(&mut ctx, "5 kg is length");
        assert!(matches!(v, Value::Boolean(false)));
    }

    #[test]
    fn test_is_operator_datetime_requires_time_component() {
        assert!(is_tag(
            &Value::Date { instant: chrono::Utc::now(), timezone: None, has_time_component: true },
            "datetime"
        ));
        assert!(!is_tag(
            &Value::Date { instant: chrono::Utc::now(), timezone: None, has_time_component: false },
            "datetime"
        ));
    }
}
