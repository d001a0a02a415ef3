//! The built-in function registry: math, sequence, string,
//! object, type-inspection and higher-order functions, plus their `!`-suffixed
//! mutating siblings that act in place on `Array`/`Object`'s shared backing
//! store.

use crate::error::EvalError;
use crate::eval::{call_value, EvaluationContext};
use linecalc_core::{Decimal, Value};
use std::cmp::Ordering;

/// Fixed arity for builtins that support partial application (the same
/// curry rules apply uniformly to user functions and these).
/// Variadic or zero-arg-only builtins return `None` and simply can't be
/// partially applied.
pub fn builtin_arity(name: &str) -> Option<usize> {
    match name {
        "abs" | "round" | "floor" | "ceil" | "sqrt" | "cbrt" | "log" | "ln" | "fact" | "sin"
        | "cos" | "tan" | "asin" | "acos" | "atan" | "sinh" | "cosh" | "tanh" | "sign"
        | "length" | "len" | "upper" | "uppercase" | "lower" | "lowercase" | "trim" | "reverse"
        | "unique" | "flatten" | "keys" | "values" | "entries" | "type" | "unit" | "timezone"
        | "toString" | "sort" | "first" | "last" | "pop" | "shift" | "pop!" | "shift!"
        | "capitalize" | "sum" | "env" => Some(1),
        "pow" | "root" | "min" | "max" | "range" | "split" | "join" | "contains" | "includes"
        | "startsWith" | "endsWith" | "repeat" | "has" | "map" | "filter" | "find" | "findIndex"
        | "every" | "some" | "groupBy" | "push" | "unshift" | "append" | "prepend" | "charAt"
        | "indexOf" | "lastIndexOf" | "push!" | "unshift!" | "append!" | "prepend!" | "filter!"
        | "map!" | "agg" => Some(2),
        "clamp" | "replace" | "replaceAll" | "padLeft" | "padRight" | "padstart" | "padend"
        | "reduce" | "substr" => Some(3),
        _ => None,
    }
}

pub fn call_builtin(name: &str, args: Vec<Value>, ctx: &mut EvaluationContext) -> Result<Value, EvalError> {
    match name {
        // ---- math ----
        "abs" => num1(&args, name, |d| d.abs()),
        "round" => num1(&args, name, |d| d.round()),
        "floor" => num1(&args, name, |d| d.floor()),
        "ceil" => num1(&args, name, |d| d.ceil()),
        "sign" => num1(&args, name, |d| {
            if d.is_sign_negative() && !d.is_zero() {
                -Decimal::ONE
            } else if d.is_zero() {
                Decimal::ZERO
            } else {
                Decimal::ONE
            }
        }),
        "sqrt" => {
            let d = expect_number(&args, 0, name)?;
            linecalc_core::precision::decimal_sqrt(d, &ctx.precision)
                .map(Value::number)
                .ok_or_else(|| EvalError::Domain(linecalc_core::CoreError::InvalidOperation(
                    "sqrt of negative number".to_string(),
                )))
        }
        "pow" => {
            let base = expect_number(&args, 0, name)?;
            let exp = expect_number(&args, 1, name)?;
            Ok(Value::number(decimal_pow(base, exp)))
        }
        "min" => {
            let a = expect_number(&args, 0, name)?;
            let b = expect_number(&args, 1, name)?;
            Ok(Value::number(a.min(b)))
        }
        "max" => {
            let a = expect_number(&args, 0, name)?;
            let b = expect_number(&args, 1, name)?;
            Ok(Value::number(a.max(b)))
        }
        "clamp" => {
            let v = expect_number(&args, 0, name)?;
            let lo = expect_number(&args, 1, name)?;
            let hi = expect_number(&args, 2, name)?;
            Ok(Value::number(v.max(lo).min(hi)))
        }
        "cbrt" => trig1(&args, ctx, name, f64::cbrt),
        "root" => {
            let d = expect_number(&args, 0, name)?;
            let n = expect_number(&args, 1, name)?;
            let n: f64 = n.to_string().parse().unwrap_or(1.0);
            Ok(Value::number(ctx.precision.via_f64(d, |x| x.powf(1.0 / n))))
        }
        "log" => trig1(&args, ctx, name, f64::log10),
        "ln" => trig1(&args, ctx, name, f64::ln),
        "fact" => {
            let d = expect_number(&args, 0, name)?;
            let n: u64 = d.to_string().parse().map_err(|_| EvalError::TypeMismatch {
                expected: "non-negative integer".to_string(),
                got: d.to_string(),
            })?;
            let mut acc = Decimal::ONE;
            for i in 1..=n {
                acc *= Decimal::from(i);
            }
            Ok(Value::number(acc))
        }
        "sin" => trig1(&args, ctx, name, f64::sin),
        "cos" => trig1(&args, ctx, name, f64::cos),
        "tan" => trig1(&args, ctx, name, f64::tan),
        "asin" => trig1(&args, ctx, name, f64::asin),
        "acos" => trig1(&args, ctx, name, f64::acos),
        "atan" => trig1(&args, ctx, name, f64::atan),
        "sinh" => trig1(&args, ctx, name, f64::sinh),
        "cosh" => trig1(&args, ctx, name, f64::cosh),
        "tanh" => trig1(&args, ctx, name, f64::tanh),

        // ---- sequence ----
        "range" => {
            let start = expect_number(&args, 0, name)?;
            let end = expect_number(&args, 1, name)?;
            let mut items = Vec::new();
            let mut cur = start;
            while cur < end {
                items.push(Value::number(cur));
                cur += Decimal::ONE;
            }
            Ok(Value::array(items))
        }
        "length" | "len" => match &args[0] {
            Value::Array(a) => Ok(Value::number(Decimal::from(a.borrow().len()))),
            Value::Object(o) => Ok(Value::number(Decimal::from(o.borrow().len()))),
            Value::String(s) => Ok(Value::number(Decimal::from(s.chars().count()))),
            other => Err(EvalError::TypeMismatch {
                expected: "array, object or string".to_string(),
                got: other.type_name().to_string(),
            }),
        },
        "first" => expect_array(&args, 0, name)?.first().cloned().ok_or(EvalError::IndexOutOfBounds { index: 0, len: 0 }),
        "last" => {
            let arr = expect_array(&args, 0, name)?;
            arr.last().cloned().ok_or(EvalError::IndexOutOfBounds { index: -1, len: 0 })
        }
        "reverse" => {
            let mut arr = expect_array(&args, 0, name)?;
            arr.reverse();
            Ok(Value::array(arr))
        }
        "sort" => {
            let mut arr = expect_array(&args, 0, name)?;
            sort_values(&mut arr)?;
            Ok(Value::array(arr))
        }
        "unique" => {
            let arr = expect_array(&args, 0, name)?;
            Ok(Value::array(dedup_values(arr)))
        }
        "flatten" => {
            let arr = expect_array(&args, 0, name)?;
            let mut out = Vec::new();
            for v in arr {
                match v {
                    Value::Array(inner) => out.extend(inner.borrow().iter().cloned()),
                    other => out.push(other),
                }
            }
            Ok(Value::array(out))
        }
        "sum" => {
            let arr = expect_array(&args, 0, name)?;
            let mut total = Decimal::ZERO;
            for v in &arr {
                total += expect_number(std::slice::from_ref(v), 0, "sum")?;
            }
            Ok(Value::number(total))
        }
        "slice" => {
            let arr = expect_array(&args, 0, name)?;
            let (start, end) = slice_bounds(&args, arr.len(), name)?;
            Ok(Value::array(arr[start..end].to_vec()))
        }
        "findIndex" => {
            let arr = expect_array(&args, 0, name)?;
            let f = args[1].clone();
            for (i, v) in arr.into_iter().enumerate() {
                if call_value(&f, vec![v], ctx)?.is_truthy() {
                    return Ok(Value::number(Decimal::from(i)));
                }
            }
            Ok(Value::number(-Decimal::ONE))
        }
        "groupBy" => {
            let arr = expect_array(&args, 0, name)?;
            let f = args[1].clone();
            let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
            for v in arr {
                let key = display_value(&call_value(&f, vec![v.clone()], ctx)?);
                match groups.iter_mut().find(|(k, _)| k == &key) {
                    Some((_, bucket)) => bucket.push(v),
                    None => groups.push((key, vec![v])),
                }
            }
            Ok(Value::object(
                groups.into_iter().map(|(k, vs)| (k, Value::array(vs))).collect(),
            ))
        }
        "push" | "append" => {
            let mut arr = expect_array(&args, 0, name)?;
            arr.push(args[1].clone());
            Ok(Value::array(arr))
        }
        "pop" => {
            let mut arr = expect_array(&args, 0, name)?;
            arr.pop();
            Ok(Value::array(arr))
        }
        "shift" => {
            let mut arr = expect_array(&args, 0, name)?;
            if !arr.is_empty() {
                arr.remove(0);
            }
            Ok(Value::array(arr))
        }
        "unshift" | "prepend" => {
            let mut arr = expect_array(&args, 0, name)?;
            arr.insert(0, args[1].clone());
            Ok(Value::array(arr))
        }

        // ---- string ----
        "upper" | "uppercase" => Ok(Value::String(expect_string(&args, 0, name)?.to_uppercase())),
        "lower" | "lowercase" => Ok(Value::String(expect_string(&args, 0, name)?.to_lowercase())),
        "trim" => Ok(Value::String(expect_string(&args, 0, name)?.trim().to_string())),
        "capitalize" => {
            let s = expect_string(&args, 0, name)?;
            let mut chars = s.chars();
            Ok(Value::String(match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => s,
            }))
        }
        "substr" => {
            let s = expect_string(&args, 0, name)?;
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(&args, chars.len(), name)?;
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        "charAt" => {
            let s = expect_string(&args, 0, name)?;
            let idx = expect_number(&args, 1, name)?.to_string().parse::<usize>().unwrap_or(usize::MAX);
            Ok(Value::String(s.chars().nth(idx).map(|c| c.to_string()).unwrap_or_default()))
        }
        "indexOf" => {
            let s = expect_string(&args, 0, name)?;
            let needle = expect_string(&args, 1, name)?;
            let idx = s.find(needle.as_str()).map(|byte_idx| s[..byte_idx].chars().count() as i64).unwrap_or(-1);
            Ok(Value::number(Decimal::from(idx)))
        }
        "lastIndexOf" => {
            let s = expect_string(&args, 0, name)?;
            let needle = expect_string(&args, 1, name)?;
            let idx = s.rfind(needle.as_str()).map(|byte_idx| s[..byte_idx].chars().count() as i64).unwrap_or(-1);
            Ok(Value::number(Decimal::from(idx)))
        }
        "format" => {
            let template = expect_string(&args, 0, name)?;
            let mut out = String::with_capacity(template.len());
            let mut rest = &args[1..];
            let mut chars = template.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '{' && chars.peek() == Some(&'}') {
                    chars.next();
                    if let Some((first, tail)) = rest.split_first() {
                        out.push_str(&display_value(first));
                        rest = tail;
                    }
                } else {
                    out.push(c);
                }
            }
            Ok(Value::String(out))
        }
        "split" => {
            let s = expect_string(&args, 0, name)?;
            let sep = expect_string(&args, 1, name)?;
            let parts = s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect();
            Ok(Value::array(parts))
        }
        "join" => {
            let arr = expect_array(&args, 0, name)?;
            let sep = expect_string(&args, 1, name)?;
            let parts: Vec<String> = arr.iter().map(display_value).collect();
            Ok(Value::String(parts.join(&sep)))
        }
        "contains" | "includes" => {
            let s = expect_string(&args, 0, name)?;
            let needle = expect_string(&args, 1, name)?;
            Ok(Value::Boolean(s.contains(needle.as_str())))
        }
        "startsWith" => {
            let s = expect_string(&args, 0, name)?;
            let needle = expect_string(&args, 1, name)?;
            Ok(Value::Boolean(s.starts_with(needle.as_str())))
        }
        "endsWith" => {
            let s = expect_string(&args, 0, name)?;
            let needle = expect_string(&args, 1, name)?;
            Ok(Value::Boolean(s.ends_with(needle.as_str())))
        }
        "replace" => {
            let s = expect_string(&args, 0, name)?;
            let from = expect_string(&args, 1, name)?;
            let to = expect_string(&args, 2, name)?;
            Ok(Value::String(s.replacen(from.as_str(), &to, 1)))
        }
        "replaceAll" => {
            let s = expect_string(&args, 0, name)?;
            let from = expect_string(&args, 1, name)?;
            let to = expect_string(&args, 2, name)?;
            Ok(Value::String(s.replace(from.as_str(), &to)))
        }
        "repeat" => {
            let s = expect_string(&args, 0, name)?;
            let n = expect_number(&args, 1, name)?;
            let count = n.to_string().parse::<usize>().unwrap_or(0);
            Ok(Value::String(s.repeat(count)))
        }
        "padLeft" | "padstart" => pad(&args, name, true),
        "padRight" | "padend" => pad(&args, name, false),
        "toString" => Ok(Value::String(display_value(&args[0]))),

        // ---- object ----
        "keys" => {
            let obj = expect_object(&args, 0, name)?;
            Ok(Value::array(obj.into_iter().map(|(k, _)| Value::String(k)).collect()))
        }
        "values" => {
            let obj = expect_object(&args, 0, name)?;
            Ok(Value::array(obj.into_iter().map(|(_, v)| v).collect()))
        }
        "entries" => {
            let obj = expect_object(&args, 0, name)?;
            Ok(Value::array(
                obj.into_iter()
                    .map(|(k, v)| Value::array(vec![Value::String(k), v]))
                    .collect(),
            ))
        }
        "has" => {
            let obj = expect_object(&args, 0, name)?;
            let key = expect_string(&args, 1, name)?;
            Ok(Value::Boolean(obj.iter().any(|(k, _)| k == &key)))
        }

        // ---- type inspection ----
        "type" => Ok(Value::String(args[0].type_name().to_string())),
        "unit" => match &args[0] {
            Value::Quantity { dimensions, .. } => Ok(Value::String(dimensions.to_string())),
            _ => Ok(Value::Null),
        },
        "timezone" => match &args[0] {
            Value::Date { timezone, .. } => {
                Ok(Value::String(timezone.clone().unwrap_or_else(|| "local".to_string())))
            }
            other => Err(EvalError::TypeMismatch {
                expected: "date".to_string(),
                got: other.type_name().to_string(),
            }),
        },

        // ---- environment ----
        "env" => {
            let key = expect_string(&args, 0, name)?;
            Ok(std::env::var(&key).map(Value::String).unwrap_or(Value::Null))
        }
        "arg" => {
            let raw = ctx.stdin.clone().or_else(|| ctx.cli_arg.clone());
            Ok(match raw {
                None => Value::Null,
                Some(s) => json_to_value(&s).unwrap_or(Value::String(s)),
            })
        }

        // ---- higher-order ----
        "map" => {
            let arr = expect_array(&args, 0, name)?;
            let f = args[1].clone();
            let mut out = Vec::with_capacity(arr.len());
            for v in arr {
                out.push(call_value(&f, vec![v], ctx)?);
            }
            Ok(Value::array(out))
        }
        "filter" => {
            let arr = expect_array(&args, 0, name)?;
            let f = args[1].clone();
            let mut out = Vec::new();
            for v in arr {
                if call_value(&f, vec![v.clone()], ctx)?.is_truthy() {
                    out.push(v);
                }
            }
            Ok(Value::array(out))
        }
        "find" => {
            let arr = expect_array(&args, 0, name)?;
            let f = args[1].clone();
            for v in arr {
                if call_value(&f, vec![v.clone()], ctx)?.is_truthy() {
                    return Ok(v);
                }
            }
            Ok(Value::Null)
        }
        "every" => {
            let arr = expect_array(&args, 0, name)?;
            let f = args[1].clone();
            for v in arr {
                if !call_value(&f, vec![v], ctx)?.is_truthy() {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }
        "some" => {
            let arr = expect_array(&args, 0, name)?;
            let f = args[1].clone();
            for v in arr {
                if call_value(&f, vec![v], ctx)?.is_truthy() {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }
        "reduce" => {
            let arr = expect_array(&args, 0, name)?;
            let f = args[1].clone();
            let mut acc = args[2].clone();
            for v in arr {
                acc = call_value(&f, vec![acc, v], ctx)?;
            }
            Ok(acc)
        }
        "agg" => {
            // agg(initial, reducer) folds over the previous-results window;
            // threaded in from eval.rs since only it has access to history.
            Err(EvalError::Other("agg must be called through the evaluator's aggregate path".to_string()))
        }

        // ---- mutating (`!`) variants: the fixed allow-list of sequence
        // operations that mutate the array's shared backing store in place,
        // returning the (now-mutated) array itself.
        "push!" | "append!" => {
            let arr = expect_array_rc(&args, 0, name)?;
            arr.borrow_mut().push(args[1].clone());
            Ok(Value::Array(arr))
        }
        "pop!" => {
            let arr = expect_array_rc(&args, 0, name)?;
            arr.borrow_mut().pop();
            Ok(Value::Array(arr))
        }
        "shift!" => {
            let arr = expect_array_rc(&args, 0, name)?;
            let mut b = arr.borrow_mut();
            if !b.is_empty() {
                b.remove(0);
            }
            drop(b);
            Ok(Value::Array(arr))
        }
        "unshift!" | "prepend!" => {
            let arr = expect_array_rc(&args, 0, name)?;
            arr.borrow_mut().insert(0, args[1].clone());
            Ok(Value::Array(arr))
        }
        "slice!" => {
            let arr = expect_array_rc(&args, 0, name)?;
            let len = arr.borrow().len();
            let (start, end) = slice_bounds(&args, len, name)?;
            let mut b = arr.borrow_mut();
            *b = b[start..end].to_vec();
            drop(b);
            Ok(Value::Array(arr))
        }
        "filter!" => {
            let arr = expect_array_rc(&args, 0, name)?;
            let f = args[1].clone();
            let items = arr.borrow().clone();
            let mut kept = Vec::new();
            for v in items {
                if call_value(&f, vec![v.clone()], ctx)?.is_truthy() {
                    kept.push(v);
                }
            }
            *arr.borrow_mut() = kept;
            Ok(Value::Array(arr))
        }
        "map!" => {
            let arr = expect_array_rc(&args, 0, name)?;
            let f = args[1].clone();
            let items = arr.borrow().clone();
            let mut mapped = Vec::with_capacity(items.len());
            for v in items {
                mapped.push(call_value(&f, vec![v], ctx)?);
            }
            *arr.borrow_mut() = mapped;
            Ok(Value::Array(arr))
        }

        _ => Err(EvalError::UndefinedFunction(name.to_string())),
    }
}

fn num1(args: &[Value], name: &str, f: impl FnOnce(Decimal) -> Decimal) -> Result<Value, EvalError> {
    Ok(Value::number(f(expect_number(args, 0, name)?)))
}

/// Math functions without an exact `Decimal` implementation (roots, logs,
/// trig/hyperbolic) round-trip through `f64` at the evaluator's configured
/// precision. These strip any unit the argument carried.
fn trig1(
    args: &[Value],
    ctx: &EvaluationContext,
    name: &str,
    f: impl FnOnce(f64) -> f64,
) -> Result<Value, EvalError> {
    let d = expect_number(args, 0, name)?;
    Ok(Value::number(ctx.precision.via_f64(d, f)))
}

fn expect_number(args: &[Value], idx: usize, name: &str) -> Result<Decimal, EvalError> {
    match args.get(idx) {
        Some(Value::Number { value, .. }) => Ok(*value),
        Some(Value::Percentage { value }) => Ok(*value),
        Some(Value::Quantity { value, .. }) => Ok(*value),
        Some(other) => Err(EvalError::TypeMismatch {
            expected: format!("number (argument {} of {})", idx + 1, name),
            got: other.type_name().to_string(),
        }),
        None => Err(EvalError::ArityMismatch {
            name: name.to_string(),
            expected: idx + 1,
            got: args.len(),
        }),
    }
}

fn expect_string(args: &[Value], idx: usize, name: &str) -> Result<String, EvalError> {
    match args.get(idx) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(EvalError::TypeMismatch {
            expected: format!("string (argument {} of {})", idx + 1, name),
            got: other.type_name().to_string(),
        }),
        None => Err(EvalError::ArityMismatch {
            name: name.to_string(),
            expected: idx + 1,
            got: args.len(),
        }),
    }
}

fn expect_array(args: &[Value], idx: usize, name: &str) -> Result<Vec<Value>, EvalError> {
    Ok(expect_array_rc(args, idx, name)?.borrow().clone())
}

fn expect_array_rc(
    args: &[Value],
    idx: usize,
    name: &str,
) -> Result<std::rc::Rc<std::cell::RefCell<Vec<Value>>>, EvalError> {
    match args.get(idx) {
        Some(Value::Array(a)) => Ok(a.clone()),
        Some(other) => Err(EvalError::TypeMismatch {
            expected: format!("array (argument {} of {})", idx + 1, name),
            got: other.type_name().to_string(),
        }),
        None => Err(EvalError::ArityMismatch {
            name: name.to_string(),
            expected: idx + 1,
            got: args.len(),
        }),
    }
}

fn expect_object(args: &[Value], idx: usize, name: &str) -> Result<Vec<(String, Value)>, EvalError> {
    Ok(expect_object_rc(args, idx, name)?.borrow().clone())
}

fn expect_object_rc(
    args: &[Value],
    idx: usize,
    name: &str,
) -> Result<std::rc::Rc<std::cell::RefCell<Vec<(String, Value)>>>, EvalError> {
    match args.get(idx) {
        Some(Value::Object(o)) => Ok(o.clone()),
        Some(other) => Err(EvalError::TypeMismatch {
            expected: format!("object (argument {} of {})", idx + 1, name),
            got: other.type_name().to_string(),
        }),
        None => Err(EvalError::ArityMismatch {
            name: name.to_string(),
            expected: idx + 1,
            got: args.len(),
        }),
    }
}

/// Clamp a `slice`/`slice!` start/optional-end pair into `0..=len`, with the
/// end defaulting to `len` and never landing before the start.
fn slice_bounds(args: &[Value], len: usize, name: &str) -> Result<(usize, usize), EvalError> {
    let start = expect_number(args, 1, name)?
        .to_string()
        .parse::<usize>()
        .unwrap_or(0)
        .min(len);
    let end = match args.get(2) {
        Some(_) => expect_number(args, 2, name)?
            .to_string()
            .parse::<usize>()
            .unwrap_or(len)
            .min(len),
        None => len,
    };
    Ok((start, end.max(start)))
}

fn pad(args: &[Value], name: &str, left: bool) -> Result<Value, EvalError> {
    let s = expect_string(args, 0, name)?;
    let width = expect_number(args, 1, name)?.to_string().parse::<usize>().unwrap_or(0);
    let fill = expect_string(args, 2, name)?;
    let fill_char = fill.chars().next().unwrap_or(' ');
    let missing = width.saturating_sub(s.chars().count());
    let padding: String = std::iter::repeat(fill_char).take(missing).collect();
    Ok(Value::String(if left {
        format!("{padding}{s}")
    } else {
        format!("{s}{padding}")
    }))
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number { value, .. } => value.to_string(),
        Value::Percentage { value } => format!("{value}%"),
        Value::Boolean(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => format!("{other:?}"),
    }
}

pub(crate) fn decimal_pow(base: Decimal, exp: Decimal) -> Decimal {
    if exp == exp.trunc() && exp >= Decimal::ZERO {
        let n: u64 = exp.to_string().parse().unwrap_or(0);
        let mut acc = Decimal::ONE;
        for _ in 0..n {
            acc *= base;
        }
        acc
    } else if exp == exp.trunc() {
        let n: u64 = (-exp).to_string().parse().unwrap_or(0);
        let mut acc = Decimal::ONE;
        for _ in 0..n {
            acc *= base;
        }
        Decimal::ONE / acc
    } else {
        let b: f64 = base.to_string().parse().unwrap_or(0.0);
        let e: f64 = exp.to_string().parse().unwrap_or(0.0);
        b.powf(e).to_string().parse().unwrap_or_default()
    }
}

fn sort_values(items: &mut [Value]) -> Result<(), EvalError> {
    let mut err = None;
    items.sort_by(|a, b| match (a, b) {
        (Value::Number { value: x, .. }, Value::Number { value: y, .. }) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => {
            err = Some(EvalError::TypeMismatch {
                expected: "comparable elements (all numbers or all strings)".to_string(),
                got: format!("{} / {}", a.type_name(), b.type_name()),
            });
            Ordering::Equal
        }
    });
    match err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn dedup_values(items: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for v in items {
        if !out.iter().any(|existing| existing.structural_eq(&v)) {
            out.push(v);
        }
    }
    out
}

/// `arg()`'s "attempt JSON decode, fall back to string" rule.
fn json_to_value(s: &str) -> Option<Value> {
    let parsed: serde_json::Value = serde_json::from_str(s).ok()?;
    Some(from_json(parsed))
}

fn from_json(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => Value::number(n.to_string().parse().unwrap_or_default()),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::array(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            Value::object(map.into_iter().map(|(k, v)| (k, from_json(v))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EvaluationContext;
    use rust_decimal_macros::dec;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new("UTC")
    }

    fn num(v: Decimal) -> Value {
        Value::number(v)
    }

    fn as_number(v: &Value) -> Decimal {
        match v {
            Value::Number { value, .. } => *value,
            other => panic!("expected Number, got {other:?}"),
        }
    }

    #[test]
    fn test_arity_table_partial_application_candidates() {
        assert_eq!(builtin_arity("abs"), Some(1));
        assert_eq!(builtin_arity("clamp"), Some(3));
        assert_eq!(builtin_arity("agg"), Some(2));
        assert_eq!(builtin_arity("range"), Some(2));
        assert_eq!(builtin_arity("toString"), Some(1));
    }

    #[test]
    fn test_math_builtins() {
        let mut c = ctx();
        assert_eq!(as_number(&call_builtin("abs", vec![num(dec!(-5))], &mut c).unwrap()), dec!(5));
        assert_eq!(as_number(&call_builtin("floor", vec![num(dec!(1.9))], &mut c).unwrap()), dec!(1));
        assert_eq!(as_number(&call_builtin("ceil", vec![num(dec!(1.1))], &mut c).unwrap()), dec!(2));
        assert_eq!(
            as_number(&call_builtin("clamp", vec![num(dec!(15)), num(dec!(0)), num(dec!(10))], &mut c).unwrap()),
            dec!(10)
        );
    }

    #[test]
    fn test_sqrt_of_negative_is_domain_error() {
        let mut c = ctx();
        let err = call_builtin("sqrt", vec![num(dec!(-4))], &mut c).unwrap_err();
        assert!(matches!(err, EvalError::Domain(_)));
    }

    #[test]
    fn test_decimal_pow_integer_and_negative_exponents() {
        assert_eq!(decimal_pow(dec!(2), dec!(10)), dec!(1024));
        assert_eq!(decimal_pow(dec!(2), dec!(-1)), dec!(0.5));
    }

    #[test]
    fn test_push_mutates_shared_backing_array() {
        let mut c = ctx();
        let arr = Value::array(vec![num(dec!(1))]);
        let result = call_builtin("push!", vec![arr.clone(), num(dec!(2))], &mut c).unwrap();
        match (&arr, &result) {
            (Value::Array(orig), Value::Array(returned)) => {
                assert_eq!(orig.borrow().len(), 2);
                assert!(std::rc::Rc::ptr_eq(orig, returned));
            }
            _ => panic!("expected arrays"),
        }
    }

    #[test]
    fn test_unique_dedups_by_structural_eq() {
        let mut c = ctx();
        let arr = Value::array(vec![num(dec!(1)), num(dec!(1)), num(dec!(2))]);
        let result = call_builtin("unique", vec![arr], &mut c).unwrap();
        match result {
            Value::Array(a) => assert_eq!(a.borrow().len(), 2),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_sort_rejects_mixed_types() {
        let mut c = ctx();
        let arr = Value::array(vec![num(dec!(1)), Value::String("a".to_string())]);
        let err = call_builtin("sort", vec![arr], &mut c).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }

    #[test]
    fn test_string_builtins() {
        let mut c = ctx();
        assert!(matches!(
            call_builtin("upper", vec![Value::String("abc".to_string())], &mut c).unwrap(),
            Value::String(s) if s == "ABC"
        ));
        assert!(matches!(
            call_builtin(
                "startsWith",
                vec![Value::String("hello".to_string()), Value::String("he".to_string())],
                &mut c
            )
            .unwrap(),
            Value::Boolean(true)
        ));
    }

    #[test]
    fn test_missing_argument_is_arity_mismatch() {
        let mut c = ctx();
        let err = call_builtin("abs", vec![], &mut c).unwrap_err();
        assert!(matches!(err, EvalError::ArityMismatch { expected: 1, got: 0, .. }));
    }

    #[test]
    fn test_unknown_builtin_is_undefined_function() {
        let mut c = ctx();
        let err = call_builtin("frobnicate", vec![], &mut c).unwrap_err();
        assert!(matches!(err, EvalError::UndefinedFunction(n) if n == "frobnicate"));
    }

    #[test]
    fn test_cbrt_and_fact() {
        let mut c = ctx();
        assert_eq!(as_number(&call_builtin("cbrt", vec![num(dec!(27))], &mut c).unwrap()), dec!(3));
        assert_eq!(as_number(&call_builtin("fact", vec![num(dec!(5))], &mut c).unwrap()), dec!(120));
    }

    #[test]
    fn test_slice_clamps_bounds() {
        let mut c = ctx();
        let arr = Value::array(vec![num(dec!(1)), num(dec!(2)), num(dec!(3)), num(dec!(4))]);
        let result = call_builtin("slice", vec![arr, num(dec!(1)), num(dec!(3))], &mut c).unwrap();
        match result {
            Value::Array(a) => assert_eq!(a.borrow().len(), 2),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_find_index_returns_negative_one_when_absent() {
        let mut c = ctx();
        let arr = Value::array(vec![num(dec!(1)), num(dec!(2))]);
        let span = linecalc_core::ast::Span { start: 0, end: 0, line: 0, col: 0 };
        let is_three = Value::Function(std::rc::Rc::new(linecalc_core::FunctionDef {
            name: None,
            params: vec!["x".to_string()],
            body: linecalc_core::ast::Expr::Bool(false, span),
            captured_env: linecalc_core::Environment::new(),
        }));
        let result = call_builtin("findIndex", vec![arr, is_three], &mut c).unwrap();
        assert_eq!(as_number(&result), -Decimal::ONE);
    }

    #[test]
    fn test_substr_and_capitalize() {
        let mut c = ctx();
        let s = Value::String("hello".to_string());
        assert!(matches!(
            call_builtin("substr", vec![s.clone(), num(dec!(1)), num(dec!(3))], &mut c).unwrap(),
            Value::String(s) if s == "el"
        ));
        assert!(matches!(
            call_builtin("capitalize", vec![s], &mut c).unwrap(),
            Value::String(s) if s == "Hello"
        ));
    }

    #[test]
    fn test_replace_single_vs_replace_all() {
        let mut c = ctx();
        let s = Value::String("a-a-a".to_string());
        let dash = Value::String("-".to_string());
        let slash = Value::String("/".to_string());
        assert!(matches!(
            call_builtin("replace", vec![s.clone(), dash.clone(), slash.clone()], &mut c).unwrap(),
            Value::String(s) if s == "a/a-a"
        ));
        assert!(matches!(
            call_builtin("replaceAll", vec![s, dash, slash], &mut c).unwrap(),
            Value::String(s) if s == "a/a/a"
        ));
    }

    #[test]
    fn test_format_consumes_positional_args() {
        let mut c = ctx();
        let template = Value::String("{} and {}".to_string());
        let result = call_builtin(
            "format",
            vec![template, Value::String("a".to_string()), Value::String("b".to_string())],
            &mut c,
        )
        .unwrap();
        assert!(matches!(result, Value::String(s) if s == "a and b"));
    }

    #[test]
    fn test_unit_and_timezone_inspection() {
        let mut c = ctx();
        let q = Value::Quantity {
            value: dec!(5),
            dimensions: linecalc_core::DimensionMap::single(linecalc_core::Dimension::Mass, "kg", 1),
        };
        assert!(matches!(call_builtin("unit", vec![q], &mut c).unwrap(), Value::String(s) if s == "kg"));
        assert!(matches!(call_builtin("unit", vec![num(dec!(1))], &mut c).unwrap(), Value::Null));
    }

    #[test]
    fn test_env_returns_null_for_unset_variable() {
        let mut c = ctx();
        let result = call_builtin("env", vec![Value::String("LINECALC_TEST_UNSET_VAR_XYZ".to_string())], &mut c).unwrap();
        assert!(matches!(result, Value::Null));
    }

    #[test]
    fn test_arg_parses_json_and_falls_back_to_string() {
        let mut c = ctx();
        c.cli_arg = Some("42".to_string());
        assert_eq!(as_number(&call_builtin("arg", vec![], &mut c).unwrap()), dec!(42));

        let mut c2 = ctx();
        c2.cli_arg = Some("not json".to_string());
        assert!(matches!(
            call_builtin("arg", vec![], &mut c2).unwrap(),
            Value::String(s) if s == "not json"
        ));
    }

    #[test]
    fn test_mutating_allow_list_matches_fixed_set() {
        assert_eq!(builtin_arity("push!"), Some(2));
        assert_eq!(builtin_arity("pop!"), Some(1));
        assert_eq!(builtin_arity("shift!"), Some(1));
        assert_eq!(builtin_arity("unshift!"), Some(2));
        assert_eq!(builtin_arity("append!"), Some(2));
        assert_eq!(builtin_arity("prepend!"), Some(2));
        assert_eq!(builtin_arity("filter!"), Some(2));
        assert_eq!(builtin_arity("map!"), Some(2));
        assert_eq!(builtin_arity("reverse!"), None);
        assert_eq!(builtin_arity("sort!"), None);
        assert_eq!(builtin_arity("unique!"), None);
        assert_eq!(builtin_arity("set!"), None);
        assert_eq!(builtin_arity("delete!"), None);
    }

    #[test]
    fn test_pop_bang_mutates_and_returns_the_array_itself() {
        let mut c = ctx();
        let arr = Value::array(vec![num(dec!(1)), num(dec!(2))]);
        let result = call_builtin("pop!", vec![arr.clone()], &mut c).unwrap();
        match (&arr, &result) {
            (Value::Array(orig), Value::Array(returned)) => {
                assert_eq!(orig.borrow().len(), 1);
                assert!(std::rc::Rc::ptr_eq(orig, returned));
            }
            _ => panic!("expected arrays"),
        }
    }
}
