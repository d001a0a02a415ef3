//! The tagged `Value` union.

use crate::ast::Expr;
use crate::dimension::DimensionMap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Environment: variable name to `Value`. Function values carry a snapshot
/// of the environment active at their definition site.
pub type Environment = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberFormat {
    Binary,
    Hex,
}

/// A user-defined function or lambda.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Expr,
    #[serde(skip)]
    pub captured_env: Environment,
}

/// The callable half of a `Partial` — either a user function/lambda or the
/// name of a registered built-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Callable {
    User(Rc<FunctionDef>),
    Builtin(String),
}

impl Callable {
    pub fn arity(&self, builtin_arity: impl Fn(&str) -> Option<usize>) -> Option<usize> {
        match self {
            Callable::User(f) => Some(f.params.len()),
            Callable::Builtin(name) => builtin_arity(name),
        }
    }
}

/// Runtime values.
///
/// `Array`/`Object` share their backing store via `Rc<RefCell<..>>` so that
/// mutating built-ins (`push!`, `pop!`, ...) can mutate in place; the
/// notebook engine's deep-clone barrier is what keeps that
/// safe across recomputation rather than reference semantics here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Number {
        value: Decimal,
        format: Option<NumberFormat>,
    },
    Percentage {
        value: Decimal,
    },
    Quantity {
        value: Decimal,
        dimensions: DimensionMap,
    },
    String(String),
    Boolean(bool),
    Null,
    Date {
        instant: DateTime<Utc>,
        timezone: Option<String>,
        has_time_component: bool,
    },
    #[serde(skip)]
    Array(Rc<RefCell<Vec<Value>>>),
    #[serde(skip)]
    Object(Rc<RefCell<Vec<(String, Value)>>>),
    #[serde(skip)]
    Function(Rc<FunctionDef>),
    #[serde(skip)]
    Partial {
        underlying: Callable,
        applied_args: Vec<Value>,
        remaining_params: Vec<String>,
    },
    Markdown(String),
}

impl Value {
    pub fn number(value: Decimal) -> Self {
        Value::Number {
            value,
            format: None,
        }
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(entries: Vec<(String, Value)>) -> Self {
        Value::Object(Rc::new(RefCell::new(entries)))
    }

    /// The tag name as produced by `type(v)` and matched by `is <tag>`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number { .. } => "number",
            Value::Percentage { .. } => "percentage",
            Value::Quantity { .. } => "quantity",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Null => "null",
            Value::Date { .. } => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Partial { .. } => "function",
            Value::Markdown(_) => "markdown",
        }
    }

    /// Falsy set: `false`, `null`, `0`, `""`, empty array/object.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Null => false,
            Value::Number { value, .. } => !value.is_zero(),
            Value::Percentage { value } => !value.is_zero(),
            Value::Quantity { value, .. } => !value.is_zero(),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.borrow().is_empty(),
            Value::Object(o) => !o.borrow().is_empty(),
            _ => true,
        }
    }

    /// The deep-clone barrier: copies reachable
    /// mutable substructure so a later in-place mutation on one side is
    /// never observed on the other. Value types (numbers, strings, dates,
    /// booleans) are cheap to clone already and need no special handling.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Array(items) => {
                let cloned: Vec<Value> = items.borrow().iter().map(|v| v.deep_clone()).collect();
                Value::array(cloned)
            }
            Value::Object(entries) => {
                let cloned: Vec<(String, Value)> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone()))
                    .collect();
                Value::object(cloned)
            }
            Value::Function(f) => Value::Function(Rc::new(FunctionDef {
                name: f.name.clone(),
                params: f.params.clone(),
                body: f.body.clone(),
                captured_env: f
                    .captured_env
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone()))
                    .collect(),
            })),
            Value::Partial {
                underlying,
                applied_args,
                remaining_params,
            } => Value::Partial {
                underlying: underlying.clone(),
                applied_args: applied_args.iter().map(|v| v.deep_clone()).collect(),
                remaining_params: remaining_params.clone(),
            },
            other => other.clone(),
        }
    }

    /// Structural equality used by "value differs" comparisons in the
    /// notebook engine and by the `==`/`!=` operators.
    pub fn structural_eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Number { value: a, .. }, Number { value: b, .. }) => a == b,
            (Percentage { value: a }, Percentage { value: b }) => a == b,
            (
                Quantity {
                    value: a,
                    dimensions: da,
                },
                Quantity {
                    value: b,
                    dimensions: db,
                },
            ) => a == b && da == db,
            (String(a), String(b)) => a == b,
            (Boolean(a), Boolean(b)) => a == b,
            (Null, Null) => true,
            (
                Date {
                    instant: ia,
                    timezone: ta,
                    has_time_component: ha,
                },
                Date {
                    instant: ib,
                    timezone: tb,
                    has_time_component: hb,
                },
            ) => ia == ib && ta == tb && ha == hb,
            (Array(a), Array(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.structural_eq(y))
            }
            (Object(a), Object(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter()
                            .find(|(k2, _)| k2 == k)
                            .map(|(_, v2)| v.structural_eq(v2))
                            .unwrap_or(false)
                    })
            }
            (Markdown(a), Markdown(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_structural_eq_ignores_number_format() {
        let a = Value::Number { value: dec!(255), format: Some(NumberFormat::Hex) };
        let b = Value::Number { value: dec!(255), format: None };
        assert!(a.structural_eq(&b));
    }

    #[test]
    fn test_structural_eq_arrays_by_value() {
        let a = Value::array(vec![Value::number(dec!(1)), Value::number(dec!(2))]);
        let b = Value::array(vec![Value::number(dec!(1)), Value::number(dec!(2))]);
        assert!(a.structural_eq(&b));
    }

    #[test]
    fn test_structural_eq_rejects_mismatched_types() {
        assert!(!Value::number(dec!(1)).structural_eq(&Value::String("1".to_string())));
    }

    #[test]
    fn test_deep_clone_array_is_isolated() {
        let original = Value::array(vec![Value::number(dec!(1))]);
        let cloned = original.deep_clone();
        if let (Value::Array(o), Value::Array(c)) = (&original, &cloned) {
            o.borrow_mut().push(Value::number(dec!(2)));
            assert_eq!(c.borrow().len(), 1);
        } else {
            panic!("expected arrays");
        }
    }

    #[test]
    fn test_is_truthy_falsy_set() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::number(dec!(0)).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::array(vec![]).is_truthy());
        assert!(Value::number(dec!(1)).is_truthy());
    }

    #[test]
    fn test_type_name() {
        assert_eq!(Value::number(dec!(1)).type_name(), "number");
        assert_eq!(Value::array(vec![]).type_name(), "array");
        assert_eq!(Value::Null.type_name(), "null");
    }
}
