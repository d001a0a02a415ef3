//! Abstract syntax tree shared by the lexer/parser (`linecalc-lang`) and the
//! evaluator (`linecalc-rt`). Lives in `linecalc-core` (rather than
//! `linecalc-lang`) because `Value::Function` embeds a body `Expr` and
//! `linecalc-core` must not depend on the parser crate.

use serde::{Deserialize, Serialize};

/// Source location: byte offsets plus 1-based line/col.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, col: usize) -> Self {
        Self {
            start,
            end,
            line,
            col,
        }
    }

    pub fn dummy() -> Self {
        Self {
            start: 0,
            end: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
            col: if self.line <= other.line {
                self.col
            } else {
                other.col
            },
        }
    }
}

/// One notebook line's parsed form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Line {
    Assignment {
        name: String,
        value: Expr,
        span: Span,
    },
    FuncDef {
        name: String,
        params: Vec<String>,
        body: Expr,
        span: Span,
    },
    Expr(Expr),
    Comment,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    NullCoalesce,
    BitAnd,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
}

/// Target of a `to`/`in`/`as` conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConvertTarget {
    /// A (possibly compound) unit expression, or a timezone name when the
    /// source is a `Date`.
    UnitOrZone(String),
    /// `number`, `string`, `boolean`, `object`, `array`.
    Type(String),
    Binary,
    Hex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ObjectKey {
    Static(String),
    Computed(Expr),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StringSegment {
    Literal(String),
    Interpolation(Expr),
}

/// A raw literal date/time component set, as written by the user. Resolved
/// against a `TimeSource`/timezone table by the evaluator, not the parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateLiteral {
    pub day: Option<u32>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub timezone: Option<String>,
    pub has_time_component: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Number {
        value: rust_decimal::Decimal,
        radix: Option<crate::value::NumberFormat>,
        span: Span,
    },
    Quantity {
        value: rust_decimal::Decimal,
        unit: String,
        span: Span,
    },
    Percentage {
        value: rust_decimal::Decimal,
        span: Span,
    },
    Str(String, Span),
    StringTemplate(Vec<StringSegment>, Span),
    Bool(bool, Span),
    Null(Span),
    DateLit(DateLiteral, Span),
    Array(Vec<Expr>, Span),
    Object(Vec<(ObjectKey, Expr)>, Span),
    Ident(String, Span),
    Unary(UnOp, Box<Expr>, Span),
    Binary(BinOp, Box<Expr>, Box<Expr>, Span),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>, Span),
    Pipe(Box<Expr>, Box<Expr>, Span),
    Call(Box<Expr>, Vec<Expr>, Span),
    Index(Box<Expr>, Box<Expr>, Span),
    Member(Box<Expr>, String, Span),
    Convert(Box<Expr>, ConvertTarget, Span),
    IsCheck(Box<Expr>, String, Span),
    Percent(Box<Expr>, Span),
    Lambda(Vec<String>, Box<Expr>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Number { span, .. }
            | Expr::Quantity { span, .. }
            | Expr::Percentage { span, .. }
            | Expr::Str(_, span)
            | Expr::StringTemplate(_, span)
            | Expr::Bool(_, span)
            | Expr::Null(span)
            | Expr::DateLit(_, span)
            | Expr::Array(_, span)
            | Expr::Object(_, span)
            | Expr::Ident(_, span)
            | Expr::Unary(_, _, span)
            | Expr::Binary(_, _, _, span)
            | Expr::Ternary(_, _, _, span)
            | Expr::Pipe(_, _, span)
            | Expr::Call(_, _, span)
            | Expr::Index(_, _, span)
            | Expr::Member(_, _, span)
            | Expr::Convert(_, _, span)
            | Expr::IsCheck(_, _, span)
            | Expr::Percent(_, span)
            | Expr::Lambda(_, _, span) => *span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_merge_takes_min_start_max_end() {
        let a = Span::new(5, 10, 1, 6);
        let b = Span::new(2, 8, 1, 3);
        let merged = a.merge(b);
        assert_eq!(merged.start, 2);
        assert_eq!(merged.end, 10);
    }

    #[test]
    fn test_span_merge_col_follows_earlier_line() {
        let line1 = Span::new(0, 1, 1, 20);
        let line2 = Span::new(10, 11, 2, 1);
        let merged = line1.merge(line2);
        assert_eq!(merged.line, 1);
        assert_eq!(merged.col, 20);
    }

    #[test]
    fn test_expr_span_returns_inner_span_for_each_variant() {
        let s = Span::new(0, 3, 1, 1);
        let e = Expr::Number {
            value: rust_decimal::Decimal::ONE,
            radix: None,
            span: s,
        };
        assert_eq!(e.span(), s);

        let inner = Box::new(Expr::Bool(true, s));
        let unary = Expr::Unary(UnOp::Not, inner, Span::new(0, 4, 1, 1));
        assert_eq!(unary.span().start, 0);
        assert_eq!(unary.span().end, 4);
    }
}
