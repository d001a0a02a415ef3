use linecalc_core::ast::{DateLiteral, Span};
use linecalc_core::value::NumberFormat;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    NumberLit {
        value: rust_decimal::Decimal,
        format: Option<NumberFormat>,
    },
    QuantityLit {
        value: rust_decimal::Decimal,
        unit: String,
    },
    StringLit(String),
    /// `(is_expr, text)` segments for template string interpolation.
    TemplateLit(Vec<(bool, String)>),
    BoolLit(bool),
    NullLit,
    DateLit(DateLiteral),
    Ident(String),

    // Keywords
    To,
    In,
    As,
    Is,
    Not,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Amp,
    /// `|` always means pipe; this grammar has no bitwise-or spelling.
    Pipe,
    Shl,
    Shr,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    QuestionQuestion,
    Question,
    Colon,
    Assign,
    PlusAssign,
    MinusAssign,
    FatArrow,
    Dot,
    Comma,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::NumberLit { value, .. } => write!(f, "{value}"),
            TokenKind::QuantityLit { value, unit } => write!(f, "{value}{unit}"),
            TokenKind::StringLit(s) => write!(f, "\"{s}\""),
            TokenKind::TemplateLit(_) => write!(f, "template-string"),
            TokenKind::BoolLit(b) => write!(f, "{b}"),
            TokenKind::NullLit => write!(f, "null"),
            TokenKind::DateLit(_) => write!(f, "date-literal"),
            TokenKind::Ident(s) => write!(f, "{s}"),
            TokenKind::To => write!(f, "to"),
            TokenKind::In => write!(f, "in"),
            TokenKind::As => write!(f, "as"),
            TokenKind::Is => write!(f, "is"),
            TokenKind::Not => write!(f, "not"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Caret => write!(f, "^"),
            TokenKind::Amp => write!(f, "&"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::Shl => write!(f, "<<"),
            TokenKind::Shr => write!(f, ">>"),
            TokenKind::Eq => write!(f, "=="),
            TokenKind::NotEq => write!(f, "!="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::LtEq => write!(f, "<="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::GtEq => write!(f, ">="),
            TokenKind::AndAnd => write!(f, "&&"),
            TokenKind::OrOr => write!(f, "||"),
            TokenKind::QuestionQuestion => write!(f, "??"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Assign => write!(f, "="),
            TokenKind::PlusAssign => write!(f, "+="),
            TokenKind::MinusAssign => write!(f, "-="),
            TokenKind::FatArrow => write!(f, "=>"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Comma => write!(f, ","),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::Eof => write!(f, "EOF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}
