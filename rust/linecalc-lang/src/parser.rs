//! Pratt parser producing `linecalc_core::ast::{Line, Expr}` from a token
//! stream. Precedence, lowest to highest:
//!
//! ```text
//! pipe  ternary  ??  ||  &&  ==/!=  relational  &(bitand)  <</>>
//! +/-  */% (mod)  unary  ^ (pow)  postfix (to/in/as, ., [], (), %)  primary
//! ```
//!
//! `|` lexes as a single `Pipe` token everywhere and always means pipe; this
//! grammar has no bitwise-or/xor operator at all. `&`, `<<`, `>>` still work
//! as bitwise and/shift.

use crate::tokens::{Token, TokenKind};
use linecalc_core::ast::{BinOp, ConvertTarget, Expr, Line, ObjectKey, Span, StringSegment, UnOp};
use linecalc_core::tz_names;
use linecalc_core::units;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected token '{found}' at line {line}, col {col}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        line: usize,
        col: usize,
    },
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },
    #[error("invalid conversion target at line {line}, col {col}")]
    InvalidConvertTarget { line: usize, col: usize },
    #[error("{0}")]
    Other(String),
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_line(source_line: &str) -> PResult<Line> {
        let trimmed = source_line.trim();
        if trimmed.is_empty() {
            return Ok(Line::Empty);
        }
        if trimmed.starts_with('#') {
            return Ok(Line::Comment);
        }
        let tokens =
            crate::lexer::Lexer::new(source_line)
                .tokenize()
                .map_err(|e| ParseError::Other(e.to_string()))?;
        let mut parser = Parser::new(tokens);
        parser.parse_top_level_line()
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Token {
        let t = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::UnexpectedToken {
                found: self.current().kind.to_string(),
                expected: kind.to_string(),
                line: self.current().span.line,
                col: self.current().span.col,
            })
        }
    }

    fn is_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    // ---- top-level line forms ----

    fn parse_top_level_line(&mut self) -> PResult<Line> {
        // `name(params) = body` function definition
        if let TokenKind::Ident(name) = &self.current().kind {
            let name = name.clone();
            if matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::LParen)) {
                if let Some(line) = self.try_parse_funcdef(&name)? {
                    return Ok(line);
                }
            }
        }
        // `name = expr` / `name += expr` / `name -= expr`
        if let TokenKind::Ident(name) = &self.current().kind {
            let name = name.clone();
            let save = self.pos;
            self.advance();
            match &self.current().kind {
                TokenKind::Assign => {
                    self.advance();
                    let span = self.current().span;
                    let value = self.parse_expr()?;
                    return Ok(Line::Assignment {
                        name,
                        value,
                        span,
                    });
                }
                TokenKind::PlusAssign | TokenKind::MinusAssign => {
                    let op = if matches!(self.current().kind, TokenKind::PlusAssign) {
                        BinOp::Add
                    } else {
                        BinOp::Sub
                    };
                    let span = self.current().span;
                    self.advance();
                    let rhs = self.parse_expr()?;
                    let desugared = Expr::Binary(
                        op,
                        Box::new(Expr::Ident(name.clone(), span)),
                        Box::new(rhs),
                        span,
                    );
                    return Ok(Line::Assignment {
                        name,
                        value: desugared,
                        span,
                    });
                }
                _ => {
                    self.pos = save;
                }
            }
        }
        let expr = self.parse_expr()?;
        if !self.is_eof() {
            return Err(ParseError::UnexpectedToken {
                found: self.current().kind.to_string(),
                expected: "end of line".to_string(),
                line: self.current().span.line,
                col: self.current().span.col,
            });
        }
        Ok(Line::Expr(expr))
    }

    /// Tries `name(a, b, ...) = body`; backtracks (returns `Ok(None)`) if the
    /// parenthesised group turns out not to be followed by `=`, so the
    /// top-level dispatcher can fall back to parsing a plain expression
    /// (e.g. a bare function call `f(1, 2)`).
    fn try_parse_funcdef(&mut self, name: &str) -> PResult<Option<Line>> {
        let save = self.pos;
        self.advance(); // name
        self.advance(); // (
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                match &self.current().kind {
                    TokenKind::Ident(p) => {
                        params.push(p.clone());
                        self.advance();
                    }
                    _ => {
                        self.pos = save;
                        return Ok(None);
                    }
                }
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if !self.check(&TokenKind::RParen) {
            self.pos = save;
            return Ok(None);
        }
        self.advance(); // )
        if !self.check(&TokenKind::Assign) {
            self.pos = save;
            return Ok(None);
        }
        let span = self.current().span;
        self.advance(); // =
        let body = self.parse_expr()?;
        Ok(Some(Line::FuncDef {
            name: name.to_string(),
            params,
            body,
            span,
        }))
    }

    // ---- expression precedence chain ----

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_pipe()
    }

    fn parse_pipe(&mut self) -> PResult<Expr> {
        let mut left = self.parse_ternary()?;
        while self.check(&TokenKind::Pipe) {
            let span = self.current().span;
            self.advance();
            let right = self.parse_ternary()?;
            let full_span = left.span().merge(span).merge(right.span());
            left = Expr::Pipe(Box::new(left), Box::new(right), full_span);
        }
        Ok(left)
    }

    fn parse_ternary(&mut self) -> PResult<Expr> {
        let cond = self.parse_null_coalesce()?;
        if self.check(&TokenKind::Question) {
            let span = self.current().span;
            self.advance();
            let then_branch = self.parse_ternary()?;
            self.eat(TokenKind::Colon)?;
            let else_branch = self.parse_ternary()?;
            return Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then_branch),
                Box::new(else_branch),
                span,
            ));
        }
        Ok(cond)
    }

    fn parse_null_coalesce(&mut self) -> PResult<Expr> {
        let mut left = self.parse_or()?;
        while self.check(&TokenKind::QuestionQuestion) {
            let span = self.current().span;
            self.advance();
            let right = self.parse_or()?;
            left = Expr::Binary(BinOp::NullCoalesce, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::OrOr) {
            let span = self.current().span;
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.check(&TokenKind::AndAnd) {
            let span = self.current().span;
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::NotEq => BinOp::NotEq,
                _ => break,
            };
            let span = self.current().span;
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut left = self.parse_is_check()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::LtEq => BinOp::LtEq,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::GtEq => BinOp::GtEq,
                _ => break,
            };
            let span = self.current().span;
            self.advance();
            let right = self.parse_is_check()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    /// `expr is <type>` binds tighter than relational comparisons but looser
    /// than bitwise/arithmetic, so `x is number && y is string` parses as
    /// expected.
    fn parse_is_check(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitand()?;
        while self.check(&TokenKind::Is) {
            let span = self.current().span;
            self.advance();
            let not = if self.check(&TokenKind::Not) {
                self.advance();
                true
            } else {
                false
            };
            let tag = match &self.current().kind {
                TokenKind::Ident(s) => s.clone(),
                TokenKind::NullLit => "null".to_string(),
                other => {
                    return Err(ParseError::UnexpectedToken {
                        found: other.to_string(),
                        expected: "type name".to_string(),
                        line: self.current().span.line,
                        col: self.current().span.col,
                    })
                }
            };
            self.advance();
            let check = Expr::IsCheck(Box::new(left), tag, span);
            left = if not {
                Expr::Unary(UnOp::Not, Box::new(check), span)
            } else {
                check
            };
        }
        Ok(left)
    }

    fn parse_bitand(&mut self) -> PResult<Expr> {
        let mut left = self.parse_shift()?;
        while self.check(&TokenKind::Amp) {
            let span = self.current().span;
            self.advance();
            let right = self.parse_shift()?;
            left = Expr::Binary(BinOp::BitAnd, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Shl => BinOp::Shl,
                TokenKind::Shr => BinOp::Shr,
                _ => break,
            };
            let span = self.current().span;
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let span = self.current().span;
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            let span = self.current().span;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right), span);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.current().kind {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Plus => Some(UnOp::Plus),
            TokenKind::Not => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let span = self.current().span;
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(op, Box::new(operand), span));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let left = self.parse_postfix()?;
        if self.check(&TokenKind::Caret) {
            let span = self.current().span;
            self.advance();
            let right = self.parse_unary()?; // right-associative
            return Ok(Expr::Binary(BinOp::Pow, Box::new(left), Box::new(right), span));
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match &self.current().kind {
                TokenKind::Dot => {
                    let span = self.current().span;
                    self.advance();
                    let name = match &self.current().kind {
                        TokenKind::Ident(s) => s.clone(),
                        other => {
                            return Err(ParseError::UnexpectedToken {
                                found: other.to_string(),
                                expected: "member name".to_string(),
                                line: self.current().span.line,
                                col: self.current().span.col,
                            })
                        }
                    };
                    self.advance();
                    expr = Expr::Member(Box::new(expr), name, span);
                }
                TokenKind::LBracket => {
                    let span = self.current().span;
                    self.advance();
                    let index = self.parse_expr()?;
                    self.eat(TokenKind::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index), span);
                }
                TokenKind::LParen => {
                    let span = self.current().span;
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.check(&TokenKind::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.eat(TokenKind::RParen)?;
                    expr = Expr::Call(Box::new(expr), args, span);
                }
                TokenKind::To | TokenKind::In | TokenKind::As => {
                    let span = self.current().span;
                    let is_as = matches!(self.current().kind, TokenKind::As);
                    self.advance();
                    let target = self.parse_convert_target(is_as)?;
                    expr = Expr::Convert(Box::new(expr), target, span);
                }
                TokenKind::Percent if self.percent_is_postfix() => {
                    let span = self.current().span;
                    self.advance();
                    expr = match expr {
                        Expr::Number { value, span: s, .. } => Expr::Percentage { value, span: s },
                        other => Expr::Percent(Box::new(other), span),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// A `%` is a postfix percentage marker when what follows it cannot
    /// start another operand (`50%` literal vs. `10 % 3` modulo ambiguity,
    /// resolved structurally rather than by whitespace since the lexer
    /// discards it).
    fn percent_is_postfix(&self) -> bool {
        matches!(
            self.peek_at(1).map(|t| &t.kind),
            None | Some(TokenKind::Eof)
                | Some(TokenKind::RParen)
                | Some(TokenKind::RBracket)
                | Some(TokenKind::RBrace)
                | Some(TokenKind::Comma)
                | Some(TokenKind::Colon)
                | Some(TokenKind::Question)
                | Some(TokenKind::QuestionQuestion)
                | Some(TokenKind::AndAnd)
                | Some(TokenKind::OrOr)
                | Some(TokenKind::Eq)
                | Some(TokenKind::NotEq)
                | Some(TokenKind::Lt)
                | Some(TokenKind::LtEq)
                | Some(TokenKind::Gt)
                | Some(TokenKind::GtEq)
                | Some(TokenKind::Plus)
                | Some(TokenKind::Minus)
                | Some(TokenKind::Star)
                | Some(TokenKind::Slash)
                | Some(TokenKind::Caret)
                | Some(TokenKind::Amp)
                | Some(TokenKind::Pipe)
                | Some(TokenKind::Shl)
                | Some(TokenKind::Shr)
                | Some(TokenKind::To)
                | Some(TokenKind::In)
                | Some(TokenKind::As)
                | Some(TokenKind::Is)
                | Some(TokenKind::FatArrow)
        )
    }

    fn parse_convert_target(&mut self, is_as: bool) -> PResult<ConvertTarget> {
        let (line, col) = (self.current().span.line, self.current().span.col);
        if let TokenKind::Ident(name) = &self.current().kind {
            let lower = name.to_ascii_lowercase();
            if is_as {
                match lower.as_str() {
                    "binary" => {
                        self.advance();
                        return Ok(ConvertTarget::Binary);
                    }
                    "hex" => {
                        self.advance();
                        return Ok(ConvertTarget::Hex);
                    }
                    "number" | "string" | "boolean" | "object" | "array" => {
                        self.advance();
                        return Ok(ConvertTarget::Type(lower));
                    }
                    _ => {}
                }
            }
            if matches!(
                lower.as_str(),
                "number" | "string" | "boolean" | "object" | "array"
            ) && !matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::Slash) | Some(TokenKind::Star))
            {
                self.advance();
                return Ok(ConvertTarget::Type(lower));
            }
        }
        // Try a unit expression: Ident (Star|Slash|Dot Ident [Caret Number])*
        if let Some(unit_text) = self.try_parse_unit_expr() {
            return Ok(ConvertTarget::UnitOrZone(unit_text));
        }
        // Fall back to a (possibly multi-word) timezone name.
        if let TokenKind::Ident(_) = &self.current().kind {
            let mut words = Vec::new();
            for i in 0..3 {
                match self.peek_at(i).map(|t| &t.kind) {
                    Some(TokenKind::Ident(w)) => words.push(w.to_ascii_lowercase()),
                    _ => break,
                }
            }
            if words.is_empty() {
                return Err(ParseError::InvalidConvertTarget { line, col });
            }
            let refs: Vec<&str> = words.iter().map(|s| s.as_str()).collect();
            let take = tz_names::longest_alias_match(&refs).map(|(n, _)| n).unwrap_or(1);
            let phrase = refs[..take].join(" ");
            for _ in 0..take {
                self.advance();
            }
            return Ok(ConvertTarget::UnitOrZone(phrase));
        }
        Err(ParseError::InvalidConvertTarget { line, col })
    }

    /// Greedily consumes `unit (*|/|\u{b7}) unit [^exp]` chains, returning the
    /// reconstructed source text if the first fragment is a known unit (or
    /// derived unit); backtracks otherwise.
    fn try_parse_unit_expr(&mut self) -> Option<String> {
        let save = self.pos;
        let first = match &self.current().kind {
            TokenKind::Ident(s) => s.clone(),
            _ => return None,
        };
        if !units::is_known_unit_fragment(&first) {
            self.pos = save;
            return None;
        }
        self.advance();
        let mut text = first;
        if self.check(&TokenKind::Caret) {
            self.advance();
            if let TokenKind::NumberLit { value, .. } = &self.current().kind {
                text.push('^');
                text.push_str(&value.to_string());
                self.advance();
            }
        }
        loop {
            let sep = match self.current().kind {
                TokenKind::Star => '*',
                TokenKind::Slash => '/',
                _ => break,
            };
            let next_ident = match self.peek_at(1).map(|t| &t.kind) {
                Some(TokenKind::Ident(s)) if units::is_known_unit_fragment(s) => s.clone(),
                _ => break,
            };
            self.advance(); // separator
            self.advance(); // ident
            text.push(sep);
            text.push_str(&next_ident);
            if self.check(&TokenKind::Caret) {
                self.advance();
                if let TokenKind::NumberLit { value, .. } = &self.current().kind {
                    text.push('^');
                    text.push_str(&value.to_string());
                    self.advance();
                }
            }
        }
        Some(text)
    }

    // ---- primary ----

    fn parse_primary(&mut self) -> PResult<Expr> {
        if let Some(lambda) = self.try_parse_lambda()? {
            return Ok(lambda);
        }
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::NumberLit { value, format } => {
                self.advance();
                Ok(Expr::Number {
                    value,
                    radix: format,
                    span: tok.span,
                })
            }
            TokenKind::QuantityLit { value, unit } => {
                self.advance();
                Ok(Expr::Quantity {
                    value,
                    unit,
                    span: tok.span,
                })
            }
            TokenKind::StringLit(s) => {
                self.advance();
                Ok(Expr::Str(s, tok.span))
            }
            TokenKind::TemplateLit(segments) => {
                self.advance();
                let mut parsed = Vec::new();
                for (is_expr, text) in segments {
                    if is_expr {
                        let inner_tokens = crate::lexer::Lexer::new(&text)
                            .tokenize()
                            .map_err(|e| ParseError::Other(e.to_string()))?;
                        let mut sub = Parser::new(inner_tokens);
                        parsed.push(StringSegment::Interpolation(sub.parse_expr()?));
                    } else {
                        parsed.push(StringSegment::Literal(text));
                    }
                }
                Ok(Expr::StringTemplate(parsed, tok.span))
            }
            TokenKind::BoolLit(b) => {
                self.advance();
                Ok(Expr::Bool(b, tok.span))
            }
            TokenKind::NullLit => {
                self.advance();
                Ok(Expr::Null(tok.span))
            }
            TokenKind::DateLit(lit) => {
                self.advance();
                Ok(Expr::DateLit(lit, tok.span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name, tok.span))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.eat(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.check(&TokenKind::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.eat(TokenKind::RBracket)?;
                Ok(Expr::Array(items, tok.span))
            }
            TokenKind::LBrace => self.parse_object(tok.span),
            other => Err(ParseError::UnexpectedToken {
                found: other.to_string(),
                expected: "expression".to_string(),
                line: tok.span.line,
                col: tok.span.col,
            }),
        }
    }

    fn parse_object(&mut self, span: Span) -> PResult<Expr> {
        self.advance(); // {
        let mut fields = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let key = match &self.current().kind {
                    TokenKind::Ident(s) => {
                        let s = s.clone();
                        self.advance();
                        ObjectKey::Static(s)
                    }
                    TokenKind::StringLit(s) => {
                        let s = s.clone();
                        self.advance();
                        ObjectKey::Static(s)
                    }
                    TokenKind::LBracket => {
                        self.advance();
                        let key_expr = self.parse_expr()?;
                        self.eat(TokenKind::RBracket)?;
                        ObjectKey::Computed(key_expr)
                    }
                    other => {
                        return Err(ParseError::UnexpectedToken {
                            found: other.to_string(),
                            expected: "object key".to_string(),
                            line: self.current().span.line,
                            col: self.current().span.col,
                        })
                    }
                };
                self.eat(TokenKind::Colon)?;
                let value = self.parse_expr()?;
                fields.push((key, value));
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.eat(TokenKind::RBrace)?;
        Ok(Expr::Object(fields, span))
    }

    /// `x => expr` or `(a, b) => expr`. Both forms are tried speculatively
    /// and backtracked on mismatch so a bare parenthesised expression or a
    /// lone identifier isn't misparsed as a lambda.
    fn try_parse_lambda(&mut self) -> PResult<Option<Expr>> {
        let save = self.pos;
        let span = self.current().span;
        if let TokenKind::Ident(name) = &self.current().kind {
            let name = name.clone();
            if matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::FatArrow)) {
                self.advance();
                self.advance();
                let body = self.parse_ternary()?;
                return Ok(Some(Expr::Lambda(vec![name], Box::new(body), span)));
            }
            return Ok(None);
        }
        if self.check(&TokenKind::LParen) {
            let mut idx = self.pos + 1;
            let mut params = Vec::new();
            let mut ok = true;
            if !matches!(self.tokens.get(idx).map(|t| &t.kind), Some(TokenKind::RParen)) {
                loop {
                    match self.tokens.get(idx).map(|t| &t.kind) {
                        Some(TokenKind::Ident(p)) => {
                            params.push(p.clone());
                            idx += 1;
                        }
                        _ => {
                            ok = false;
                            break;
                        }
                    }
                    match self.tokens.get(idx).map(|t| &t.kind) {
                        Some(TokenKind::Comma) => idx += 1,
                        Some(TokenKind::RParen) => break,
                        _ => {
                            ok = false;
                            break;
                        }
                    }
                }
            }
            if ok
                && matches!(self.tokens.get(idx).map(|t| &t.kind), Some(TokenKind::RParen))
                && matches!(self.tokens.get(idx + 1).map(|t| &t.kind), Some(TokenKind::FatArrow))
            {
                self.pos = idx + 2;
                let body = self.parse_ternary()?;
                return Ok(Some(Expr::Lambda(params, Box::new(body), span)));
            }
            self.pos = save;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_line;

    #[test]
    fn test_parse_assignment() {
        match parse_line("x = 1 + 2").unwrap() {
            Line::Assignment { name, value, .. } => {
                assert_eq!(name, "x");
                assert!(matches!(value, Expr::Binary(BinOp::Add, ..)));
            }
            other => panic!("expected Assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_plus_assign_desugars_to_binary() {
        match parse_line("x += 1").unwrap() {
            Line::Assignment { name, value, .. } => {
                assert_eq!(name, "x");
                assert!(matches!(value, Expr::Binary(BinOp::Add, ..)));
            }
            other => panic!("expected Assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_funcdef() {
        match parse_line("add(a, b) = a + b").unwrap() {
            Line::FuncDef { name, params, .. } => {
                assert_eq!(name, "add");
                assert_eq!(params, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected FuncDef, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_call_is_not_mistaken_for_funcdef() {
        match parse_line("add(1, 2)").unwrap() {
            Line::Expr(Expr::Call(..)) => {}
            other => panic!("expected a bare call expression, got {other:?}"),
        }
    }

    #[test]
    fn test_comment_and_empty_lines() {
        assert!(matches!(parse_line("# nothing here").unwrap(), Line::Comment));
        assert!(matches!(parse_line("   ").unwrap(), Line::Empty));
    }

    #[test]
    fn test_pipe_builds_pipe_node() {
        match parse_line("10 | double").unwrap() {
            Line::Expr(Expr::Pipe(..)) => {}
            other => panic!("expected Pipe, got {other:?}"),
        }
    }

    #[test]
    fn test_power_is_right_associative() {
        // 2^3^2 should parse as 2^(3^2), i.e. the right side of the outer
        // Binary is itself a Pow.
        match parse_line("2^3^2").unwrap() {
            Line::Expr(Expr::Binary(BinOp::Pow, _, right, _)) => {
                assert!(matches!(*right, Expr::Binary(BinOp::Pow, ..)));
            }
            other => panic!("expected right-associative Pow, got {other:?}"),
        }
    }

    #[test]
    fn test_lambda_single_param() {
        match parse_line("x => x + 1").unwrap() {
            Line::Expr(Expr::Lambda(params, _, _)) => assert_eq!(params, vec!["x".to_string()]),
            other => panic!("expected Lambda, got {other:?}"),
        }
    }

    #[test]
    fn test_lambda_multi_param() {
        match parse_line("(a, b) => a + b").unwrap() {
            Line::Expr(Expr::Lambda(params, _, _)) => {
                assert_eq!(params, vec!["a".to_string(), "b".to_string()])
            }
            other => panic!("expected Lambda, got {other:?}"),
        }
    }

    #[test]
    fn test_convert_to_unit() {
        match parse_line("100 cm to meters").unwrap() {
            Line::Expr(Expr::Convert(_, ConvertTarget::UnitOrZone(u), _)) => {
                assert_eq!(u, "meters")
            }
            other => panic!("expected Convert, got {other:?}"),
        }
    }

    #[test]
    fn test_convert_as_type() {
        match parse_line("\"42\" as number").unwrap() {
            Line::Expr(Expr::Convert(_, ConvertTarget::Type(t), _)) => assert_eq!(t, "number"),
            other => panic!("expected Convert, got {other:?}"),
        }
    }

    #[test]
    fn test_percent_literal_vs_modulo() {
        match parse_line("50%").unwrap() {
            Line::Expr(Expr::Percentage { .. }) => {}
            other => panic!("expected Percentage, got {other:?}"),
        }
        match parse_line("10 % 3").unwrap() {
            Line::Expr(Expr::Binary(BinOp::Mod, ..)) => {}
            other => panic!("expected modulo Binary, got {other:?}"),
        }
    }

    #[test]
    fn test_ternary_and_null_coalesce() {
        assert!(matches!(parse_line("true ? 1 : 2").unwrap(), Line::Expr(Expr::Ternary(..))));
        assert!(matches!(
            parse_line("x ?? 0").unwrap(),
            Line::Expr(Expr::Binary(BinOp::NullCoalesce, ..))
        ));
    }

    #[test]
    fn test_is_check() {
        match parse_line("x is number").unwrap() {
            Line::Expr(Expr::IsCheck(_, tag, _)) => assert_eq!(tag, "number"),
            other => panic!("expected IsCheck, got {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_token_error() {
        let err = parse_line("1 +").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. } | ParseError::UnexpectedToken { .. }));
    }
}
