//! Lexer for the linecalc expression language.

use crate::tokens::{Token, TokenKind};
use linecalc_core::ast::{DateLiteral, Span};
use linecalc_core::units;
use linecalc_core::value::NumberFormat;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("unexpected character '{ch}' at line {line}, col {col}")]
    UnexpectedChar { ch: char, line: usize, col: usize },
    #[error("unterminated string at line {line}, col {col}")]
    UnterminatedString { line: usize, col: usize },
    #[error("invalid binary literal at line {line}, col {col}")]
    InvalidBinaryLiteral { line: usize, col: usize },
    #[error("invalid hex literal at line {line}, col {col}")]
    InvalidHexLiteral { line: usize, col: usize },
    #[error("invalid date literal at line {line}, col {col}")]
    BadDateLiteral { line: usize, col: usize },
    #[error("unknown unit '{unit}' at line {line}, col {col}")]
    InvalidUnitSuffix {
        unit: String,
        line: usize,
        col: usize,
    },
    #[error("invalid number at line {line}, col {col}")]
    InvalidNumber { line: usize, col: usize },
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    byte_offset: usize,
}

/// A saved lexer position for speculative date/time scanning.
struct Mark {
    pos: usize,
    line: usize,
    col: usize,
    byte_offset: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            byte_offset: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let span = self.span_here();
            let Some(ch) = self.current() else {
                tokens.push(Token::new(TokenKind::Eof, span));
                break;
            };
            let kind = self.lex_one(ch)?;
            let end = self.span_here();
            tokens.push(Token::new(kind, span.merge(end)));
        }
        Ok(tokens)
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            col: self.col,
            byte_offset: self.byte_offset,
        }
    }

    fn restore(&mut self, m: Mark) {
        self.pos = m.pos;
        self.line = m.line;
        self.col = m.col;
        self.byte_offset = m.byte_offset;
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        self.byte_offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn span_here(&self) -> Span {
        Span::new(self.byte_offset, self.byte_offset, self.line, self.col)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.current() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_one(&mut self, ch: char) -> Result<TokenKind, LexError> {
        if ch.is_ascii_digit() {
            return self.lex_number_or_date();
        }
        if ch == '`' {
            return self.lex_template_string();
        }
        if ch == '\'' || ch == '"' {
            return self.lex_plain_string(ch);
        }
        if is_ident_start(ch) {
            return Ok(self.lex_ident());
        }
        self.lex_operator(ch)
    }

    // ---- identifiers & keywords ----

    fn lex_ident(&mut self) -> TokenKind {
        let mut s = String::new();
        while let Some(c) = self.current() {
            if is_ident_continue(c) {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match s.as_str() {
            "to" => TokenKind::To,
            "in" => TokenKind::In,
            "as" => TokenKind::As,
            "is" => TokenKind::Is,
            "not" => TokenKind::Not,
            "true" => TokenKind::BoolLit(true),
            "false" => TokenKind::BoolLit(false),
            "null" => TokenKind::NullLit,
            _ => TokenKind::Ident(s),
        }
    }

    /// Words that must stay keywords when parsed bare (conversion and
    /// predicate syntax) even if they also happen to alias a unit name.
    fn is_reserved_word(s: &str) -> bool {
        matches!(s, "to" | "in" | "as" | "is" | "not" | "true" | "false" | "null")
    }

    // ---- operators ----

    fn lex_operator(&mut self, ch: char) -> Result<TokenKind, LexError> {
        let (line, col) = (self.line, self.col);
        self.advance();
        let kind = match ch {
            '+' => {
                if self.current() == Some('=') {
                    self.advance();
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.current() == Some('=') {
                    self.advance();
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '^' => TokenKind::Caret,
            '&' => {
                if self.current() == Some('&') {
                    self.advance();
                    TokenKind::AndAnd
                } else {
                    TokenKind::Amp
                }
            }
            '|' | '\u{2016}' => TokenKind::Pipe,
            '<' => {
                if self.current() == Some('<') {
                    self.advance();
                    TokenKind::Shl
                } else if self.current() == Some('=') {
                    self.advance();
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.current() == Some('>') {
                    self.advance();
                    TokenKind::Shr
                } else if self.current() == Some('=') {
                    self.advance();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '=' => {
                if self.current() == Some('=') {
                    self.advance();
                    TokenKind::Eq
                } else if self.current() == Some('>') {
                    self.advance();
                    TokenKind::FatArrow
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.current() == Some('=') {
                    self.advance();
                    TokenKind::NotEq
                } else {
                    return Err(LexError::UnexpectedChar { ch, line, col });
                }
            }
            '?' => {
                if self.current() == Some('?') {
                    self.advance();
                    TokenKind::QuestionQuestion
                } else {
                    TokenKind::Question
                }
            }
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            _ => return Err(LexError::UnexpectedChar { ch, line, col }),
        };
        // `||` as two adjacent pipes: upgrade to OrOr eagerly since that's
        // unambiguous (pipe into a literal `|` makes no sense).
        if matches!(kind, TokenKind::Pipe) && self.current() == Some('|') {
            self.advance();
            return Ok(TokenKind::OrOr);
        }
        Ok(kind)
    }

    // ---- strings ----

    fn lex_plain_string(&mut self, quote: char) -> Result<TokenKind, LexError> {
        let (line, col) = (self.line, self.col);
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.current() {
                None => return Err(LexError::UnterminatedString { line, col }),
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => {
                            s.push('\n');
                            self.advance();
                        }
                        Some('t') => {
                            s.push('\t');
                            self.advance();
                        }
                        Some('\\') => {
                            s.push('\\');
                            self.advance();
                        }
                        Some(c) if c == quote => {
                            s.push(quote);
                            self.advance();
                        }
                        Some(c) => {
                            s.push(c);
                            self.advance();
                        }
                        None => return Err(LexError::UnterminatedString { line, col }),
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
        Ok(TokenKind::StringLit(s))
    }

    fn lex_template_string(&mut self) -> Result<TokenKind, LexError> {
        let (line, col) = (self.line, self.col);
        self.advance(); // opening backtick
        let mut segments = Vec::new();
        let mut buf = String::new();
        loop {
            match self.current() {
                None => return Err(LexError::UnterminatedString { line, col }),
                Some('`') => {
                    self.advance();
                    break;
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    if !buf.is_empty() {
                        segments.push((false, std::mem::take(&mut buf)));
                    }
                    self.advance();
                    self.advance();
                    let mut depth = 1usize;
                    let mut expr_src = String::new();
                    loop {
                        match self.current() {
                            None => return Err(LexError::UnterminatedString { line, col }),
                            Some('{') => {
                                depth += 1;
                                expr_src.push('{');
                                self.advance();
                            }
                            Some('}') => {
                                depth -= 1;
                                self.advance();
                                if depth == 0 {
                                    break;
                                }
                                expr_src.push('}');
                            }
                            Some(c) => {
                                expr_src.push(c);
                                self.advance();
                            }
                        }
                    }
                    segments.push((true, expr_src));
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => {
                            buf.push('\n');
                            self.advance();
                        }
                        Some('t') => {
                            buf.push('\t');
                            self.advance();
                        }
                        Some(c) => {
                            buf.push(c);
                            self.advance();
                        }
                        None => return Err(LexError::UnterminatedString { line, col }),
                    }
                }
                Some(c) => {
                    buf.push(c);
                    self.advance();
                }
            }
        }
        if !buf.is_empty() {
            segments.push((false, buf));
        }
        Ok(TokenKind::TemplateLit(segments))
    }

    // ---- numbers, quantities, dates ----

    fn lex_number_or_date(&mut self) -> Result<TokenKind, LexError> {
        if self.current() == Some('0') && matches!(self.peek_at(1), Some('b') | Some('B')) {
            return self.lex_radix_literal(2);
        }
        if self.current() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            return self.lex_radix_literal(16);
        }
        if let Some(date) = self.try_lex_date_or_time()? {
            return Ok(date);
        }
        self.lex_plain_number_or_quantity()
    }

    fn lex_radix_literal(&mut self, radix: u32) -> Result<TokenKind, LexError> {
        let (line, col) = (self.line, self.col);
        self.advance(); // '0'
        self.advance(); // 'b' / 'x'
        let mut digits = String::new();
        while let Some(c) = self.current() {
            if c.is_digit(radix) {
                digits.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(if radix == 2 {
                LexError::InvalidBinaryLiteral { line, col }
            } else {
                LexError::InvalidHexLiteral { line, col }
            });
        }
        let n = i64::from_str_radix(&digits, radix).map_err(|_| {
            if radix == 2 {
                LexError::InvalidBinaryLiteral { line, col }
            } else {
                LexError::InvalidHexLiteral { line, col }
            }
        })?;
        Ok(TokenKind::NumberLit {
            value: Decimal::from(n),
            format: Some(if radix == 2 {
                NumberFormat::Binary
            } else {
                NumberFormat::Hex
            }),
        })
    }

    /// Speculatively try a `DD.MM.YYYY[THH:MM]`, `DD/MM/YYYY`, or bare
    /// `HH:MM` literal, with an optional `@timezone` suffix. Restores lexer
    /// position and returns `Ok(None)` if the shape doesn't match, letting
    /// the caller fall back to plain-number lexing.
    fn try_lex_date_or_time(&mut self) -> Result<Option<TokenKind>, LexError> {
        let m = self.mark();
        if let Some(date) = self.try_date_components() {
            let mut lit = date;
            // optional T HH:MM
            if self.current() == Some('T') {
                let tm = self.mark();
                self.advance();
                if let Some((h, mi)) = self.try_time_components() {
                    lit.hour = Some(h);
                    lit.minute = Some(mi);
                    lit.has_time_component = true;
                } else {
                    self.restore(tm);
                }
            }
            lit.timezone = self.try_timezone_suffix();
            return Ok(Some(TokenKind::DateLit(lit)));
        }
        self.restore(m);

        let m2 = self.mark();
        if let Some((h, mi)) = self.try_time_components() {
            let mut lit = DateLiteral {
                day: None,
                month: None,
                year: None,
                hour: Some(h),
                minute: Some(mi),
                timezone: None,
                has_time_component: true,
            };
            lit.timezone = self.try_timezone_suffix();
            return Ok(Some(TokenKind::DateLit(lit)));
        }
        self.restore(m2);
        Ok(None)
    }

    fn try_date_components(&mut self) -> Option<DateLiteral> {
        let d = self.scan_digits(1, 2)?;
        let sep = self.current()?;
        if sep != '.' && sep != '/' {
            return None;
        }
        self.advance();
        let mo = self.scan_digits(1, 2)?;
        if self.current() != Some(sep) {
            return None;
        }
        self.advance();
        let y = self.scan_digits(4, 4)?;
        Some(DateLiteral {
            day: Some(d as u32),
            month: Some(mo as u32),
            year: Some(y as i32),
            hour: None,
            minute: None,
            timezone: None,
            has_time_component: false,
        })
    }

    fn try_time_components(&mut self) -> Option<(u32, u32)> {
        let h = self.scan_digits(1, 2)?;
        if self.current() != Some(':') {
            return None;
        }
        self.advance();
        let mi = self.scan_digits(2, 2)?;
        if h > 23 || mi > 59 {
            return None;
        }
        Some((h as u32, mi as u32))
    }

    /// Scan between `min` and `max` ascii digits (inclusive), returning
    /// `None` (without consuming) if fewer than `min` are available.
    fn scan_digits(&mut self, min: usize, max: usize) -> Option<i64> {
        let start = self.pos;
        let mut s = String::new();
        while s.len() < max {
            match self.current() {
                Some(c) if c.is_ascii_digit() => {
                    s.push(c);
                    self.advance();
                }
                _ => break,
            }
        }
        if s.len() < min {
            // backtrack
            while self.pos > start {
                self.pos -= 1;
                self.col -= 1;
                self.byte_offset -= 1;
            }
            return None;
        }
        s.parse::<i64>().ok()
    }

    /// `@timezone`, possibly multi-word, against the known alias table. A
    /// dangling `@` with no recognised name still returns a best-effort
    /// label rather than panicking.
    fn try_timezone_suffix(&mut self) -> Option<String> {
        if self.current() != Some('@') {
            return None;
        }
        self.advance();
        let mut words = Vec::new();
        let mut cur = String::new();
        loop {
            match self.current() {
                Some(c) if c.is_alphanumeric() => {
                    cur.push(c.to_ascii_lowercase());
                    self.advance();
                }
                Some(' ') if !cur.is_empty() => {
                    words.push(std::mem::take(&mut cur));
                    if words.len() >= 3 {
                        break;
                    }
                    let la = self.peek_at(1);
                    if la.map(|c| c.is_alphabetic()).unwrap_or(false) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        if !cur.is_empty() {
            words.push(cur);
        }
        if words.is_empty() {
            return Some(String::new());
        }
        let refs: Vec<&str> = words.iter().map(|s| s.as_str()).collect();
        if let Some((take, _iana)) = linecalc_core::tz_names::longest_alias_match(&refs) {
            Some(refs[..take].join(" "))
        } else {
            Some(refs[0].to_string())
        }
    }

    fn lex_plain_number_or_quantity(&mut self) -> Result<TokenKind, LexError> {
        let (line, col) = (self.line, self.col);
        let mut s = String::new();
        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if self.current() == Some('.') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
            s.push('.');
            self.advance();
            while let Some(c) = self.current() {
                if c.is_ascii_digit() {
                    s.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if matches!(self.current(), Some('e') | Some('E')) {
            let m = self.mark();
            let mut exp = String::new();
            exp.push(self.advance().unwrap());
            if matches!(self.current(), Some('+') | Some('-')) {
                exp.push(self.advance().unwrap());
            }
            let mut any = false;
            while let Some(c) = self.current() {
                if c.is_ascii_digit() {
                    exp.push(c);
                    any = true;
                    self.advance();
                } else {
                    break;
                }
            }
            if any {
                s.push_str(&exp);
            } else {
                self.restore(m);
            }
        }
        let value = Decimal::from_str(&s)
            .or_else(|_| Decimal::from_scientific(&s))
            .map_err(|_| LexError::InvalidNumber { line, col })?;

        // Greedy compound-unit concatenation: `1h30min`, `2h45min30s`, a unit
        // glued directly to the number. An unknown glued fragment is an
        // error (`5hello` must fail) since that's unambiguously an attempted
        // unit suffix, not some other token.
        if let Some(first_unit) = self.peek_unit_fragment() {
            if !units::is_known_unit_fragment(&first_unit) {
                return Err(LexError::InvalidUnitSuffix {
                    unit: first_unit,
                    line,
                    col,
                });
            }
            self.consume_ident_run();
            return self.lex_quantity_tail(value, first_unit);
        }

        // A single space before a known unit also forms a quantity literal
        // (`100 cm`, spec example "100 cm in meters" -> Quantity(1, m)).
        // Unlike the glued form, a space followed by something that *isn't*
        // a known unit is not an error — it's just a number followed by
        // whatever that word turns out to be (`100 to meters`, `5 is number`).
        // Reserved words (`to`, `in`, `as`, `is`, `not`) never count as the
        // unit here even when they happen to double as a unit alias (`in` =
        // inches) — separated by a space they stay the conversion keyword,
        // so `100 in meters` still parses as a convert expression rather
        // than swallowing `in` as inches.
        if self.current() == Some(' ') {
            if let Some(first_unit) = self.peek_unit_fragment_at(self.pos + 1) {
                if units::is_known_unit_fragment(&first_unit) && !Self::is_reserved_word(&first_unit) {
                    self.advance(); // the space
                    self.consume_ident_run();
                    return self.lex_quantity_tail(value, first_unit);
                }
            }
        }

        Ok(TokenKind::NumberLit {
            value,
            format: None,
        })
    }

    /// Continue lexing a quantity literal after its first unit fragment has
    /// already been consumed, absorbing any further directly-glued
    /// `digits+unit` pairs (`1h30min`'s `30min` tail).
    fn lex_quantity_tail(&mut self, value: Decimal, first_unit: String) -> Result<TokenKind, LexError> {
        let mut total_base = value * unit_factor_to_base(&first_unit)?;
        let canonical_unit = first_unit;
        loop {
            let m = self.mark();
            let digits = self.peek_digit_run();
            if digits.is_empty() {
                self.restore(m);
                break;
            }
            let next_unit = {
                let save = self.mark();
                self.consume_digit_run();
                let u = self.peek_unit_fragment();
                self.restore(save);
                u
            };
            match next_unit {
                Some(u) if units::is_known_unit_fragment(&u) => {
                    self.consume_digit_run();
                    self.consume_ident_run();
                    let v = Decimal::from_str(&digits).unwrap_or_default();
                    total_base += v * unit_factor_to_base(&u)?;
                }
                _ => {
                    self.restore(m);
                    break;
                }
            }
        }
        let final_value = total_base / unit_factor_to_base(&canonical_unit)?;
        Ok(TokenKind::QuantityLit {
            value: final_value,
            unit: canonical_unit,
        })
    }

    /// Peek (without consuming) the identifier-like run right after the
    /// cursor, if any — used to detect a unit suffix glued to a number.
    fn peek_unit_fragment(&self) -> Option<String> {
        let mut i = self.pos;
        let mut s = String::new();
        while let Some(c) = self.source.get(i).copied() {
            if c.is_alphabetic() || c == '°' {
                s.push(c);
                i += 1;
            } else {
                break;
            }
        }
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    /// Same as `peek_unit_fragment`, but scanning from an arbitrary
    /// position rather than the current cursor — used to look past a
    /// single space (`100 cm`) without consuming it first.
    fn peek_unit_fragment_at(&self, pos: usize) -> Option<String> {
        let mut i = pos;
        let mut s = String::new();
        while let Some(c) = self.source.get(i).copied() {
            if c.is_alphabetic() || c == '°' {
                s.push(c);
                i += 1;
            } else {
                break;
            }
        }
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    fn consume_ident_run(&mut self) {
        while let Some(c) = self.current() {
            if c.is_alphabetic() || c == '°' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn peek_digit_run(&self) -> String {
        let mut i = self.pos;
        let mut s = String::new();
        while let Some(c) = self.source.get(i).copied() {
            if c.is_ascii_digit() {
                s.push(c);
                i += 1;
            } else {
                break;
            }
        }
        s
    }

    fn consume_digit_run(&mut self) {
        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
    }
}

fn unit_factor_to_base(unit: &str) -> Result<Decimal, LexError> {
    units::lookup_unit(unit)
        .map(|(_, f)| f)
        .ok_or(LexError::InvalidUnitSuffix {
            unit: unit.to_string(),
            line: 0,
            col: 0,
        })
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_pipe_never_bitor() {
        let ks = kinds("a | b");
        assert!(matches!(&ks[0], TokenKind::Ident(s) if s == "a"));
        assert!(matches!(&ks[1], TokenKind::Pipe));
        assert!(matches!(&ks[2], TokenKind::Ident(s) if s == "b"));
    }

    #[test]
    fn test_lex_double_pipe_is_oror() {
        let ks = kinds("a || b");
        assert!(matches!(&ks[1], TokenKind::OrOr));
    }

    #[test]
    fn test_lex_caret_is_power_not_xor() {
        let ks = kinds("2^3");
        assert!(matches!(&ks[1], TokenKind::Caret));
    }

    #[test]
    fn test_lex_compound_duration_quantity() {
        let ks = kinds("1h30min");
        match &ks[0] {
            TokenKind::QuantityLit { unit, .. } => assert_eq!(unit, "h"),
            other => panic!("expected QuantityLit, got {other:?}"),
        }
    }

    #[test]
    fn test_lex_space_before_known_unit_is_quantity() {
        let ks = kinds("100 cm");
        match &ks[0] {
            TokenKind::QuantityLit { unit, value } => {
                assert_eq!(unit, "cm");
                assert_eq!(*value, Decimal::from(100));
            }
            other => panic!("expected QuantityLit, got {other:?}"),
        }
    }

    #[test]
    fn test_lex_space_before_in_keyword_stays_keyword() {
        // `in` doubles as the inches unit alias, but separated by a space it
        // must stay the conversion keyword, not get swallowed as a unit.
        let ks = kinds("100 in meters");
        assert!(matches!(&ks[0], TokenKind::NumberLit { .. }));
        assert!(matches!(&ks[1], TokenKind::In));
        assert!(matches!(&ks[2], TokenKind::Ident(s) if s == "meters"));
    }

    #[test]
    fn test_lex_space_before_non_unit_word_is_plain_number() {
        let ks = kinds("100 to meters");
        assert!(matches!(&ks[0], TokenKind::NumberLit { .. }));
        assert!(matches!(&ks[1], TokenKind::To));
    }

    #[test]
    fn test_lex_date_literal() {
        let ks = kinds("01.01.2025");
        match &ks[0] {
            TokenKind::DateLit(lit) => {
                assert_eq!(lit.day, Some(1));
                assert_eq!(lit.month, Some(1));
                assert_eq!(lit.year, Some(2025));
            }
            other => panic!("expected DateLit, got {other:?}"),
        }
    }

    #[test]
    fn test_lex_time_literal() {
        let ks = kinds("14:30");
        match &ks[0] {
            TokenKind::DateLit(lit) => {
                assert_eq!(lit.hour, Some(14));
                assert_eq!(lit.minute, Some(30));
                assert!(lit.has_time_component);
            }
            other => panic!("expected DateLit, got {other:?}"),
        }
    }

    #[test]
    fn test_lex_hex_and_binary() {
        let ks = kinds("0xFF");
        assert!(matches!(&ks[0], TokenKind::NumberLit { value, format: Some(NumberFormat::Hex) } if *value == Decimal::from(255)));
        let ks = kinds("0b101");
        assert!(matches!(&ks[0], TokenKind::NumberLit { value, format: Some(NumberFormat::Binary) } if *value == Decimal::from(5)));
    }

    #[test]
    fn test_lex_template_string_segments() {
        let ks = kinds("`total: ${x + 1}`");
        match &ks[0] {
            TokenKind::TemplateLit(segs) => {
                assert_eq!(segs.len(), 2);
                assert_eq!(segs[0], (false, "total: ".to_string()));
                assert_eq!(segs[1], (true, "x + 1".to_string()));
            }
            other => panic!("expected TemplateLit, got {other:?}"),
        }
    }

    #[test]
    fn test_lex_comment_is_skipped() {
        let ks = kinds("1 + 1 # trailing comment");
        assert!(matches!(ks.last().unwrap(), TokenKind::Eof));
        assert_eq!(ks.len(), 4); // 1, +, 1, Eof
    }

    #[test]
    fn test_lex_unexpected_char() {
        let err = Lexer::new("@").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnexpectedChar { ch: '@', .. }));
    }
}
