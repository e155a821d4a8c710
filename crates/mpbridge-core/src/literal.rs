// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Literal-only data model and parser for board responses.
// Author: Lukas Bower

//! Literal values exchanged with the board.
//!
//! Responses are whatever the device `print`ed, i.e. the `repr` of a
//! MicroPython object. They are parsed with a grammar that only accepts
//! literals: numbers, strings, bytes, lists, tuples, dicts and the keywords
//! `None`, `True` and `False`. Names, calls and operators are rejected, so a
//! compromised or confused device cannot smuggle expressions into the host.

use core::fmt::{self, Write as _};

use crate::error::BoardError;

/// Maximum container nesting accepted by [`parse`].
pub const MAX_DEPTH: usize = 64;

/// Literal value as printed by (or sent to) the board.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// `'text'`
    Str(String),
    /// `b'bytes'`
    Bytes(Vec<u8>),
    /// `[a, b]`
    List(Vec<Value>),
    /// `(a, b)`
    Tuple(Vec<Value>),
    /// `{k: v}` in insertion order.
    Dict(Vec<(Value, Value)>),
}

impl Value {
    /// Borrow the string payload.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Integer payload; booleans count as integers as they do on the board.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Bool(flag) => Some(i64::from(*flag)),
            _ => None,
        }
    }

    /// Items of a list or tuple.
    #[must_use]
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) | Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// True for `None`.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Str(text) => write_str_literal(f, text),
            Self::Bytes(bytes) => write_bytes_literal(f, bytes),
            Self::List(items) => {
                f.write_char('[')?;
                write_items(f, items)?;
                f.write_char(']')
            }
            Self::Tuple(items) => {
                f.write_char('(')?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }
            Self::Dict(entries) => {
                f.write_char('{')?;
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_char('}')
            }
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_str_literal(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_char('\'')?;
    for ch in text.chars() {
        match ch {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if (c as u32) < 0x20 || c as u32 == 0x7f => write!(f, "\\x{:02x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('\'')
}

fn write_bytes_literal(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("b'")?;
    for &byte in bytes {
        match byte {
            b'\\' => f.write_str("\\\\")?,
            b'\'' => f.write_str("\\'")?,
            b'\n' => f.write_str("\\n")?,
            b'\r' => f.write_str("\\r")?,
            b'\t' => f.write_str("\\t")?,
            0x20..=0x7e => f.write_char(char::from(byte))?,
            _ => write!(f, "\\x{byte:02x}")?,
        }
    }
    f.write_char('\'')
}

/// Parse a complete literal; trailing content is an error.
pub fn parse(text: &str) -> Result<Value, BoardError> {
    let mut parser = Parser { src: text, pos: 0 };
    let value = parser.value(0)?;
    parser.skip_ws();
    if parser.pos != text.len() {
        return Err(parser.error("trailing content after literal"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, what: &str) -> BoardError {
        BoardError::malformed(format!("{what} at offset {}", self.pos))
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.pos += ch.len_utf8();
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), BoardError> {
        self.skip_ws();
        match self.bump() {
            Some(ch) if ch == wanted => Ok(()),
            _ => Err(self.error(&format!("expected '{wanted}'"))),
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, BoardError> {
        if depth > MAX_DEPTH {
            return Err(self.error("literal nesting too deep"));
        }
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('[') => {
                self.bump();
                self.sequence(']', depth).map(Value::List)
            }
            Some('(') => {
                self.bump();
                self.tuple(depth)
            }
            Some('{') => {
                self.bump();
                self.dict(depth)
            }
            Some('\'' | '"') => self.string().map(Value::Str),
            Some('b' | 'B') if matches!(self.rest().as_bytes().get(1), Some(b'\'' | b'"')) => {
                self.bump();
                self.bytes().map(Value::Bytes)
            }
            Some('-' | '+') => {
                let negative = self.bump() == Some('-');
                self.skip_ws();
                match self.number()? {
                    Value::Int(value) if negative => value
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| self.error("integer out of range")),
                    Value::Float(value) if negative => Ok(Value::Float(-value)),
                    other => Ok(other),
                }
            }
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.number(),
            Some(ch) if ch.is_alphabetic() || ch == '_' => self.keyword(),
            Some(ch) => Err(self.error(&format!("unexpected character '{ch}'"))),
        }
    }

    fn keyword(&mut self) -> Result<Value, BoardError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if !(ch.is_alphanumeric() || ch == '_') {
                break;
            }
            self.bump();
        }
        match &self.src[start..self.pos] {
            "None" => Ok(Value::None),
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            other => {
                self.pos = start;
                Err(self.error(&format!("name '{other}' is not a literal")))
            }
        }
    }

    fn number(&mut self) -> Result<Value, BoardError> {
        let start = self.pos;
        let radix = match self.rest().get(..2) {
            Some("0x" | "0X") => 16,
            Some("0o" | "0O") => 8,
            Some("0b" | "0B") => 2,
            _ => 10,
        };
        if radix != 10 {
            self.pos += 2;
            let digits_start = self.pos;
            while matches!(self.peek(), Some(ch) if ch.is_digit(radix) || ch == '_') {
                self.bump();
            }
            let digits = self.src[digits_start..self.pos].replace('_', "");
            return i64::from_str_radix(&digits, radix)
                .map(Value::Int)
                .map_err(|_| self.error("invalid integer literal"));
        }

        let mut is_float = false;
        while let Some(ch) = self.peek() {
            match ch {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(self.peek(), Some('+' | '-')) {
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }
        let text = self.src[start..self.pos].replace('_', "");
        if matches!(self.peek(), Some(ch) if ch.is_alphabetic()) {
            return Err(self.error("invalid numeric literal"));
        }
        if is_float {
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.error("invalid float literal"))
        } else {
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| self.error("integer out of range"))
        }
    }

    fn sequence(&mut self, close: char, depth: usize) -> Result<Vec<Value>, BoardError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(items);
            }
            items.push(self.value(depth + 1)?);
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some(ch) if ch == close => return Ok(items),
                _ => return Err(self.error(&format!("expected ',' or '{close}'"))),
            }
        }
    }

    fn tuple(&mut self, depth: usize) -> Result<Value, BoardError> {
        self.skip_ws();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(Value::Tuple(Vec::new()));
        }
        let first = self.value(depth + 1)?;
        self.skip_ws();
        match self.bump() {
            // A parenthesised single value is not a tuple.
            Some(')') => Ok(first),
            Some(',') => {
                let mut items = vec![first];
                items.extend(self.sequence(')', depth)?);
                Ok(Value::Tuple(items))
            }
            _ => Err(self.error("expected ',' or ')'")),
        }
    }

    fn dict(&mut self, depth: usize) -> Result<Value, BoardError> {
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Dict(entries));
            }
            let key = self.value(depth + 1)?;
            self.expect(':')?;
            let value = self.value(depth + 1)?;
            entries.push((key, value));
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some('}') => return Ok(Value::Dict(entries)),
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn string(&mut self) -> Result<String, BoardError> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some(ch) if ch == quote => return Ok(out),
                Some('\\') => {
                    if let Some(ch) = self.escape(true)? {
                        out.push(ch);
                    }
                }
                Some('\n') => return Err(self.error("newline in string literal")),
                Some(ch) => out.push(ch),
            }
        }
    }

    fn bytes(&mut self) -> Result<Vec<u8>, BoardError> {
        let quote = self.bump().ok_or_else(|| self.error("expected bytes"))?;
        let mut out = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated bytes literal")),
                Some(ch) if ch == quote => return Ok(out),
                Some('\\') => {
                    if let Some(ch) = self.escape(false)? {
                        // Escapes in bytes literals never exceed 0xff.
                        out.push(ch as u32 as u8);
                    }
                }
                Some(ch) if ch.is_ascii() && ch != '\n' => out.push(ch as u8),
                Some(_) => return Err(self.error("non-ASCII character in bytes literal")),
            }
        }
    }

    /// Decode the escape following a backslash. `None` for a line continuation.
    fn escape(&mut self, unicode: bool) -> Result<Option<char>, BoardError> {
        let ch = self
            .bump()
            .ok_or_else(|| self.error("unterminated escape"))?;
        let decoded = match ch {
            '\n' => return Ok(None),
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'v' => '\x0b',
            'x' => self.hex_escape(2)?,
            'u' if unicode => self.hex_escape(4)?,
            'U' if unicode => self.hex_escape(8)?,
            '0'..='7' => {
                let mut value = ch.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|next| next.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            self.bump();
                        }
                        None => break,
                    }
                }
                if !unicode && value > 0xff {
                    return Err(self.error("octal escape out of range"));
                }
                char::from_u32(value).ok_or_else(|| self.error("invalid octal escape"))?
            }
            other => return Err(self.error(&format!("unsupported escape '\\{other}'"))),
        };
        Ok(Some(decoded))
    }

    fn hex_escape(&mut self, len: usize) -> Result<char, BoardError> {
        let digits = self
            .rest()
            .get(..len)
            .filter(|digits| digits.chars().all(|ch| ch.is_ascii_hexdigit()))
            .ok_or_else(|| self.error("truncated hex escape"))?;
        let value = u32::from_str_radix(digits, 16).map_err(|_| self.error("invalid hex escape"))?;
        self.pos += len;
        char::from_u32(value).ok_or_else(|| self.error("escape is not a valid code point"))
    }
}
