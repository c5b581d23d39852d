// 🪆 Embedded lists - HOA / Valuation / Rehab sub-records
//
// A nested field may arrive as:
//   - a real JSON array of objects
//   - a string holding a JSON array
//   - a string holding a Python-style literal list: [{'HOA': 120, 'HOA_Flag': 'Yes'}]
//   - nothing at all
//
// Parsing is total. Anything that is not a list (or a string encoding one)
// yields no child records; it never fails the owning record.

use crate::source::json_kind;
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::debug;

pub type EmbeddedRecord = Map<String, Value>;

// ============================================================================
// TAGGED RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddedList {
    /// Absent, null, empty string, scalar, or a non-list container
    Empty,
    /// The object entries of the list, in source order
    List(Vec<EmbeddedRecord>),
    /// A string that does not encode a list
    Malformed(String),
}

impl EmbeddedList {
    pub fn parse(value: Option<&Value>) -> EmbeddedList {
        match value {
            None | Some(Value::Null) => EmbeddedList::Empty,
            Some(Value::Array(items)) => EmbeddedList::from_items(items.clone()),
            Some(Value::String(s)) => EmbeddedList::parse_str(s),
            // Objects, numbers and booleans are not lists
            Some(_) => EmbeddedList::Empty,
        }
    }

    fn parse_str(raw: &str) -> EmbeddedList {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return EmbeddedList::Empty;
        }

        let parsed = match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => Ok(value),
            Err(_) => parse_literal(trimmed),
        };

        match parsed {
            Ok(Value::Array(items)) => EmbeddedList::from_items(items),
            Ok(other) => EmbeddedList::Malformed(format!(
                "string encodes {}, not a list",
                json_kind(&other)
            )),
            Err(err) => EmbeddedList::Malformed(err.to_string()),
        }
    }

    fn from_items(items: Vec<Value>) -> EmbeddedList {
        let total = items.len();
        let records: Vec<EmbeddedRecord> = items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();

        if records.len() < total {
            debug!(
                dropped = total - records.len(),
                "dropped non-object entries from embedded list"
            );
        }

        EmbeddedList::List(records)
    }

    pub fn into_records(self) -> Vec<EmbeddedRecord> {
        match self {
            EmbeddedList::List(records) => records,
            EmbeddedList::Empty | EmbeddedList::Malformed(_) => Vec::new(),
        }
    }
}

/// Total: returns the embedded object records, or an empty list for
/// anything that is not a list or a string encoding one.
pub fn parse_embedded_list(value: Option<&Value>) -> Vec<EmbeddedRecord> {
    EmbeddedList::parse(value).into_records()
}

// ============================================================================
// LITERAL PARSER
// ============================================================================

const MAX_DEPTH: usize = 64;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

/// Parse a Python-style literal (lists, tuples, dicts, quoted strings,
/// numbers, True/False/None) into a JSON value. Tuples become arrays and
/// non-string dict keys are rendered as text.
pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    let mut parser = LiteralParser::new(input);
    let value = parser.value(0)?;
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn new(input: &str) -> Self {
        LiteralParser {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), LiteralError> {
        self.skip_whitespace();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            _ => Err(self.error(&format!("expected '{}'", expected))),
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, LiteralError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }

        self.skip_whitespace();
        match self.peek() {
            Some('[') => {
                self.pos += 1;
                let (items, _) = self.sequence(']', depth)?;
                Ok(Value::Array(items))
            }
            Some('(') => {
                self.pos += 1;
                let (mut items, trailing_comma) = self.sequence(')', depth)?;
                // (x) is a parenthesized value, (x,) is a one-element tuple
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Value::Array(items))
                }
            }
            Some('{') => {
                self.pos += 1;
                self.dict(depth)
            }
            Some('\'') | Some('"') => self.string().map(Value::String),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.keyword(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Comma separated values up to `close`. Returns whether the last item
    /// was followed by a comma.
    fn sequence(&mut self, close: char, depth: usize) -> Result<(Vec<Value>, bool), LiteralError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;

        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok((items, trailing_comma));
            }

            items.push(self.value(depth + 1)?);

            self.skip_whitespace();
            match self.bump() {
                Some(',') => trailing_comma = true,
                Some(c) if c == close => return Ok((items, false)),
                _ => return Err(self.error(&format!("expected ',' or '{}'", close))),
            }
        }
    }

    fn dict(&mut self, depth: usize) -> Result<Value, LiteralError> {
        let mut map = Map::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }

            let key = match self.value(depth + 1)? {
                Value::String(s) => s,
                Value::Null => "None".to_string(),
                Value::Bool(true) => "True".to_string(),
                Value::Bool(false) => "False".to_string(),
                Value::Number(n) => n.to_string(),
                _ => return Err(self.error("unhashable dict key")),
            };
            self.expect(':')?;
            let value = self.value(depth + 1)?;
            map.insert(key, value);

            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let mut out = String::new();

        loop {
            let c = self.bump().ok_or_else(|| self.error("unterminated string"))?;
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }

            let escaped = self.bump().ok_or_else(|| self.error("unterminated escape"))?;
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'a' => out.push('\u{07}'),
                'b' => out.push('\u{08}'),
                'f' => out.push('\u{0c}'),
                'v' => out.push('\u{0b}'),
                '0'..='7' => out.push(self.octal_escape(escaped)?),
                '\\' | '\'' | '"' => out.push(escaped),
                'x' => out.push(self.hex_escape(2)?),
                'u' => out.push(self.hex_escape(4)?),
                'U' => out.push(self.hex_escape(8)?),
                '\n' => {}
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, LiteralError> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return Err(self.error("truncated escape"));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        let code = u32::from_str_radix(&hex, 16).map_err(|_| self.error("invalid escape"))?;
        self.pos = end;
        char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
    }

    /// Up to three octal digits, the first already consumed.
    fn octal_escape(&mut self, first: char) -> Result<char, LiteralError> {
        let mut code = first.to_digit(8).unwrap_or(0);
        for _ in 0..2 {
            match self.peek().and_then(|c| c.to_digit(8)) {
                Some(digit) => {
                    code = code * 8 + digit;
                    self.pos += 1;
                }
                None => break,
            }
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '-' || c == '+')
                && matches!(self.chars.get(self.pos - 1), Some('e') | Some('E'));
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '_' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }

        let text: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        let text = text.strip_prefix('+').unwrap_or(&text);

        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        let float = text.parse::<f64>().map_err(|_| LiteralError {
            offset: start,
            message: format!("invalid number '{}'", text),
        })?;
        // Overflowing literals such as 1e400 read as infinity, which has no
        // JSON form; they surface as null and coerce to absent downstream.
        Ok(Number::from_f64(float).map_or(Value::Null, Value::Number))
    }

    fn keyword(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        match word.as_str() {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "None" => Ok(Value::Null),
            // String prefixes: u'..', r'..' (raw handled as plain)
            "u" | "U" | "r" | "R" if matches!(self.peek(), Some('\'') | Some('"')) => {
                self.string().map(Value::String)
            }
            _ => Err(LiteralError {
                offset: start,
                message: format!("unknown name '{}'", word),
            }),
        }
    }
}
