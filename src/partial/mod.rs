//! Truncation-tolerant JSON parsing.
//!
//! [`parse_partial`] walks a buffer that may stop anywhere inside a JSON
//! document and returns the deepest value it can prove is a prefix of the
//! final document. Containers left open at the end of the buffer are closed
//! virtually; strings, numbers, literals and object keys that are still in
//! flight are dropped. Only content that can never become valid JSON, no
//! matter what arrives next, is reported as a [`ParseError`].

use memchr::memchr2;
use serde_json::{Map, Number, Value};

const MAX_DEPTH: usize = 128;
const FENCE: &[u8] = b"```";

/// One step in the path from the document root to a nested value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    #[must_use]
    pub fn key(name: &str) -> Self {
        Self::Key(name.to_string())
    }
}

/// Best-effort snapshot of a possibly truncated JSON buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialDocument {
    /// Largest valid prefix value. An empty object when nothing usable arrived.
    pub value: Value,
    /// Containers still open at the end of the buffer, outermost first.
    /// The root container is implied and never listed.
    pub open_path: Vec<PathSegment>,
    /// Byte offset just past the last token that contributed to `value`.
    pub consumed: usize,
    /// True once the top-level value has been closed.
    pub is_complete: bool,
}

impl PartialDocument {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            value: Value::Object(Map::new()),
            open_path: Vec::new(),
            consumed: 0,
            is_complete: false,
        }
    }

    /// Whether the container at `path` may still grow.
    ///
    /// A container that has not appeared yet is reported open while the
    /// document itself is incomplete, since it may still arrive.
    #[must_use]
    pub fn is_open(&self, path: &[PathSegment]) -> bool {
        if self.is_complete {
            return false;
        }
        let shared = path
            .iter()
            .zip(self.open_path.iter())
            .take_while(|(a, b)| a == b)
            .count();
        if shared == path.len() {
            return true;
        }
        // A sibling that precedes the open chain at the first divergence is
        // closed; anything after it has not been seen yet.
        if shared < self.open_path.len() {
            return match (&path[shared], &self.open_path[shared]) {
                (PathSegment::Index(want), PathSegment::Index(open)) => want > open,
                _ => !self.value_exists(&path[..=shared]),
            };
        }
        // Below a closed value nothing can change, except values not yet present.
        !self.value_exists(&path[..=shared])
    }

    fn value_exists(&self, path: &[PathSegment]) -> bool {
        let mut current = &self.value;
        for segment in path {
            let next = match (segment, current) {
                (PathSegment::Key(key), Value::Object(map)) => map.get(key),
                (PathSegment::Index(idx), Value::Array(items)) => items.get(*idx),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return false,
            }
        }
        true
    }
}

/// What went wrong inside a buffer that cannot be repaired by truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("invalid unicode escape")]
    InvalidUnicodeEscape,
    #[error("unescaped control character in string")]
    ControlCharacter,
    #[error("unexpected character")]
    UnexpectedCharacter,
    #[error("trailing characters after document")]
    TrailingCharacters,
    #[error("invalid number")]
    InvalidNumber,
    #[error("invalid literal")]
    InvalidLiteral,
    #[error("nesting too deep")]
    NestingTooDeep,
}

/// Buffer content that is not JSON even after truncation-tolerant repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at byte {offset}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
}

/// Parse the deepest valid prefix structure out of `buffer`.
///
/// An empty buffer (or one holding only whitespace or the start of a code
/// fence) yields an empty object.
///
/// # Errors
///
/// Returns [`ParseError`] when the buffer contains content that is invalid
/// regardless of what could follow it.
pub fn parse_partial(buffer: &str) -> Result<PartialDocument, ParseError> {
    let bytes = buffer.as_bytes();
    let Some(start) = document_start(bytes) else {
        return Ok(PartialDocument::empty());
    };

    let mut parser = Parser {
        src: buffer,
        bytes,
        pos: start,
        depth: 0,
        committed: start,
        open_rev: Vec::new(),
    };

    match parser.parse_value()? {
        Parsed::Complete(value) => {
            let end = skip_ws(bytes, parser.pos);
            if !is_fence_tail(&bytes[end..]) {
                return Err(parser.error_at(end, ParseErrorKind::TrailingCharacters));
            }
            Ok(PartialDocument {
                value,
                open_path: Vec::new(),
                consumed: parser.pos,
                is_complete: true,
            })
        }
        Parsed::Truncated(Some(value)) => {
            let mut open_path = parser.open_rev;
            open_path.reverse();
            Ok(PartialDocument {
                value,
                open_path,
                consumed: parser.committed,
                is_complete: false,
            })
        }
        Parsed::Truncated(None) => Ok(PartialDocument::empty()),
    }
}

/// Offset of the first document byte, or `None` when nothing parseable has
/// arrived yet. A leading Markdown code fence line is skipped.
fn document_start(bytes: &[u8]) -> Option<usize> {
    let mut i = skip_ws(bytes, 0);
    let rest = &bytes[i..];
    if rest.is_empty() {
        return None;
    }
    if rest.starts_with(FENCE) {
        let newline = memchr::memchr(b'\n', rest)?;
        i = skip_ws(bytes, i + newline + 1);
        return (i < bytes.len()).then_some(i);
    }
    if FENCE.starts_with(rest) {
        return None;
    }
    Some(i)
}

/// Whitespace, or a closing fence followed by anything. Text after the
/// fence is commentary and never part of the document.
#[inline]
fn is_fence_tail(rest: &[u8]) -> bool {
    let start = skip_ws(rest, 0);
    start == rest.len() || rest[start] == b'`'
}

#[inline]
fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    let len = bytes.len();
    while i < len {
        match bytes[i] {
            b' ' | b'\n' | b'\r' | b'\t' => i += 1,
            _ => break,
        }
    }
    i
}

enum Parsed {
    Complete(Value),
    /// Buffer ended inside the value. Containers keep their valid prefix;
    /// scalars have nothing to keep.
    Truncated(Option<Value>),
}

enum Scan<T> {
    Done(T),
    Truncated,
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
    committed: usize,
    open_rev: Vec<PathSegment>,
}

impl Parser<'_> {
    fn error_at(&self, offset: usize, kind: ParseErrorKind) -> ParseError {
        ParseError { kind, offset }
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        self.error_at(self.pos, kind)
    }

    #[inline]
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    #[inline]
    fn skip_ws(&mut self) {
        self.pos = skip_ws(self.bytes, self.pos);
    }

    fn parse_value(&mut self) -> Result<Parsed, ParseError> {
        self.skip_ws();
        let Some(&byte) = self.bytes.get(self.pos) else {
            return Ok(Parsed::Truncated(None));
        };
        match byte {
            b'{' | b'[' => {
                self.depth += 1;
                if self.depth > MAX_DEPTH {
                    return Err(self.error(ParseErrorKind::NestingTooDeep));
                }
                let parsed = if byte == b'{' {
                    self.parse_object()
                } else {
                    self.parse_array()
                };
                self.depth -= 1;
                parsed
            }
            b'"' => Ok(match self.parse_string()? {
                Scan::Done(text) => Parsed::Complete(Value::String(text)),
                Scan::Truncated => Parsed::Truncated(None),
            }),
            b't' => self.parse_literal(b"true", Value::Bool(true)),
            b'f' => self.parse_literal(b"false", Value::Bool(false)),
            b'n' => self.parse_literal(b"null", Value::Null),
            b'-' | b'0'..=b'9' => self.parse_number(),
            _ => Err(self.error(ParseErrorKind::UnexpectedCharacter)),
        }
    }

    fn parse_object(&mut self) -> Result<Parsed, ParseError> {
        self.pos += 1;
        let mut map = Map::new();
        let mut first = true;
        loop {
            self.skip_ws();
            let Some(&byte) = self.bytes.get(self.pos) else {
                return Ok(Parsed::Truncated(Some(Value::Object(map))));
            };
            match byte {
                b'}' if first => {
                    self.pos += 1;
                    self.committed = self.pos;
                    return Ok(Parsed::Complete(Value::Object(map)));
                }
                b'"' => {}
                _ => return Err(self.error(ParseErrorKind::UnexpectedCharacter)),
            }
            first = false;

            let key = match self.parse_string()? {
                Scan::Done(key) => key,
                Scan::Truncated => return Ok(Parsed::Truncated(Some(Value::Object(map)))),
            };
            self.skip_ws();
            if self.at_end() {
                return Ok(Parsed::Truncated(Some(Value::Object(map))));
            }
            if self.bytes[self.pos] != b':' {
                return Err(self.error(ParseErrorKind::UnexpectedCharacter));
            }
            self.pos += 1;

            match self.parse_value()? {
                Parsed::Complete(value) => {
                    map.insert(key, value);
                    self.committed = self.pos;
                }
                Parsed::Truncated(Some(value)) => {
                    map.insert(key.clone(), value);
                    self.open_rev.push(PathSegment::Key(key));
                    return Ok(Parsed::Truncated(Some(Value::Object(map))));
                }
                Parsed::Truncated(None) => {
                    return Ok(Parsed::Truncated(Some(Value::Object(map))));
                }
            }

            self.skip_ws();
            let Some(&byte) = self.bytes.get(self.pos) else {
                return Ok(Parsed::Truncated(Some(Value::Object(map))));
            };
            match byte {
                b',' => self.pos += 1,
                b'}' => {
                    self.pos += 1;
                    self.committed = self.pos;
                    return Ok(Parsed::Complete(Value::Object(map)));
                }
                _ => return Err(self.error(ParseErrorKind::UnexpectedCharacter)),
            }
        }
    }

    fn parse_array(&mut self) -> Result<Parsed, ParseError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            let Some(&byte) = self.bytes.get(self.pos) else {
                return Ok(Parsed::Truncated(Some(Value::Array(items))));
            };
            if byte == b']' && items.is_empty() {
                self.pos += 1;
                self.committed = self.pos;
                return Ok(Parsed::Complete(Value::Array(items)));
            }

            match self.parse_value()? {
                Parsed::Complete(value) => {
                    items.push(value);
                    self.committed = self.pos;
                }
                Parsed::Truncated(Some(value)) => {
                    self.open_rev.push(PathSegment::Index(items.len()));
                    items.push(value);
                    return Ok(Parsed::Truncated(Some(Value::Array(items))));
                }
                Parsed::Truncated(None) => {
                    return Ok(Parsed::Truncated(Some(Value::Array(items))));
                }
            }

            self.skip_ws();
            let Some(&byte) = self.bytes.get(self.pos) else {
                return Ok(Parsed::Truncated(Some(Value::Array(items))));
            };
            match byte {
                b',' => self.pos += 1,
                b']' => {
                    self.pos += 1;
                    self.committed = self.pos;
                    return Ok(Parsed::Complete(Value::Array(items)));
                }
                _ => return Err(self.error(ParseErrorKind::UnexpectedCharacter)),
            }
        }
    }

    fn parse_string(&mut self) -> Result<Scan<String>, ParseError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let rest = &self.bytes[self.pos..];
            let Some(stop) = memchr2(b'"', b'\\', rest) else {
                if let Some(bad) = rest.iter().position(|b| *b < 0x20) {
                    return Err(self.error_at(self.pos + bad, ParseErrorKind::ControlCharacter));
                }
                return Ok(Scan::Truncated);
            };
            if let Some(bad) = rest[..stop].iter().position(|b| *b < 0x20) {
                return Err(self.error_at(self.pos + bad, ParseErrorKind::ControlCharacter));
            }
            out.push_str(&self.src[self.pos..self.pos + stop]);
            self.pos += stop;

            if self.bytes[self.pos] == b'"' {
                self.pos += 1;
                return Ok(Scan::Done(out));
            }

            // Backslash escape.
            let Some(&escape) = self.bytes.get(self.pos + 1) else {
                return Ok(Scan::Truncated);
            };
            match escape {
                b'"' => out.push('"'),
                b'\\' => out.push('\\'),
                b'/' => out.push('/'),
                b'b' => out.push('\u{0008}'),
                b'f' => out.push('\u{000C}'),
                b'n' => out.push('\n'),
                b'r' => out.push('\r'),
                b't' => out.push('\t'),
                b'u' => {
                    match self.parse_unicode_escape()? {
                        Scan::Done(ch) => out.push(ch),
                        Scan::Truncated => return Ok(Scan::Truncated),
                    }
                    continue;
                }
                _ => return Err(self.error_at(self.pos + 1, ParseErrorKind::InvalidEscape)),
            }
            self.pos += 2;
        }
    }

    /// Decode `\uXXXX` (and a following low surrogate) starting at the backslash.
    fn parse_unicode_escape(&mut self) -> Result<Scan<char>, ParseError> {
        let high = match self.read_hex4(self.pos + 2)? {
            Scan::Done(code) => code,
            Scan::Truncated => return Ok(Scan::Truncated),
        };
        let after_high = self.pos + 6;

        if (0xDC00..=0xDFFF).contains(&high) {
            return Err(self.error_at(self.pos, ParseErrorKind::InvalidUnicodeEscape));
        }
        if !(0xD800..=0xDBFF).contains(&high) {
            let ch = char::from_u32(u32::from(high))
                .ok_or_else(|| self.error_at(self.pos, ParseErrorKind::InvalidUnicodeEscape))?;
            self.pos = after_high;
            return Ok(Scan::Done(ch));
        }

        // High surrogate: a `\u` low surrogate must follow.
        match self.bytes.get(after_high..after_high + 2) {
            None => {
                let tail = &self.bytes[after_high.min(self.bytes.len())..];
                if b"\\u".starts_with(tail) {
                    return Ok(Scan::Truncated);
                }
                return Err(self.error_at(after_high, ParseErrorKind::InvalidUnicodeEscape));
            }
            Some(b"\\u") => {}
            Some(_) => {
                return Err(self.error_at(after_high, ParseErrorKind::InvalidUnicodeEscape));
            }
        }
        let low = match self.read_hex4(after_high + 2)? {
            Scan::Done(code) => code,
            Scan::Truncated => return Ok(Scan::Truncated),
        };
        if !(0xDC00..=0xDFFF).contains(&low) {
            return Err(self.error_at(after_high, ParseErrorKind::InvalidUnicodeEscape));
        }
        let combined = 0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(low) - 0xDC00);
        let ch = char::from_u32(combined)
            .ok_or_else(|| self.error_at(self.pos, ParseErrorKind::InvalidUnicodeEscape))?;
        self.pos = after_high + 6;
        Ok(Scan::Done(ch))
    }

    fn read_hex4(&self, start: usize) -> Result<Scan<u16>, ParseError> {
        let mut code: u16 = 0;
        for offset in 0..4 {
            let Some(&byte) = self.bytes.get(start + offset) else {
                return Ok(Scan::Truncated);
            };
            let digit = match byte {
                b'0'..=b'9' => byte - b'0',
                b'a'..=b'f' => byte - b'a' + 10,
                b'A'..=b'F' => byte - b'A' + 10,
                _ => {
                    return Err(
                        self.error_at(start + offset, ParseErrorKind::InvalidUnicodeEscape)
                    )
                }
            };
            code = (code << 4) | u16::from(digit);
        }
        Ok(Scan::Done(code))
    }

    fn parse_literal(&mut self, literal: &[u8], value: Value) -> Result<Parsed, ParseError> {
        let rest = &self.bytes[self.pos..];
        if rest.starts_with(literal) {
            self.pos += literal.len();
            return Ok(Parsed::Complete(value));
        }
        if literal.starts_with(rest) {
            return Ok(Parsed::Truncated(None));
        }
        Err(self.error(ParseErrorKind::InvalidLiteral))
    }

    fn parse_number(&mut self) -> Result<Parsed, ParseError> {
        let start = self.pos;
        let end = match self.scan_number_end(start)? {
            Scan::Done(end) => end,
            Scan::Truncated => return Ok(Parsed::Truncated(None)),
        };
        // A nested number touching the end of the buffer may still gain digits.
        if end == self.bytes.len() && self.depth > 0 {
            return Ok(Parsed::Truncated(None));
        }
        let number: Number = self.src[start..end]
            .parse()
            .map_err(|_| self.error_at(start, ParseErrorKind::InvalidNumber))?;
        self.pos = end;
        Ok(Parsed::Complete(Value::Number(number)))
    }

    /// Scan a number token. `Truncated` means the buffer ended where the
    /// grammar still requires a digit.
    fn scan_number_end(&self, start: usize) -> Result<Scan<usize>, ParseError> {
        let bytes = self.bytes;
        let len = bytes.len();
        let mut i = start;
        if bytes[i] == b'-' {
            i += 1;
        }

        match bytes.get(i) {
            None => return Ok(Scan::Truncated),
            Some(b'0') => i += 1,
            Some(b'1'..=b'9') => {
                i += 1;
                while i < len && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            Some(_) => return Err(self.error_at(i, ParseErrorKind::InvalidNumber)),
        }

        if i < len && bytes[i] == b'.' {
            i += 1;
            match bytes.get(i) {
                None => return Ok(Scan::Truncated),
                Some(b) if b.is_ascii_digit() => {}
                Some(_) => return Err(self.error_at(i, ParseErrorKind::InvalidNumber)),
            }
            while i < len && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }

        if i < len && matches!(bytes[i], b'e' | b'E') {
            i += 1;
            if i < len && matches!(bytes[i], b'+' | b'-') {
                i += 1;
            }
            match bytes.get(i) {
                None => return Ok(Scan::Truncated),
                Some(b) if b.is_ascii_digit() => {}
                Some(_) => return Err(self.error_at(i, ParseErrorKind::InvalidNumber)),
            }
            while i < len && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }

        Ok(Scan::Done(i))
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
