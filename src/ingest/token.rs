//! Pull-based JSON token reader.
//!
//! The reader walks a `BufRead` source one token at a time, keeping only a
//! stack of open containers. Strings are scanned straight out of the source
//! buffer; `stream_string` hands long string values to a sink in bounded
//! chunks instead of materializing them.

use std::io::BufRead;

use crate::error::ParseError;

/// Maximum container nesting accepted by default.
pub const MAX_DEPTH: usize = 128;

/// Decoded bytes buffered before a streamed string chunk is emitted.
const STRING_CHUNK: usize = 8 * 1024;

/// Longest number literal accepted.
const MAX_NUMBER_LEN: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    BeginObject,
    EndObject,
    BeginArray,
    EndArray,
    /// An object key.
    Name(String),
    Str(String),
    /// The raw number literal, already checked against the JSON grammar.
    Number(String),
    Bool(bool),
    Null,
    EndDocument,
}

impl Token {
    pub fn kind(&self) -> &'static str {
        match self {
            Token::BeginObject => "'{'",
            Token::EndObject => "'}'",
            Token::BeginArray => "'['",
            Token::EndArray => "']'",
            Token::Name(_) => "object key",
            Token::Str(_) => "string",
            Token::Number(_) => "number",
            Token::Bool(_) => "boolean",
            Token::Null => "null",
            Token::EndDocument => "end of document",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Object,
    Array,
}

/// What the grammar allows at the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Value,
    FirstKeyOrEnd,
    Key,
    FirstValueOrEnd,
    CommaOrEnd,
    Done,
}

/// What to do with the contents of a string value.
enum Strings<'s> {
    Capture,
    Discard,
    Stream(&'s mut dyn FnMut(&str)),
}

pub struct TokenReader<R> {
    inner: R,
    offset: u64,
    stack: Vec<Scope>,
    expect: Expect,
    peeked: Option<Token>,
    max_depth: usize,
}

impl<R: BufRead> TokenReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            stack: Vec::new(),
            expect: Expect::Value,
            peeked: None,
            max_depth: MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Bytes consumed from the source so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of currently open containers.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    // ========================================================================
    // Public token API
    // ========================================================================

    /// Look at the next token without consuming it.
    pub fn peek(&mut self) -> Result<&Token, ParseError> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.advance(Strings::Capture)?,
        };
        Ok(self.peeked.insert(token))
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.advance(Strings::Capture),
        }
    }

    /// Consume one complete value, including everything nested inside it.
    /// String contents are scanned but not kept.
    pub fn skip_value(&mut self) -> Result<(), ParseError> {
        let first = match self.peeked.take() {
            Some(token) => token,
            None => self.advance(Strings::Discard)?,
        };
        match first {
            Token::BeginObject | Token::BeginArray => {
                let outer = self.stack.len().saturating_sub(1);
                loop {
                    match self.advance(Strings::Discard)? {
                        Token::EndObject | Token::EndArray if self.stack.len() == outer => {
                            return Ok(())
                        }
                        Token::EndDocument => {
                            return Err(ParseError::UnexpectedEnd {
                                offset: self.offset,
                            })
                        }
                        _ => {}
                    }
                }
            }
            Token::Str(_) | Token::Number(_) | Token::Bool(_) | Token::Null => Ok(()),
            other => Err(ParseError::UnexpectedToken {
                offset: self.offset,
                found: other.kind(),
                expected: "value",
            }),
        }
    }

    /// Consume a string value, handing its decoded contents to `sink` in
    /// chunks of roughly 8 KiB. Returns the decoded length in bytes.
    pub fn stream_string(&mut self, mut sink: impl FnMut(&str)) -> Result<u64, ParseError> {
        if let Some(token) = self.peeked.take() {
            return match token {
                Token::Str(s) => {
                    sink(&s);
                    Ok(s.len() as u64)
                }
                other => Err(ParseError::UnexpectedToken {
                    offset: self.offset,
                    found: other.kind(),
                    expected: "string",
                }),
            };
        }

        let mut len = 0u64;
        let mut counting = |chunk: &str| {
            len += chunk.len() as u64;
            sink(chunk);
        };
        match self.advance(Strings::Stream(&mut counting))? {
            Token::Str(_) => Ok(len),
            other => Err(ParseError::UnexpectedToken {
                offset: self.offset,
                found: other.kind(),
                expected: "string",
            }),
        }
    }

    // ========================================================================
    // State machine
    // ========================================================================

    fn advance(&mut self, strings: Strings<'_>) -> Result<Token, ParseError> {
        loop {
            self.skip_whitespace()?;
            let Some(byte) = self.peek_byte()? else {
                return if self.expect == Expect::Done {
                    Ok(Token::EndDocument)
                } else {
                    Err(ParseError::UnexpectedEnd {
                        offset: self.offset,
                    })
                };
            };

            match self.expect {
                Expect::Done => {
                    return Err(ParseError::TrailingContent {
                        offset: self.offset,
                    })
                }
                Expect::FirstKeyOrEnd if byte == b'}' => {
                    self.bump();
                    return Ok(self.close());
                }
                Expect::FirstKeyOrEnd | Expect::Key => return self.read_name(byte),
                Expect::FirstValueOrEnd if byte == b']' => {
                    self.bump();
                    return Ok(self.close());
                }
                Expect::FirstValueOrEnd | Expect::Value => return self.read_value(byte, strings),
                Expect::CommaOrEnd => match (self.stack.last().copied(), byte) {
                    (Some(Scope::Object), b',') => {
                        self.bump();
                        self.expect = Expect::Key;
                    }
                    (Some(Scope::Array), b',') => {
                        self.bump();
                        self.expect = Expect::Value;
                    }
                    (Some(Scope::Object), b'}') | (Some(Scope::Array), b']') => {
                        self.bump();
                        return Ok(self.close());
                    }
                    (Some(Scope::Object), _) => return Err(self.unexpected(byte, "',' or '}'")),
                    _ => return Err(self.unexpected(byte, "',' or ']'")),
                },
            }
        }
    }

    fn read_name(&mut self, byte: u8) -> Result<Token, ParseError> {
        if byte != b'"' {
            return Err(self.unexpected(byte, "object key"));
        }
        self.bump();
        let mut name = String::new();
        self.scan_string(&mut |chunk| name.push_str(chunk))?;

        self.skip_whitespace()?;
        match self.peek_byte()? {
            Some(b':') => self.bump(),
            Some(other) => return Err(self.unexpected(other, "':'")),
            None => {
                return Err(ParseError::UnexpectedEnd {
                    offset: self.offset,
                })
            }
        }
        self.expect = Expect::Value;
        Ok(Token::Name(name))
    }

    fn read_value(&mut self, byte: u8, strings: Strings<'_>) -> Result<Token, ParseError> {
        let token = match byte {
            b'{' => {
                self.open(Scope::Object)?;
                return Ok(Token::BeginObject);
            }
            b'[' => {
                self.open(Scope::Array)?;
                return Ok(Token::BeginArray);
            }
            b'"' => {
                self.bump();
                match strings {
                    Strings::Capture => {
                        let mut value = String::new();
                        self.scan_string(&mut |chunk| value.push_str(chunk))?;
                        Token::Str(value)
                    }
                    Strings::Discard => {
                        self.scan_string(&mut |_| {})?;
                        Token::Str(String::new())
                    }
                    Strings::Stream(sink) => {
                        self.scan_string(sink)?;
                        Token::Str(String::new())
                    }
                }
            }
            b't' => {
                self.literal(b"true")?;
                Token::Bool(true)
            }
            b'f' => {
                self.literal(b"false")?;
                Token::Bool(false)
            }
            b'n' => {
                self.literal(b"null")?;
                Token::Null
            }
            b'-' | b'0'..=b'9' => Token::Number(self.read_number()?),
            other => return Err(self.unexpected(other, "value")),
        };
        self.after_value();
        Ok(token)
    }

    fn open(&mut self, scope: Scope) -> Result<(), ParseError> {
        if self.stack.len() >= self.max_depth {
            return Err(ParseError::TooDeep {
                offset: self.offset,
                max: self.max_depth,
            });
        }
        self.bump();
        self.stack.push(scope);
        self.expect = match scope {
            Scope::Object => Expect::FirstKeyOrEnd,
            Scope::Array => Expect::FirstValueOrEnd,
        };
        Ok(())
    }

    fn close(&mut self) -> Token {
        let token = match self.stack.pop() {
            Some(Scope::Array) => Token::EndArray,
            _ => Token::EndObject,
        };
        self.after_value();
        token
    }

    fn after_value(&mut self) {
        self.expect = if self.stack.is_empty() {
            Expect::Done
        } else {
            Expect::CommaOrEnd
        };
    }

    // ========================================================================
    // Scalars
    // ========================================================================

    fn literal(&mut self, word: &[u8]) -> Result<(), ParseError> {
        for &expected in word {
            let byte = self.next_byte()?;
            if byte != expected {
                return Err(ParseError::UnexpectedByte {
                    offset: self.offset - 1,
                    found: byte as char,
                    expected: "literal",
                });
            }
        }
        Ok(())
    }

    fn read_number(&mut self) -> Result<String, ParseError> {
        let start = self.offset;
        let mut raw = String::new();
        loop {
            let buf = self.inner.fill_buf().map_err(ParseError::Io)?;
            if buf.is_empty() {
                break;
            }
            let n = buf
                .iter()
                .take_while(|b| matches!(b, b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E'))
                .count();
            raw.extend(buf[..n].iter().map(|&b| b as char));
            let exhausted = n == buf.len();
            self.inner.consume(n);
            self.offset += n as u64;
            if !exhausted || raw.len() > MAX_NUMBER_LEN {
                break;
            }
        }
        if raw.len() > MAX_NUMBER_LEN || !is_json_number(&raw) {
            return Err(ParseError::InvalidNumber { offset: start, raw });
        }
        Ok(raw)
    }

    /// Scan a string body; the opening quote has been consumed.
    fn scan_string(&mut self, sink: &mut dyn FnMut(&str)) -> Result<(), ParseError> {
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let buf = self.inner.fill_buf().map_err(ParseError::Io)?;
            if buf.is_empty() {
                return Err(ParseError::UnexpectedEnd {
                    offset: self.offset,
                });
            }
            let n = buf
                .iter()
                .position(|&b| b == b'"' || b == b'\\' || b < 0x20)
                .unwrap_or(buf.len());
            pending.extend_from_slice(&buf[..n]);
            let special = buf.get(n).copied();
            self.inner.consume(n);
            self.offset += n as u64;

            match special {
                None => {}
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    self.read_escape(&mut pending)?;
                }
                Some(control) => return Err(self.unexpected(control, "string character")),
            }
            if pending.len() >= STRING_CHUNK {
                self.emit(&mut pending, sink, false)?;
            }
        }
        self.emit(&mut pending, sink, true)
    }

    /// Hand the valid UTF-8 prefix of `pending` to `sink`. An incomplete
    /// trailing sequence is kept for the next chunk unless this is the last.
    fn emit(
        &self,
        pending: &mut Vec<u8>,
        sink: &mut dyn FnMut(&str),
        last: bool,
    ) -> Result<(), ParseError> {
        let invalid = ParseError::InvalidUtf8 {
            offset: self.offset,
        };
        match std::str::from_utf8(pending) {
            Ok(text) => {
                if !text.is_empty() {
                    sink(text);
                }
                pending.clear();
            }
            Err(e) => {
                if e.error_len().is_some() || last {
                    return Err(invalid);
                }
                let valid = e.valid_up_to();
                let head = std::str::from_utf8(&pending[..valid]).map_err(|_| invalid)?;
                if !head.is_empty() {
                    sink(head);
                }
                pending.drain(..valid);
            }
        }
        Ok(())
    }

    fn read_escape(&mut self, out: &mut Vec<u8>) -> Result<(), ParseError> {
        let byte = self.next_byte()?;
        let simple = match byte {
            b'"' => b'"',
            b'\\' => b'\\',
            b'/' => b'/',
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'u' => {
                let c = self.read_unicode_escape()?;
                let mut tmp = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
                return Ok(());
            }
            _ => {
                return Err(ParseError::InvalidEscape {
                    offset: self.offset - 1,
                })
            }
        };
        out.push(simple);
        Ok(())
    }

    /// `\uXXXX`, joining a surrogate pair into one scalar value.
    fn read_unicode_escape(&mut self) -> Result<char, ParseError> {
        let start = self.offset;
        let invalid = || ParseError::InvalidEscape { offset: start };
        let high = self.read_hex4()?;
        let code = if (0xD800..0xDC00).contains(&high) {
            if self.next_byte()? != b'\\' || self.next_byte()? != b'u' {
                return Err(invalid());
            }
            let low = self.read_hex4()?;
            if !(0xDC00..0xE000).contains(&low) {
                return Err(invalid());
            }
            0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
        } else {
            high
        };
        char::from_u32(code).ok_or_else(invalid)
    }

    fn read_hex4(&mut self) -> Result<u32, ParseError> {
        let mut value = 0u32;
        for _ in 0..4 {
            let byte = self.next_byte()?;
            let digit = (byte as char)
                .to_digit(16)
                .ok_or(ParseError::InvalidEscape {
                    offset: self.offset - 1,
                })?;
            value = (value << 4) | digit;
        }
        Ok(value)
    }

    // ========================================================================
    // Byte access
    // ========================================================================

    fn peek_byte(&mut self) -> Result<Option<u8>, ParseError> {
        let buf = self.inner.fill_buf().map_err(ParseError::Io)?;
        Ok(buf.first().copied())
    }

    fn next_byte(&mut self) -> Result<u8, ParseError> {
        let byte = self.peek_byte()?.ok_or(ParseError::UnexpectedEnd {
            offset: self.offset,
        })?;
        self.bump();
        Ok(byte)
    }

    fn bump(&mut self) {
        self.inner.consume(1);
        self.offset += 1;
    }

    fn skip_whitespace(&mut self) -> Result<(), ParseError> {
        loop {
            let buf = self.inner.fill_buf().map_err(ParseError::Io)?;
            if buf.is_empty() {
                return Ok(());
            }
            let n = buf
                .iter()
                .take_while(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
                .count();
            let exhausted = n == buf.len();
            self.inner.consume(n);
            self.offset += n as u64;
            if !exhausted {
                return Ok(());
            }
        }
    }

    fn unexpected(&self, byte: u8, expected: &'static str) -> ParseError {
        ParseError::UnexpectedByte {
            offset: self.offset,
            found: byte as char,
            expected,
        }
    }
}

/// `-? (0 | [1-9][0-9]*) (. [0-9]+)? ([eE] [+-]? [0-9]+)?`
fn is_json_number(raw: &str) -> bool {
    let b = raw.as_bytes();
    let digits = |mut i: usize| {
        while matches!(b.get(i), Some(b'0'..=b'9')) {
            i += 1;
        }
        i
    };

    let mut i = 0;
    if b.first() == Some(&b'-') {
        i += 1;
    }
    match b.get(i) {
        Some(b'0') => i += 1,
        Some(b'1'..=b'9') => i = digits(i + 1),
        _ => return false,
    }
    if b.get(i) == Some(&b'.') {
        let end = digits(i + 1);
        if end == i + 1 {
            return false;
        }
        i = end;
    }
    if matches!(b.get(i), Some(b'e' | b'E')) {
        i += 1;
        if matches!(b.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let end = digits(i);
        if end == i {
            return false;
        }
        i = end;
    }
    i == b.len()
}
