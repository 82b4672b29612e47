//! Defensive scalar readers for ingest records.
//!
//! A value of the wrong JSON type is coerced when there is an obvious
//! reading (`"42"` as a number, `1` as `true`) and replaced with the field
//! default otherwise. Either way the record survives and the fallback is
//! counted. Only structural errors are returned.

use std::io::BufRead;

use tracing::debug;

use crate::error::ParseError;

use super::token::{Token, TokenReader};

pub struct FieldReader<'t, R> {
    tokens: &'t mut TokenReader<R>,
    fallbacks: usize,
}

impl<'t, R: BufRead> FieldReader<'t, R> {
    pub fn new(tokens: &'t mut TokenReader<R>) -> Self {
        Self {
            tokens,
            fallbacks: 0,
        }
    }

    /// Values that needed coercion or a default so far.
    pub fn fallbacks(&self) -> usize {
        self.fallbacks
    }

    /// Next key of the current object, or `None` at its closing brace.
    pub fn next_key(&mut self) -> Result<Option<String>, ParseError> {
        match self.tokens.next_token()? {
            Token::Name(key) => Ok(Some(key)),
            Token::EndObject => Ok(None),
            other => Err(ParseError::UnexpectedToken {
                offset: self.tokens.offset(),
                found: other.kind(),
                expected: "object key",
            }),
        }
    }

    pub fn skip(&mut self) -> Result<(), ParseError> {
        self.tokens.skip_value()
    }

    /// The underlying token reader, for structural walking.
    pub fn tokens(&mut self) -> &mut TokenReader<R> {
        self.tokens
    }

    // ========================================================================
    // Scalars
    // ========================================================================

    pub fn string(&mut self, field: &str) -> Result<String, ParseError> {
        Ok(match self.scalar(field)? {
            Some(Token::Str(s)) => s,
            Some(Token::Null) => String::new(),
            Some(Token::Number(raw)) => self.coerced(field, "number", raw),
            Some(Token::Bool(b)) => self.coerced(field, "boolean", b.to_string()),
            _ => String::new(),
        })
    }

    pub fn opt_string(&mut self, field: &str) -> Result<Option<String>, ParseError> {
        Ok(match self.scalar(field)? {
            Some(Token::Str(s)) => Some(s),
            Some(Token::Number(raw)) => Some(self.coerced(field, "number", raw)),
            Some(Token::Bool(b)) => Some(self.coerced(field, "boolean", b.to_string())),
            _ => None,
        })
    }

    pub fn i64(&mut self, field: &str) -> Result<i64, ParseError> {
        let token = self.scalar(field)?;
        let value = match &token {
            Some(Token::Number(raw)) => match parse_integer(raw) {
                Some((v, true)) => return Ok(v),
                Some((v, false)) => Some(v),
                None => None,
            },
            Some(Token::Str(s)) => parse_integer(s.trim()).map(|(v, _)| v),
            Some(Token::Bool(b)) => Some(i64::from(*b)),
            _ => None,
        };
        Ok(self.settle(field, token.as_ref(), value, 0))
    }

    pub fn i32(&mut self, field: &str) -> Result<i32, ParseError> {
        let wide = self.i64(field)?;
        match i32::try_from(wide) {
            Ok(v) => Ok(v),
            Err(_) => {
                self.fallbacks += 1;
                debug!(field, value = wide, "integer out of 32-bit range, using 0");
                Ok(0)
            }
        }
    }

    pub fn f64(&mut self, field: &str) -> Result<f64, ParseError> {
        Ok(self.opt_f64(field)?.unwrap_or(0.0))
    }

    /// Absent on `null` and on anything that does not read as a number.
    pub fn opt_f64(&mut self, field: &str) -> Result<Option<f64>, ParseError> {
        let token = self.scalar(field)?;
        let value = match &token {
            Some(Token::Number(raw)) => return Ok(raw.parse::<f64>().ok()),
            Some(Token::Null) | None => return Ok(None),
            Some(Token::Str(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        };
        self.fallbacks += 1;
        match value {
            Some(v) => {
                debug!(field, "coerced string to number");
                Ok(Some(v))
            }
            None => {
                let found = token.as_ref().map_or("container", Token::kind);
                debug!(field, found, "not a number, leaving absent");
                Ok(None)
            }
        }
    }

    pub fn bool(&mut self, field: &str) -> Result<bool, ParseError> {
        let token = self.scalar(field)?;
        let value = match &token {
            Some(Token::Bool(b)) => return Ok(*b),
            Some(Token::Number(raw)) => raw.parse::<f64>().ok().map(|n| n != 0.0),
            Some(Token::Str(s)) => match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" | "" => Some(false),
                other => other.parse::<f64>().ok().map(|n| n != 0.0),
            },
            _ => None,
        };
        Ok(self.settle(field, token.as_ref(), value, false))
    }

    // ========================================================================
    // Lists
    // ========================================================================

    pub fn string_list(&mut self, field: &str) -> Result<Vec<String>, ParseError> {
        Ok(self.opt_string_list(field)?.unwrap_or_default())
    }

    pub fn opt_string_list(&mut self, field: &str) -> Result<Option<Vec<String>>, ParseError> {
        if !self.begin_list(field)? {
            return Ok(None);
        }
        let mut out = Vec::new();
        while !self.end_list()? {
            out.push(self.string(field)?);
        }
        Ok(Some(out))
    }

    pub fn f32_list(&mut self, field: &str) -> Result<Vec<f32>, ParseError> {
        if !self.begin_list(field)? {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        while !self.end_list()? {
            out.push(self.f64(field)? as f32);
        }
        Ok(out)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Read one scalar token. A container is walked, counted as a
    /// fallback and reported as `None`.
    fn scalar(&mut self, field: &str) -> Result<Option<Token>, ParseError> {
        let token = self.tokens.peek()?;
        let found = token.kind();
        if !matches!(token, Token::BeginObject | Token::BeginArray) {
            return self.tokens.next_token().map(Some);
        }
        self.tokens.skip_value()?;
        self.fallbacks += 1;
        debug!(field, found, "container where a scalar was expected, using default");
        Ok(None)
    }

    /// Count and log a coercion that produced `value`.
    fn coerced<T>(&mut self, field: &str, from: &'static str, value: T) -> T {
        self.fallbacks += 1;
        debug!(field, from, "coerced to string");
        value
    }

    /// Resolve a coercion attempt: `Some` is a successful coercion, `None`
    /// falls back to `default`. `null` and already-counted containers are
    /// defaulted silently.
    fn settle<T>(&mut self, field: &str, token: Option<&Token>, value: Option<T>, default: T) -> T {
        let found = match token {
            None | Some(Token::Null) => return default,
            Some(token) => token.kind(),
        };
        self.fallbacks += 1;
        match value {
            Some(v) => {
                debug!(field, found, "coerced value");
                v
            }
            None => {
                debug!(field, found, "unreadable value, using default");
                default
            }
        }
    }

    /// Open a list value. Returns false (after consuming the value) when it
    /// is not an array.
    fn begin_list(&mut self, field: &str) -> Result<bool, ParseError> {
        match self.tokens.next_token()? {
            Token::BeginArray => Ok(true),
            Token::Null => Ok(false),
            Token::BeginObject => {
                // Already inside the object; walk to its end.
                self.skip_rest_of_container()?;
                self.fallbacks += 1;
                debug!(field, "object where a list was expected, using default");
                Ok(false)
            }
            other => {
                self.fallbacks += 1;
                debug!(field, found = other.kind(), "scalar where a list was expected, using default");
                Ok(false)
            }
        }
    }

    fn end_list(&mut self) -> Result<bool, ParseError> {
        if matches!(self.tokens.peek()?, Token::EndArray) {
            self.tokens.next_token()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn skip_rest_of_container(&mut self) -> Result<(), ParseError> {
        let outer = self.tokens.depth() - 1;
        while self.tokens.depth() > outer {
            match self.tokens.next_token()? {
                Token::BeginObject | Token::BeginArray => {
                    // Depth already increased; the loop walks it.
                }
                Token::EndDocument => {
                    return Err(ParseError::UnexpectedEnd {
                        offset: self.tokens.offset(),
                    })
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Parse an integer literal, accepting float notation. The flag is true when
/// the literal was an exact integer.
fn parse_integer(raw: &str) -> Option<(i64, bool)> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some((v, true));
    }
    let n = raw.parse::<f64>().ok().filter(|n| n.is_finite())?;
    if n < i64::MIN as f64 || n > i64::MAX as f64 {
        return None;
    }
    Some((n.trunc() as i64, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Wrap `value` in `{"v": value}` and position a reader on it.
    fn reader(value: &str) -> TokenReader<Cursor<Vec<u8>>> {
        let doc = format!(r#"{{"v": {value}, "end": 0}}"#);
        let mut tokens = TokenReader::new(Cursor::new(doc.into_bytes()));
        tokens.next_token().unwrap();
        tokens.next_token().unwrap();
        tokens
    }

    fn assert_positioned_after(tokens: &mut TokenReader<Cursor<Vec<u8>>>) {
        assert_eq!(tokens.next_token().unwrap(), Token::Name("end".into()));
    }

    #[test]
    fn exact_types_are_not_fallbacks() {
        let mut t = reader("12");
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.i64("id").unwrap(), 12);
        assert_eq!(f.fallbacks(), 0);

        let mut t = reader(r#""hi""#);
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.string("name").unwrap(), "hi");
        assert_eq!(f.fallbacks(), 0);

        let mut t = reader("null");
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.opt_f64("lat").unwrap(), None);
        assert_eq!(f.fallbacks(), 0);
    }

    #[test]
    fn numeric_strings_become_numbers() {
        let mut t = reader(r#"" 42 ""#);
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.i64("id").unwrap(), 42);
        assert_eq!(f.fallbacks(), 1);

        let mut t = reader(r#""-8.5""#);
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.opt_f64("lat").unwrap(), Some(-8.5));
    }

    #[test]
    fn unreadable_latitude_is_absent() {
        let mut t = reader(r#""abc""#);
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.opt_f64("latitude").unwrap(), None);
        assert_eq!(f.fallbacks(), 1);
        assert_positioned_after(&mut t);
    }

    #[test]
    fn numbers_become_strings() {
        let mut t = reader("1234.5");
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.string("registrationNumber").unwrap(), "1234.5");
        assert_eq!(f.fallbacks(), 1);
    }

    #[test]
    fn truthy_values() {
        for (value, expected) in [
            ("true", true),
            ("0", false),
            ("2", true),
            (r#""1""#, true),
            (r#""true""#, true),
            (r#""false""#, false),
            (r#""nope""#, false),
            ("null", false),
        ] {
            let mut t = reader(value);
            let mut f = FieldReader::new(&mut t);
            assert_eq!(f.bool("synced").unwrap(), expected, "{value}");
        }
    }

    #[test]
    fn containers_are_walked_and_defaulted() {
        let mut t = reader(r#"{"a": [1, {"b": 2}]}"#);
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.i64("timestamp").unwrap(), 0);
        assert_eq!(f.fallbacks(), 1);
        assert_positioned_after(&mut t);

        let mut t = reader("[1, 2]");
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.string("name").unwrap(), "");
        assert_positioned_after(&mut t);
    }

    #[test]
    fn float_literal_for_integer_field() {
        let mut t = reader("1.7e12");
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.i64("timestamp").unwrap(), 1_700_000_000_000);
        assert_eq!(f.fallbacks(), 1);
    }

    #[test]
    fn i32_out_of_range_defaults() {
        let mut t = reader("4294967296");
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.i32("active").unwrap(), 0);
        assert_eq!(f.fallbacks(), 1);
    }

    #[test]
    fn lists() {
        let mut t = reader(r#"["a", 2, null]"#);
        let mut f = FieldReader::new(&mut t);
        assert_eq!(
            f.opt_string_list("roleDescriptions").unwrap(),
            Some(vec!["a".to_string(), "2".to_string(), String::new()])
        );
        assert_positioned_after(&mut t);

        let mut t = reader("null");
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.opt_string_list("activeFlags").unwrap(), None);

        let mut t = reader(r#"{"x": [1]}"#);
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.string_list("registrationNumbers").unwrap(), Vec::<String>::new());
        assert_eq!(f.fallbacks(), 1);
        assert_positioned_after(&mut t);

        let mut t = reader(r#"[0.5, "0.25", "x"]"#);
        let mut f = FieldReader::new(&mut t);
        assert_eq!(f.f32_list("embedding").unwrap(), vec![0.5, 0.25, 0.0]);
        assert_eq!(f.fallbacks(), 2);
    }
}
