//! A relaxed, human oriented dialect of the JSON record layout.
//!
//! Records keep the `{key:value,...}` shape, but keys and string values are
//! written bare whenever that is unambiguous:
//!
//! ```text
//! {time:2024-01-19 13:20:00.123,level:info,user:ada,port:"8080",msg:started}
//! ```
//!
//! A string is quoted (with JSON escapes) exactly when reading it back bare
//! would change its meaning: it is empty, has outer spaces, contains a
//! structural or control character, or looks like a number or a literal.
//! [`parse_record`] reads the format back.

use std::borrow::Cow;
use std::fmt::Display;

use super::json::{append_quoted, put_field_separator, quote_tail, render_display};
use super::{escape, Encoder};

#[derive(Debug, Clone, Copy, Default)]
pub struct TextEncoder;

/// Returns true when `val` must be quoted to read back as the same string.
pub fn needs_quotes(val: &[u8]) -> bool {
    let (Some(&first), Some(&last)) = (val.first(), val.last()) else {
        return true;
    };
    if first == b' ' || last == b' ' {
        return true;
    }
    if val
        .iter()
        .any(|&b| matches!(b, b',' | b'{' | b'}' | b'[' | b']' | b'"' | b'\\') || b < 0x20 || b == 0x7f)
    {
        return true;
    }
    matches!(val, b"nil" | b"null" | b"true" | b"false") || looks_numeric(val)
}

fn needs_key_quotes(key: &[u8]) -> bool {
    needs_quotes(key) || key.contains(&b':')
}

fn looks_numeric(val: &[u8]) -> bool {
    if !b"0123456789+-.iInN".contains(&val[0]) {
        return false;
    }
    std::str::from_utf8(val).is_ok_and(|s| s.parse::<f64>().is_ok())
}

impl Encoder for TextEncoder {
    fn put_key(&self, dst: &mut Vec<u8>, key: &str) {
        put_field_separator(dst);
        if needs_key_quotes(key.as_bytes()) {
            append_quoted(dst, key);
        } else {
            dst.extend_from_slice(key.as_bytes());
        }
        dst.push(b':');
    }

    fn put_str(&self, dst: &mut Vec<u8>, val: &str) {
        if needs_quotes(val.as_bytes()) {
            append_quoted(dst, val);
        } else {
            dst.extend_from_slice(val.as_bytes());
        }
    }

    fn put_bytes(&self, dst: &mut Vec<u8>, val: &[u8]) {
        match std::str::from_utf8(val) {
            Ok(val) => self.put_str(dst, val),
            Err(_) => {
                dst.push(b'"');
                escape::append_bytes(dst, val);
                dst.push(b'"');
            }
        }
    }

    fn put_nil(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(b"nil");
    }

    fn put_display(&self, dst: &mut Vec<u8>, val: &dyn Display) {
        let start = render_display(dst, val);
        if needs_quotes(&dst[start..]) {
            quote_tail(dst, start);
        }
    }

    fn put_token<F: FnOnce(&mut Vec<u8>)>(&self, dst: &mut Vec<u8>, write: F) {
        let start = dst.len();
        write(dst);
        if needs_quotes(&dst[start..]) {
            quote_tail(dst, start);
        }
    }
}

/// A value read back from a text record.
#[derive(Debug, Clone, PartialEq)]
pub enum TextValue<'a> {
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(Cow<'a, str>),
    Array(Vec<TextValue<'a>>),
    /// A nested object, left as written.
    Raw(&'a str),
}

impl TextValue<'_> {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TextValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason} at byte {offset}")]
pub struct ParseError {
    pub offset: usize,
    pub reason: &'static str,
}

/// Parses one text record (with or without its trailing newline) into its
/// fields, in order.
pub fn parse_record(line: &str) -> Result<Vec<(Cow<'_, str>, TextValue<'_>)>, ParseError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let mut parser = Parser { src: line, pos: 0 };
    parser.expect(b'{')?;
    let mut fields = Vec::new();
    if parser.peek() == Some(b'}') {
        parser.pos += 1;
    } else {
        loop {
            let key = parser.key()?;
            parser.expect(b':')?;
            let value = parser.value()?;
            fields.push((key, value));
            match parser.next() {
                Some(b',') => continue,
                Some(b'}') => break,
                _ => return Err(parser.error("expected `,` or `}`")),
            }
        }
    }
    if parser.pos != line.len() {
        return Err(parser.error("trailing data after record"));
    }
    Ok(fields)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &'static str) -> ParseError {
        ParseError {
            offset: self.pos,
            reason,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn next(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn expect(&mut self, want: u8) -> Result<(), ParseError> {
        if self.peek() == Some(want) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error("unexpected character"))
        }
    }

    fn key(&mut self) -> Result<Cow<'a, str>, ParseError> {
        if self.peek() == Some(b'"') {
            return self.quoted();
        }
        let start = self.pos;
        let len = self.src.as_bytes()[start..]
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| self.error("key without `:`"))?;
        self.pos += len;
        Ok(Cow::Borrowed(&self.src[start..self.pos]))
    }

    fn quoted(&mut self) -> Result<Cow<'a, str>, ParseError> {
        let start = self.pos;
        self.expect(b'"')?;
        let bytes = self.src.as_bytes();
        let mut escaped = false;
        loop {
            match bytes.get(self.pos) {
                None => return Err(self.error("unterminated string")),
                Some(b'\\') => {
                    escaped = true;
                    self.pos += 2;
                }
                Some(b'"') => break,
                Some(_) => self.pos += 1,
            }
        }
        self.pos += 1;
        let literal = &self.src[start..self.pos];
        if !escaped {
            return Ok(Cow::Borrowed(&literal[1..literal.len() - 1]));
        }
        serde_json::from_str::<String>(literal)
            .map(Cow::Owned)
            .map_err(|_| ParseError {
                offset: start,
                reason: "invalid string escape",
            })
    }

    fn value(&mut self) -> Result<TextValue<'a>, ParseError> {
        match self.peek() {
            Some(b'"') => Ok(TextValue::Str(self.quoted()?)),
            Some(b'[') => self.array(),
            Some(b'{') => self.object(),
            Some(_) => Ok(self.bare()),
            None => Err(self.error("missing value")),
        }
    }

    fn array(&mut self) -> Result<TextValue<'a>, ParseError> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(TextValue::Array(items));
        }
        loop {
            items.push(self.value()?);
            match self.next() {
                Some(b',') => continue,
                Some(b']') => return Ok(TextValue::Array(items)),
                _ => return Err(self.error("expected `,` or `]`")),
            }
        }
    }

    fn object(&mut self) -> Result<TextValue<'a>, ParseError> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'"' => {
                    self.quoted()?;
                    continue;
                }
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Ok(TextValue::Raw(&self.src[start..self.pos]));
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.error("unterminated object"))
    }

    fn bare(&mut self) -> TextValue<'a> {
        let start = self.pos;
        let len = self.src.as_bytes()[start..]
            .iter()
            .position(|&b| matches!(b, b',' | b'}' | b']'))
            .unwrap_or(self.src.len() - start);
        self.pos += len;
        let token = &self.src[start..self.pos];
        match token {
            "nil" | "null" => TextValue::Nil,
            "true" => TextValue::Bool(true),
            "false" => TextValue::Bool(false),
            _ => {
                if let Ok(v) = token.parse::<i64>() {
                    TextValue::Int(v)
                } else if let Ok(v) = token.parse::<u64>() {
                    TextValue::Uint(v)
                } else if let Ok(v) = token.parse::<f64>() {
                    TextValue::Float(v)
                } else {
                    TextValue::Str(Cow::Borrowed(token))
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn text_str(val: &str) -> String {
        let mut out = Vec::new();
        TextEncoder.put_str(&mut out, val);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn bare_when_unambiguous() {
        assert_eq!(text_str("hello world"), "hello world");
        assert_eq!(text_str("a:b"), "a:b");
        assert_eq!(text_str("1.5ms"), "1.5ms");
        assert_eq!(text_str("grüße"), "grüße");
    }

    #[test]
    fn quoted_when_ambiguous() {
        assert_eq!(text_str(""), r#""""#);
        assert_eq!(text_str(" pad"), r#"" pad""#);
        assert_eq!(text_str("a,b"), r#""a,b""#);
        assert_eq!(text_str("{x}"), r#""{x}""#);
        assert_eq!(text_str("say \"hi\""), r#""say \"hi\"""#);
        assert_eq!(text_str("nil"), r#""nil""#);
        assert_eq!(text_str("true"), r#""true""#);
        assert_eq!(text_str("8080"), r#""8080""#);
        assert_eq!(text_str("-1e5"), r#""-1e5""#);
        assert_eq!(text_str("NaN"), r#""NaN""#);
        assert_eq!(text_str("two\nlines"), r#""two\nlines""#);
    }

    #[test]
    fn keys() {
        let mut out = b"{".to_vec();
        TextEncoder.put_key(&mut out, "plain");
        TextEncoder.put_nil(&mut out);
        TextEncoder.put_key(&mut out, "with:colon");
        TextEncoder.put_i64(&mut out, -3);
        out.push(b'}');
        assert_eq!(out, br#"{plain:nil,"with:colon":-3}"#);
    }

    #[test]
    fn tokens_quote_when_numeric() {
        let mut out = Vec::new();
        TextEncoder.put_hex(&mut out, &[0x12, 0x34]);
        out.push(b' ');
        TextEncoder.put_hex(&mut out, &[0xab]);
        assert_eq!(out, br#""1234" ab"#);
    }

    #[test]
    fn parses_what_it_writes() {
        let mut out = b"{".to_vec();
        let enc = TextEncoder;
        enc.put_key(&mut out, "time");
        enc.put_str(&mut out, "2024-01-19 13:20:00.123");
        enc.put_key(&mut out, "n");
        enc.put_i64(&mut out, -7);
        enc.put_key(&mut out, "big");
        enc.put_u64(&mut out, u64::MAX);
        enc.put_key(&mut out, "f");
        enc.put_f64(&mut out, 0.25);
        enc.put_key(&mut out, "port");
        enc.put_str(&mut out, "8080");
        enc.put_key(&mut out, "esc");
        enc.put_str(&mut out, "a\"b\n");
        enc.put_key(&mut out, "list");
        enc.put_array_start(&mut out);
        enc.put_str(&mut out, "x");
        enc.put_array_delim(&mut out);
        enc.put_bool(&mut out, false);
        enc.put_array_end(&mut out);
        enc.put_key(&mut out, "obj");
        enc.put_any(&mut out, &serde_json::json!({"k": "v}"}));
        enc.put_key(&mut out, "none");
        enc.put_nil(&mut out);
        out.extend_from_slice(b"}\n");

        let line = std::str::from_utf8(&out).unwrap();
        let fields = parse_record(line).unwrap();
        let expected = vec![
            ("time", TextValue::Str("2024-01-19 13:20:00.123".into())),
            ("n", TextValue::Int(-7)),
            ("big", TextValue::Uint(u64::MAX)),
            ("f", TextValue::Float(0.25)),
            ("port", TextValue::Str("8080".into())),
            ("esc", TextValue::Str("a\"b\n".into())),
            (
                "list",
                TextValue::Array(vec![TextValue::Str("x".into()), TextValue::Bool(false)]),
            ),
            ("obj", TextValue::Raw(r#"{"k":"v}"}"#)),
            ("none", TextValue::Nil),
        ];
        assert_eq!(fields.len(), expected.len());
        for ((key, value), (want_key, want_value)) in fields.iter().zip(&expected) {
            assert_eq!(key, want_key);
            assert_eq!(value, want_value);
        }
    }

    #[test]
    fn rejects_malformed_records() {
        assert!(parse_record("").is_err());
        assert!(parse_record("{a:1").is_err());
        assert!(parse_record("{a}").is_err());
        assert!(parse_record(r#"{a:"open}"#).is_err());
        assert!(parse_record("{a:1}x").is_err());
        assert_eq!(parse_record("{}").unwrap(), vec![]);
    }
}
