use std::fmt::Display;
use std::io::Write;

use super::escape;
use super::Encoder;

/// Strict JSON: every record is one JSON object on its own line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

/// Adds the comma separating this field from the previous one, unless the
/// object, array or field list is still empty.
pub(super) fn put_field_separator(dst: &mut Vec<u8>) {
    if let Some(&last) = dst.last() {
        if last != b'{' && last != b'[' {
            dst.push(b',');
        }
    }
}

/// Renders `val` at the end of `dst` and hands back the start of the
/// rendered text. A failing `Display` impl leaves nothing behind.
pub(super) fn render_display(dst: &mut Vec<u8>, val: &dyn Display) -> usize {
    let start = dst.len();
    if write!(dst, "{}", val).is_err() {
        dst.truncate(start);
    }
    start
}

pub(super) fn append_quoted(dst: &mut Vec<u8>, val: &str) {
    dst.push(b'"');
    escape::append_str(dst, val);
    dst.push(b'"');
}

/// Quotes the bytes in `dst[start..]`, escaping them when required.
pub(super) fn quote_tail(dst: &mut Vec<u8>, start: usize) {
    if escape::is_plain(&dst[start..]) {
        dst.insert(start, b'"');
    } else {
        let raw = dst.split_off(start);
        dst.push(b'"');
        escape::append_bytes(dst, &raw);
    }
    dst.push(b'"');
}

impl Encoder for JsonEncoder {
    fn put_key(&self, dst: &mut Vec<u8>, key: &str) {
        put_field_separator(dst);
        append_quoted(dst, key);
        dst.push(b':');
    }

    fn put_str(&self, dst: &mut Vec<u8>, val: &str) {
        append_quoted(dst, val);
    }

    fn put_bytes(&self, dst: &mut Vec<u8>, val: &[u8]) {
        dst.push(b'"');
        escape::append_bytes(dst, val);
        dst.push(b'"');
    }

    fn put_nil(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(b"null");
    }

    fn put_display(&self, dst: &mut Vec<u8>, val: &dyn Display) {
        let start = render_display(dst, val);
        quote_tail(dst, start);
    }

    fn put_token<F: FnOnce(&mut Vec<u8>)>(&self, dst: &mut Vec<u8>, write: F) {
        dst.push(b'"');
        write(dst);
        dst.push(b'"');
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keys_are_comma_separated() {
        let mut out = b"{".to_vec();
        JsonEncoder.put_key(&mut out, "a");
        JsonEncoder.put_i64(&mut out, 1);
        JsonEncoder.put_key(&mut out, "b\"");
        JsonEncoder.put_nil(&mut out);
        out.push(b'}');
        assert_eq!(out, br#"{"a":1,"b\"":null}"#);

        let mut fields = Vec::new();
        JsonEncoder.put_key(&mut fields, "x");
        JsonEncoder.put_bool(&mut fields, true);
        assert_eq!(fields, br#""x":true"#);
    }

    #[test]
    fn display_is_escaped() {
        let mut out = Vec::new();
        JsonEncoder.put_display(&mut out, &"plain");
        out.push(b' ');
        JsonEncoder.put_display(&mut out, &format_args!("line\n{}", '"'));
        assert_eq!(out, br#""plain" "line\n\"""#);
    }

    #[test]
    fn output_is_valid_json() {
        let mut out = b"{".to_vec();
        JsonEncoder.put_key(&mut out, "s");
        JsonEncoder.put_str(&mut out, "tab\there \u{1}");
        JsonEncoder.put_key(&mut out, "b");
        JsonEncoder.put_bytes(&mut out, b"\xff\xfe ok");
        JsonEncoder.put_key(&mut out, "f");
        JsonEncoder.put_f64(&mut out, f64::INFINITY);
        JsonEncoder.put_key(&mut out, "h");
        JsonEncoder.put_hex(&mut out, b"\x01\x02");
        out.push(b'}');
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["s"], "tab\there \u{1}");
        assert_eq!(parsed["b"], "\u{fffd}\u{fffd} ok");
        assert_eq!(parsed["f"], "+Inf");
        assert_eq!(parsed["h"], "0102");
    }
}
