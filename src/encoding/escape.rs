//! JSON string escaping shared by both encodings.

const fn build_safe_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut i = 0x20;
    while i < 256 {
        table[i] = i != b'"' as usize && i != b'\\' as usize;
        i += 1;
    }
    table
}

/// `true` for bytes that can be copied into a JSON string as is. Bytes of
/// multibyte UTF-8 sequences are safe once the input is known to be valid.
static SAFE: [bool; 256] = build_safe_table();

const HEX: &[u8; 16] = b"0123456789abcdef";

/// U+FFFD as a JSON escape.
const REPLACEMENT: &[u8] = b"\\ufffd";

/// Appends `s` escaped for use inside a JSON string (without quotes).
pub(crate) fn append_str(dst: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    match bytes.iter().position(|&b| !SAFE[b as usize]) {
        None => dst.extend_from_slice(bytes),
        Some(first) => append_escaped_from(dst, bytes, first),
    }
}

/// Like [`append_str`] for arbitrary bytes: every byte that is not part of
/// a valid UTF-8 sequence becomes the escape `\ufffd`.
pub(crate) fn append_bytes(dst: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.iter().all(|&b| b < 0x80 && SAFE[b as usize]) {
        dst.extend_from_slice(bytes);
        return;
    }
    for chunk in bytes.utf8_chunks() {
        append_str(dst, chunk.valid());
        for _ in chunk.invalid() {
            dst.extend_from_slice(REPLACEMENT);
        }
    }
}

/// Returns true when `bytes` can be placed between quotes unchanged.
pub(crate) fn is_plain(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| SAFE[b as usize])
}

pub(crate) fn append_hex(dst: &mut Vec<u8>, bytes: &[u8]) {
    dst.reserve(bytes.len() * 2);
    for &b in bytes {
        dst.push(HEX[(b >> 4) as usize]);
        dst.push(HEX[(b & 0xF) as usize]);
    }
}

// We found a byte that needs escaping. Copy runs of plain bytes in bulk and
// only handle the special bytes one at a time.
fn append_escaped_from(dst: &mut Vec<u8>, bytes: &[u8], mut i: usize) {
    let mut start = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if SAFE[b as usize] {
            i += 1;
            continue;
        }
        dst.extend_from_slice(&bytes[start..i]);
        match b {
            b'"' | b'\\' => dst.extend_from_slice(&[b'\\', b]),
            0x08 => dst.extend_from_slice(b"\\b"),
            0x0C => dst.extend_from_slice(b"\\f"),
            b'\n' => dst.extend_from_slice(b"\\n"),
            b'\r' => dst.extend_from_slice(b"\\r"),
            b'\t' => dst.extend_from_slice(b"\\t"),
            _ => dst.extend_from_slice(&[
                b'\\',
                b'u',
                b'0',
                b'0',
                HEX[(b >> 4) as usize],
                HEX[(b & 0xF) as usize],
            ]),
        }
        i += 1;
        start = i;
    }
    dst.extend_from_slice(&bytes[start..]);
}
