//! PDF literal-string escaping and UTF-16BE encoding for `/T` Unicode text
//! (bookmark titles, field names that fall outside PDFDocEncoding).

/// Escape a byte string for use inside `( ... )` literal string syntax.
pub fn escape_literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 4);
    for &b in bytes {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'(' => out.extend_from_slice(b"\\("),
            b')' => out.extend_from_slice(b"\\)"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\n' => out.extend_from_slice(b"\\n"),
            _ => out.push(b),
        }
    }
    out
}

pub fn escape_literal_str(s: &str) -> String {
    String::from_utf8(escape_literal(s.as_bytes())).expect("escaping preserves utf8")
}

/// Encode a Rust string as UTF-16BE with a leading byte-order-mark, the
/// form PDF expects for Unicode text strings (bookmark titles, `/TU`).
pub fn utf16be_with_bom(s: &str) -> Vec<u8> {
    let mut out = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        out.push((unit >> 8) as u8);
        out.push((unit & 0xFF) as u8);
    }
    out
}

/// Render a UTF-16BE-with-BOM string as a PDF literal string, escaping as
/// needed for the raw bytes that happen to collide with `(`, `)`, `\`.
pub fn utf16be_literal(s: &str) -> String {
    let bytes = utf16be_with_bom(s);
    let escaped = escape_literal(&bytes);
    let mut out = String::from("(");
    for b in escaped {
        // Literal strings may contain raw bytes; represent non-ASCII via
        // octal escapes to keep the surrounding Rust `String` valid UTF-8.
        if b.is_ascii() && !b.is_ascii_control() {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\{:03o}", b));
        }
    }
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_parens_and_backslash() {
        assert_eq!(escape_literal_str("a(b)c\\d"), "a\\(b\\)c\\\\d");
    }

    #[test]
    fn utf16_has_bom() {
        let bytes = utf16be_with_bom("A");
        assert_eq!(bytes, vec![0xFE, 0xFF, 0x00, 0x41]);
    }
}
