#[inline]
pub(crate) const fn is_json_ws(byte: u8) -> bool {
    matches!(byte, b' ' | b'\n' | b'\r' | b'\t')
}

#[inline]
pub(crate) fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    let len = bytes.len();
    while i < len {
        match bytes[i] {
            b' ' | b'\n' | b'\r' | b'\t' => i += 1,
            _ => break,
        }
    }
    i
}

/// True when everything from `start` to the end is JSON whitespace.
#[inline]
pub(crate) fn only_ws_from(bytes: &[u8], start: usize) -> bool {
    skip_ws(bytes, start) >= bytes.len()
}

/// Position and value of the last non-whitespace byte before `end`.
#[inline]
pub(crate) fn last_non_ws_before(bytes: &[u8], end: usize) -> Option<(usize, u8)> {
    let end = end.min(bytes.len());
    bytes[..end]
        .iter()
        .rposition(|&b| !is_json_ws(b))
        .map(|pos| (pos, bytes[pos]))
}

/// Characters that may continue an unquoted JSON primitive (number or
/// `true`/`false`/`null`). Deliberately permissive; validation happens when
/// the token is committed.
#[inline]
pub(crate) const fn is_primitive_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'+' | b'.')
}

/// Bytes that may start an unquoted JSON primitive.
#[inline]
pub(crate) const fn starts_primitive(byte: u8) -> bool {
    matches!(byte, b'-' | b'0'..=b'9' | b't' | b'f' | b'n')
}

/// Remove one trailing comma (and the whitespace around it) from `text`.
/// Returns whether anything was removed.
pub(crate) fn strip_trailing_comma(text: &mut String) -> bool {
    match last_non_ws_before(text.as_bytes(), text.len()) {
        Some((pos, b',')) => {
            text.truncate(pos);
            let keep = text.trim_end_matches(|c: char| c.is_ascii() && is_json_ws(c as u8)).len();
            text.truncate(keep);
            true
        }
        _ => false,
    }
}

/// Byte length of the UTF-8 sequence starting with `lead`.
#[inline]
pub(crate) const fn utf8_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}
