//! JSON string escape decoding over a possibly truncated buffer.

use crate::json_scan::utf8_len;

/// Outcome of decoding the escape sequence at the start of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    /// A full sequence of `len` bytes decoding to `ch`.
    Complete { ch: char, len: usize },
    /// The buffer ends inside the sequence; more input is needed.
    Incomplete,
}

/// Decode the escape sequence starting at `bytes[0]` (which must be `\`).
///
/// Surrogate pairs are combined; an unpaired surrogate decodes to U+FFFD.
/// An unknown escape decodes to the escaped character itself, and a `\u`
/// followed by non-hex text decodes to a literal `u`.
#[must_use]
pub fn decode_escape(bytes: &[u8]) -> Escape {
    debug_assert_eq!(bytes.first(), Some(&b'\\'));
    let Some(&kind) = bytes.get(1) else {
        return Escape::Incomplete;
    };

    let simple = match kind {
        b'"' => Some('"'),
        b'\\' => Some('\\'),
        b'/' => Some('/'),
        b'b' => Some('\u{8}'),
        b'f' => Some('\u{c}'),
        b'n' => Some('\n'),
        b'r' => Some('\r'),
        b't' => Some('\t'),
        b'u' => None,
        _ => return decode_unknown(bytes),
    };
    if let Some(ch) = simple {
        return Escape::Complete { ch, len: 2 };
    }

    if is_partial_unicode_escape(bytes) {
        return Escape::Incomplete;
    }
    let Some(unit) = read_hex4(&bytes[2..]) else {
        return Escape::Complete { ch: 'u', len: 2 };
    };

    match unit {
        0xD800..=0xDBFF => {
            let tail = &bytes[6..];
            if is_partial_unicode_escape(tail) {
                return Escape::Incomplete;
            }
            let low = tail
                .strip_prefix(b"\\u")
                .and_then(read_hex4)
                .filter(|low| (0xDC00..=0xDFFF).contains(low));
            match low {
                Some(low) => {
                    let combined = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                    Escape::Complete {
                        ch: char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER),
                        len: 12,
                    }
                }
                None => Escape::Complete {
                    ch: char::REPLACEMENT_CHARACTER,
                    len: 6,
                },
            }
        }
        0xDC00..=0xDFFF => Escape::Complete {
            ch: char::REPLACEMENT_CHARACTER,
            len: 6,
        },
        _ => Escape::Complete {
            ch: char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER),
            len: 6,
        },
    }
}

fn decode_unknown(bytes: &[u8]) -> Escape {
    let width = utf8_len(bytes[1]);
    let Some(raw) = bytes.get(1..1 + width) else {
        return Escape::Incomplete;
    };
    let ch = std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.chars().next())
        .unwrap_or(char::REPLACEMENT_CHARACTER);
    Escape::Complete { ch, len: 1 + width }
}

/// True when `bytes` is a strict prefix of a `\uXXXX` sequence, i.e. it could
/// still become a valid unicode escape once more input arrives.
fn is_partial_unicode_escape(bytes: &[u8]) -> bool {
    if bytes.len() >= 6 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, &b)| match i {
        0 => b == b'\\',
        1 => b == b'u',
        _ => b.is_ascii_hexdigit(),
    })
}

fn read_hex4(bytes: &[u8]) -> Option<u32> {
    let digits = bytes.get(..4)?;
    digits.iter().try_fold(0u32, |acc, &b| {
        let digit = char::from(b).to_digit(16)?;
        Some(acc * 16 + digit)
    })
}
