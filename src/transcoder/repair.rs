//! Best-effort JSON snapshot of in-flight arguments.
//!
//! Works on a private copy of the arguments text and only reads the
//! transcoder state, so the live parse is never disturbed. The result is an
//! approximation for early UI feedback; completed calls always use a real
//! parse of the full text instead.

use serde_json::Value;

use super::{ParserState, TranscoderState};
use crate::json_scan::{last_non_ws_before, strip_trailing_comma};

const MAX_COMMA_STRIP_RETRIES: usize = 3;

/// A repaired arguments document together with its parsed value.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairedJson {
    pub text: String,
    pub value: Value,
}

/// Build a syntactically valid JSON document from `arguments` as seen by
/// `state`, or `None` when no repair pass produces parseable JSON.
#[must_use]
pub fn build_temporary_json(arguments: &str, state: &TranscoderState) -> Option<RepairedJson> {
    if state.parser_state == ParserState::ExpectRoot && !state.root_closed {
        return None;
    }

    let mut body = arguments.to_owned();
    if state.in_string {
        strip_incomplete_escape(&mut body);
        body.push('"');
    } else if !state.primitive_buffer.is_empty() {
        complete_primitive(&mut body, &state.primitive_buffer);
    }
    strip_trailing_comma(&mut body);

    let brackets = &state.bracket_stack;
    if let Some(repaired) = close_and_parse(&body, brackets) {
        return Some(repaired);
    }

    let expects_value = matches!(
        last_non_ws_before(body.as_bytes(), body.len()),
        Some((_, b':'))
    ) || state.parser_state == ParserState::ExpectValue;
    if expects_value {
        let mut with_null = body.clone();
        with_null.push_str("null");
        if let Some(repaired) = close_and_parse(&with_null, brackets) {
            return Some(repaired);
        }
    }

    for _ in 0..MAX_COMMA_STRIP_RETRIES {
        if !strip_trailing_comma(&mut body) {
            break;
        }
        if let Some(repaired) = close_and_parse(&body, brackets) {
            return Some(repaired);
        }
    }

    tracing::trace!(len = arguments.len(), "temporary json repair failed");
    None
}

fn close_and_parse(body: &str, brackets: &[super::Bracket]) -> Option<RepairedJson> {
    let mut text = String::with_capacity(body.len() + brackets.len());
    text.push_str(body);
    for bracket in brackets.iter().rev() {
        strip_trailing_comma(&mut text);
        text.push(bracket.closer());
    }
    let value = serde_json::from_str::<Value>(&text).ok()?;
    Some(RepairedJson { text, value })
}

/// Append the shortest suffix that turns a partial primitive into a valid
/// one. Ambiguous prefixes such as a bare `n` are left alone.
fn complete_primitive(body: &mut String, token: &str) {
    let suffix = match token {
        "tru" | "fals" => "e",
        "nul" => "l",
        _ if token.ends_with(['-', '+', '.', 'e', 'E']) => "0",
        _ => "",
    };
    body.push_str(suffix);
}

/// Drop a trailing lone backslash, an incomplete `\uXXXX` tail, or a high
/// surrogate still waiting for its low half.
fn strip_incomplete_escape(body: &mut String) {
    let bytes = body.as_bytes();
    let trailing_backslashes = bytes.iter().rev().take_while(|&&b| b == b'\\').count();
    if trailing_backslashes % 2 == 1 {
        body.pop();
        return;
    }

    if let Some(start) = incomplete_unicode_start(bytes) {
        body.truncate(start);
    }
    if let Some(start) = dangling_high_surrogate_start(body.as_bytes()) {
        body.truncate(start);
    }
}

fn incomplete_unicode_start(bytes: &[u8]) -> Option<usize> {
    let hex = bytes
        .iter()
        .rev()
        .take_while(|b| b.is_ascii_hexdigit())
        .count();
    if hex > 3 {
        return None;
    }
    let u_pos = bytes.len().checked_sub(hex + 1)?;
    let slash_pos = u_pos.checked_sub(1)?;
    (bytes[u_pos] == b'u' && is_unescaped_backslash(bytes, slash_pos)).then_some(slash_pos)
}

fn dangling_high_surrogate_start(bytes: &[u8]) -> Option<usize> {
    let start = bytes.len().checked_sub(6)?;
    let tail = &bytes[start..];
    let is_high = tail.starts_with(b"\\u")
        && matches!(tail[2], b'd' | b'D')
        && matches!(tail[3], b'8' | b'9' | b'a' | b'A' | b'b' | b'B')
        && tail[4..].iter().all(u8::is_ascii_hexdigit);
    (is_high && is_unescaped_backslash(bytes, start)).then_some(start)
}

/// True when `bytes[pos]` is a backslash that starts an escape, i.e. it is
/// preceded by an even number of backslashes.
fn is_unescaped_backslash(bytes: &[u8], pos: usize) -> bool {
    if bytes.get(pos) != Some(&b'\\') {
        return false;
    }
    let run = bytes[..=pos].iter().rev().take_while(|&&b| b == b'\\').count();
    run % 2 == 1
}
